//! Integration tests for mdexec
//!
//! These tests run real examples through `sh` against the documents in
//! tests/fixtures, each in an isolated copy.
//!
//! ## Test Architecture
//!
//! Each test uses `TestFixture` to create an isolated environment with:
//! - Temporary copy of a fixture directory
//! - Automatic cleanup via RAII (Drop trait)
//!
//! ## Adding New Tests
//!
//! 1. Create a new fixture in tests/fixtures/ if needed
//! 2. Use `TestFixture::new("tests/fixtures/<name>")`
//! 3. Use `#[tokio::test]` for async tests
//! 4. Assert on the returned errors

mod common;

use anyhow::Result;
use common::TestFixture;
use mdexec::{ApprovalStore, ExecOptions, FileConfig, Mode, RunError, Verdict};
use std::time::Duration;

// ===== Tests =====

#[tokio::test]
async fn integration_passing_examples_report_no_errors() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/passing")?;

    let errors = fixture
        .runner(&["README.md", "guide.md"])
        .with_expected_count(6)
        .run()
        .await;

    assert!(errors.is_empty(), "Unexpected errors: {:?}", errors);
    Ok(())
}

#[tokio::test]
async fn integration_skipped_examples_are_not_counted() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/passing")?;

    let outcomes = fixture.runner(&["README.md"]).collect().await;

    // ignore flag, skip tag and `text` blocks never reach execution
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| o.success()));
    assert_eq!(outcomes[0].stdout(), "hello\n");
    Ok(())
}

#[tokio::test]
async fn integration_failures_are_detected_in_order() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/failing")?;

    let errors = fixture.runner(&["broken.md"]).run().await;

    assert_eq!(errors.len(), 2, "Unexpected errors: {:?}", errors);
    assert!(matches!(
        errors[0],
        RunError::ExitStatus {
            status: 7,
            expected: 0,
            ..
        }
    ));
    assert!(matches!(
        errors[1],
        RunError::OutputMismatch {
            stream: "stdout",
            ..
        }
    ));

    let lines: Vec<_> = errors
        .iter()
        .map(|e| e.location().and_then(|l| l.line))
        .collect();
    assert_eq!(lines, vec![Some(7), Some(13)]);
    Ok(())
}

#[tokio::test]
async fn integration_failure_keeps_captured_stderr() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/failing")?;

    let outcomes = fixture.runner(&["broken.md"]).collect().await;

    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[1].status(), 7);
    assert_eq!(outcomes[1].stderr(), "about to fail\n");
    assert!(outcomes[1].code().is_some_and(|c| c.contains("exit 7")));
    Ok(())
}

#[tokio::test]
async fn integration_missing_document_does_not_stop_the_run() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/passing")?;

    let errors = fixture
        .runner(&["README.md", "missing.md", "guide.md"])
        .with_expected_count(7)
        .run()
        .await;

    assert_eq!(errors.len(), 1, "Unexpected errors: {:?}", errors);
    assert!(matches!(errors[0], RunError::Read { .. }));
    Ok(())
}

#[tokio::test]
async fn integration_count_mismatch_is_the_only_error() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/failing")?;

    let errors = fixture
        .runner(&["broken.md"])
        .with_expected_count(10)
        .run()
        .await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "example count 4 != expected 10");
    Ok(())
}

#[tokio::test]
async fn integration_timeout_stops_long_examples() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/passing")?;
    let doc = fixture.root().join("slow.md");
    std::fs::write(&doc, "```sh\nsleep 5\n```\n")?;

    let options = ExecOptions {
        timeout: Duration::from_millis(200),
        ..ExecOptions::default()
    };
    let errors = fixture
        .runner(&["slow.md"])
        .with_mode(Mode::Execute(options))
        .run()
        .await;

    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], RunError::Timeout { .. }));
    Ok(())
}

#[tokio::test]
async fn integration_missing_interpreter_can_be_skipped() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/configured")?;
    let doc = fixture.root().join("missing.md");
    std::fs::write(&doc, "```nope\necho hi\n```\n")?;
    let config = fixture.root().join("mdexec.toml");
    std::fs::write(
        &config,
        "[languages.nope]\ncommand = \"mdexec-no-such-interpreter\"\n",
    )?;

    let strict = fixture.configured_runner(&["missing.md"])?.run().await;
    assert!(matches!(strict.as_slice(), [RunError::Spawn { .. }]));

    let options = ExecOptions {
        skip_missing: true,
        ..ExecOptions::default()
    };
    let runner = fixture
        .configured_runner(&["missing.md"])?
        .with_mode(Mode::Execute(options));
    let outcomes = runner.collect().await;
    assert!(matches!(outcomes[0].verdict(), Verdict::Skipped(_)));
    assert!(runner.run().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn integration_extract_writes_examples_without_running_them() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/failing")?;
    let out = tempfile::tempdir()?;

    let errors = fixture
        .runner(&["broken.md"])
        .with_mode(Mode::Extract(out.path().to_path_buf()))
        .with_expected_count(1)
        .run()
        .await;

    assert!(errors.is_empty(), "Unexpected errors: {:?}", errors);
    let second = std::fs::read_to_string(out.path().join("001_broken").join("example.sh"))?;
    assert_eq!(second, "echo \"about to fail\" >&2\nexit 7\n");
    assert!(out.path().join("003_broken").join("example.sh").exists());
    Ok(())
}

#[tokio::test]
async fn integration_configured_languages() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/configured")?;

    let runner = fixture.configured_runner(&["notes.md"])?;
    let outcomes = runner.collect().await;

    // python is disabled, so only the custom language runs
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].location().lang.as_deref(), Some("shout"));
    assert_eq!(outcomes[0].stdout(), "LOUD\n");
    assert!(outcomes[0].code().is_some_and(|c| c.starts_with("set -e\n\n")));
    Ok(())
}

#[tokio::test]
async fn integration_unapproved_config_rejected() -> Result<()> {
    let fixture = TestFixture::new("tests/fixtures/configured")?;
    let config_path = fixture.root().join("mdexec.toml");
    let store_dir = tempfile::tempdir()?;
    let store = ApprovalStore::at(store_dir.path());

    let config = FileConfig::load(&config_path)?;
    assert!(config.defines_commands());

    let result = store.ensure_approved(&config_path);
    assert!(result.is_err(), "Unapproved config should be rejected");
    if let Err(e) = result {
        let error_msg = format!("{:#}", e);
        assert!(
            error_msg.contains("not approved"),
            "Wrong error: {}",
            error_msg
        );
    }

    store.approve(&config_path)?;
    store.ensure_approved(&config_path)?;
    Ok(())
}
