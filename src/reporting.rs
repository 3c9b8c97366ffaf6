use crate::outcome::{Outcome, RunError, Verdict};
use chrono::Local;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Aggregate numbers for one run. Derived from the outcomes, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub documents: usize,
    pub units: usize,
    pub errors: usize,
    pub elapsed: Duration,
}

/// Formats a message with a timestamp and level prefix, like env_logger does.
fn format_line(level: &str, message: &str) -> String {
    format!(
        "{} [{}] (mdexec): {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        level,
        message
    )
}

fn error_line(message: &str) {
    eprintln!("{}", format_line("ERROR", message));
}

/// Logs what every outcome captured, and why skipped outcomes were skipped.
///
/// Only visible at debug level.
pub fn log_outcomes(outcomes: &[Outcome]) {
    for outcome in outcomes {
        if !outcome.stdout().is_empty() || !outcome.stderr().is_empty() {
            log::debug!(
                "captured output source={} stdout={:?} stderr={:?}",
                outcome.location(),
                outcome.stdout(),
                outcome.stderr()
            );
        }

        if let Verdict::Skipped(reason) = outcome.verdict() {
            log::debug!(
                "skipped example source={} reason={}",
                outcome.location(),
                reason
            );
        }
    }
}

/// Logs the per-example failures that a count mismatch is about to hide.
pub fn log_discarded(outcomes: &[Outcome]) {
    for outcome in outcomes {
        if let Verdict::Failed(err) = outcome.verdict() {
            log::debug!("discarded failure due to count mismatch: {}", err);
        }
    }
}

/// Prints one block per failed outcome to stderr: where it is, what went
/// wrong, what it printed, and the example itself.
pub fn report_failures(outcomes: &[Outcome]) {
    for outcome in outcomes {
        let Verdict::Failed(err) = outcome.verdict() else {
            continue;
        };
        let at = outcome.location();

        error_line("Example failed");
        error_line(&format!("File: {}", at.source().display()));
        if let Some(line) = at.line {
            error_line(&format!("Line: {}", line));
        }
        if let Some(ref lang) = at.lang {
            error_line(&format!("Language: {}", lang));
        }
        error_line("");
        for line in err.to_string().lines() {
            error_line(line);
        }

        if !outcome.stderr().is_empty() {
            error_line("");
            error_line("stderr:");
            for line in outcome.stderr().lines() {
                error_line(line);
            }
        }

        if let Some(code) = outcome.code() {
            error_line("");
            error_line("Code block:");
            error_line(&format!("```{}", at.lang.as_deref().unwrap_or_default()));
            for line in code.lines() {
                error_line(line);
            }
            error_line("```");
        }
        error_line("");
    }
}

/// Explains why a config file that defines commands was refused.
pub fn report_unapproved(config_path: &Path) {
    error_line(&format!(
        "{} not approved for code execution",
        config_path.display()
    ));
    error_line("");
    error_line("For security, mdexec requires explicit approval before");
    error_line("running commands specified in a config file.");
    error_line("");
    error_line("To approve this configuration after reviewing it:");
    error_line(&format!("  mdexec allow --config {}", config_path.display()));
}

/// Prints the final error list, one line per error.
pub fn report_errors(errors: &[RunError]) {
    if errors.is_empty() {
        return;
    }

    error_line(&format!("{} example(s) failed:", errors.len()));
    for err in errors {
        error_line(&format!("  {}", err));
    }
}

/// Prints run statistics to stderr.
///
/// Shows:
/// - Documents, examples and errors
/// - Passed examples per language
/// - Total time and average time per example
/// - Individual example timings (RUST_LOG=debug)
pub fn print_statistics(outcomes: &[Outcome], report: &RunReport) {
    let mut lang_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for outcome in outcomes.iter().filter(|o| o.success()) {
        let lang = outcome.location().lang.as_deref().unwrap_or("unknown");
        *lang_counts.entry(lang).or_insert(0) += 1;
    }

    let stats_str = lang_counts
        .iter()
        .map(|(lang, count)| format!("{}: {}", lang, count))
        .collect::<Vec<_>>()
        .join(", ");

    let sum: Duration = outcomes.iter().map(|o| o.duration()).sum();
    let avg_ms = if outcomes.is_empty() {
        0
    } else {
        sum.as_millis() / outcomes.len() as u128
    };

    log::info!(
        "done source_count={} example_count={} error_count={} time={:?}",
        report.documents,
        report.units,
        report.errors,
        report.elapsed
    );
    if !lang_counts.is_empty() {
        log::info!("passed examples ({}), avg {}ms per example", stats_str, avg_ms);
    }

    for outcome in outcomes {
        log::debug!(
            "[EXAMPLE_TIME] {}: {}ms",
            outcome.location(),
            outcome.duration().as_millis()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let line = format_line("ERROR", "Example failed");
        assert!(line.ends_with(" [ERROR] (mdexec): Example failed"));
        // "YYYY-mm-dd HH:MM:SS" prefix
        assert_eq!(line.find(" [ERROR]"), Some(19));
    }
}
