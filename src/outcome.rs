use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Status recorded when a unit could not even be attempted, e.g. its document
/// was unreadable.
pub const OUT_OF_BAND_STATUS: i32 = -1;

/// Where an outcome came from: a document, and for real units also the line
/// of the opening fence and the language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub source: Arc<PathBuf>,
    pub line: Option<usize>,
    pub lang: Option<String>,
}

impl Location {
    pub fn document(source: impl Into<PathBuf>) -> Self {
        Self {
            source: Arc::new(source.into()),
            line: None,
            lang: None,
        }
    }

    pub fn unit(source: Arc<PathBuf>, line: usize, lang: &str) -> Self {
        Self {
            source,
            line: Some(line),
            lang: Some(lang.to_string()),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        if let Some(ref lang) = self.lang {
            write!(f, " ({})", lang)?;
        }
        Ok(())
    }
}

/// A genuine failure. Everything in here ends up in the final error list.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{at}: failed to read document: {error}")]
    Read {
        at: Location,
        #[source]
        error: std::io::Error,
    },

    #[error("{at}: failed to prepare example: {error}")]
    Prepare {
        at: Location,
        #[source]
        error: std::io::Error,
    },

    #[error("{at}: failed to execute '{program}': {error}")]
    Spawn {
        at: Location,
        program: String,
        #[source]
        error: std::io::Error,
    },

    #[error("{at}: '{program}' exited with status {status} (expected {expected})")]
    ExitStatus {
        at: Location,
        program: String,
        status: i32,
        expected: i32,
    },

    #[error("{at}: '{program}' timed out after {after:?}")]
    Timeout {
        at: Location,
        program: String,
        after: Duration,
    },

    #[error("{at}: {stream} did not match /{pattern}/")]
    OutputMismatch {
        at: Location,
        stream: &'static str,
        pattern: String,
    },

    #[error("{at}: invalid {tag} pattern: {error}")]
    InvalidPattern {
        at: Location,
        tag: &'static str,
        #[source]
        error: regex::Error,
    },

    #[error("{at}: invalid JSON: {error}")]
    InvalidJson {
        at: Location,
        #[source]
        error: serde_json::Error,
    },

    #[error("example count {actual} != expected {expected}")]
    CountMismatch { expected: usize, actual: usize },
}

impl RunError {
    /// The example this error points at, if it points at one.
    pub fn location(&self) -> Option<&Location> {
        match self {
            RunError::Read { at, .. }
            | RunError::Prepare { at, .. }
            | RunError::Spawn { at, .. }
            | RunError::ExitStatus { at, .. }
            | RunError::Timeout { at, .. }
            | RunError::OutputMismatch { at, .. }
            | RunError::InvalidPattern { at, .. }
            | RunError::InvalidJson { at, .. } => Some(at),
            RunError::CountMismatch { .. } => None,
        }
    }
}

/// Classification of a single outcome.
#[derive(Debug)]
pub enum Verdict {
    Passed,
    Failed(RunError),
    /// Intentionally not run. Never reported as a failure.
    Skipped(String),
}

/// Result of running (or extracting) one unit. Created once, never mutated.
#[derive(Debug)]
pub struct Outcome {
    location: Location,
    status: i32,
    stdout: String,
    stderr: String,
    code: Option<String>,
    duration: Duration,
    verdict: Verdict,
}

impl Outcome {
    pub fn new(location: Location, status: i32, verdict: Verdict) -> Self {
        Self {
            location,
            status,
            stdout: String::new(),
            stderr: String::new(),
            code: None,
            duration: Duration::ZERO,
            verdict,
        }
    }

    /// Synthetic outcome for a document that could not be read.
    pub fn unreadable(source: &Path, error: std::io::Error) -> Self {
        let at = Location::document(source);
        Self::new(
            at.clone(),
            OUT_OF_BAND_STATUS,
            Verdict::Failed(RunError::Read { at, error }),
        )
    }

    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// The example source, when it is worth showing next to a failure.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    pub fn success(&self) -> bool {
        matches!(self.verdict, Verdict::Passed)
    }

    pub fn into_parts(self) -> (Location, Verdict) {
        (self.location, self.verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_location_display() {
        let doc = Location::document("README.md");
        assert_eq!(doc.to_string(), "README.md");

        let unit = Location::unit(Arc::new(PathBuf::from("docs/a.md")), 12, "bash");
        assert_eq!(unit.to_string(), "docs/a.md:12 (bash)");
    }

    #[test]
    fn test_unreadable_outcome() {
        let outcome = Outcome::unreadable(
            Path::new("missing.md"),
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );

        assert_eq!(outcome.status(), OUT_OF_BAND_STATUS);
        assert!(!outcome.success());
        match outcome.verdict() {
            Verdict::Failed(err) => {
                assert!(err.to_string().starts_with("missing.md: failed to read document"));
                assert_eq!(err.location().map(|l| l.line), Some(None));
            }
            other => panic!("unexpected verdict: {:?}", other),
        }
    }

    #[test]
    fn test_count_mismatch_message() {
        let err = RunError::CountMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "example count 2 != expected 3");
        assert!(err.location().is_none());
    }
}
