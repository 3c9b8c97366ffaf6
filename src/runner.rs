use crate::capability::{Capability, CapabilityTable, ExecOptions};
use crate::extractor::{ExtractedUnit, Finder, MarkdownFinder};
use crate::language::Languages;
use crate::outcome::{Outcome, RunError, Verdict};
use crate::reporting::{self, RunReport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// What to do with each runnable example.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Build and run every example.
    Execute(ExecOptions),
    /// Only write every example to the given directory.
    Extract(PathBuf),
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Execute(ExecOptions::default())
    }
}

/// A unit whose language resolved to a capability that agreed to run it.
pub struct Resolved {
    pub unit: ExtractedUnit,
    pub capability: Arc<dyn Capability>,
}

/// Top level of execution: finds the examples in every document, runs them in
/// order, and turns the outcomes into a list of errors.
///
/// # Example
///
/// ```ignore
/// let runner = Runner::new(vec!["README.md".into()], CapabilityTable::builtin())
///     .with_expected_count(4);
/// let errors = runner.run().await;
/// ```
pub struct Runner {
    sources: Vec<PathBuf>,
    expected_count: usize,
    mode: Mode,
    capabilities: CapabilityTable,
    languages: Option<Languages>,
    finder: Box<dyn Finder>,
}

impl Runner {
    pub fn new(sources: Vec<PathBuf>, capabilities: CapabilityTable) -> Self {
        Self {
            sources,
            expected_count: 0,
            mode: Mode::default(),
            capabilities,
            languages: None,
            finder: Box::new(MarkdownFinder),
        }
    }

    /// Number of examples the run must produce. `0` disables the check.
    pub fn with_expected_count(mut self, count: usize) -> Self {
        self.expected_count = count;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Catalog used to resolve tags that are not capability names.
    pub fn with_languages(mut self, languages: Option<Languages>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_finder(mut self, finder: Box<dyn Finder>) -> Self {
        self.finder = finder;
        self
    }

    /// Runs every example and returns the errors, in discovery order.
    ///
    /// An empty list means everything passed (or there was nothing to do).
    /// A count mismatch replaces every other error with a single one.
    pub async fn run(&self) -> Vec<RunError> {
        if self.sources.is_empty() {
            log::warn!("no sources given");
            return Vec::new();
        }

        let start = Instant::now();
        let outcomes = self.collect().await;

        if let Some(mismatch) = self.check_count(outcomes.len()) {
            log::error!(
                "mismatched example count expected={} actual={}",
                self.expected_count,
                outcomes.len()
            );
            reporting::log_discarded(&outcomes);
            return vec![mismatch];
        }

        reporting::log_outcomes(&outcomes);
        reporting::report_failures(&outcomes);

        let report = RunReport {
            documents: self.sources.len(),
            units: outcomes.len(),
            errors: outcomes
                .iter()
                .filter(|o| matches!(o.verdict(), Verdict::Failed(_)))
                .count(),
            elapsed: start.elapsed(),
        };
        reporting::print_statistics(&outcomes, &report);

        into_errors(outcomes)
    }

    /// Produces one outcome per runnable example (plus one per unreadable
    /// document), in document order then unit order. Nothing here decides
    /// what counts as an error.
    pub async fn collect(&self) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        let mut ordinal = 0;

        for source in &self.sources {
            let text = match tokio::fs::read_to_string(source).await {
                Ok(text) => text,
                Err(e) => {
                    log::debug!("unreadable source={} error={}", source.display(), e);
                    outcomes.push(Outcome::unreadable(source, e));
                    continue;
                }
            };

            let source_start = Instant::now();
            let units = self.finder.find(source, &text);
            let runnable = resolve_units(units, &self.capabilities, self.languages.as_ref());
            let total = runnable.len();

            for (j, Resolved { unit, capability }) in runnable.into_iter().enumerate() {
                let outcome = match self.mode {
                    Mode::Extract(ref dir) => capability.extract(&unit, ordinal, dir),
                    Mode::Execute(ref options) => {
                        log::info!(
                            "start i={}/{} source={} line={} lang={}",
                            j + 1,
                            total,
                            source.display(),
                            unit.line_offset,
                            unit.lang
                        );

                        let outcome = capability.run(&unit, ordinal, options).await;

                        log::info!(
                            "finish i={}/{} source={} line={} lang={} time={:?}",
                            j + 1,
                            total,
                            source.display(),
                            unit.line_offset,
                            unit.lang,
                            outcome.duration()
                        );
                        outcome
                    }
                };

                ordinal += 1;
                outcomes.push(outcome);
            }

            log::info!(
                "checked source={} time={:?}",
                source.display(),
                source_start.elapsed()
            );
        }

        outcomes
    }

    fn check_count(&self, actual: usize) -> Option<RunError> {
        check_count(&self.mode, self.expected_count, actual)
    }
}

/// The whole-run sanity check: in execute mode, a non-zero expected count must
/// equal the number of outcomes.
pub fn check_count(mode: &Mode, expected: usize, actual: usize) -> Option<RunError> {
    match mode {
        Mode::Execute(_) if expected > 0 && actual != expected => {
            Some(RunError::CountMismatch { expected, actual })
        }
        _ => None,
    }
}

/// Keeps the genuine failures, in order. Skips are dropped.
pub fn into_errors(outcomes: Vec<Outcome>) -> Vec<RunError> {
    outcomes
        .into_iter()
        .filter_map(|outcome| match outcome.into_parts().1 {
            Verdict::Failed(err) => Some(err),
            Verdict::Passed | Verdict::Skipped(_) => None,
        })
        .collect()
}

/// Binds each unit to the capability for its language, dropping the ones that
/// cannot or should not run.
///
/// A tag is first looked up as a capability name. Failing that, and only if a
/// catalog is present, it is resolved to its canonical name, which replaces the
/// tag, and looked up again. Units left without a capability, and units their
/// capability declines, are dropped without an error.
pub fn resolve_units(
    units: Vec<ExtractedUnit>,
    capabilities: &CapabilityTable,
    languages: Option<&Languages>,
) -> Vec<Resolved> {
    let mut resolved = Vec::with_capacity(units.len());

    for mut unit in units {
        let mut capability = capabilities.get(&unit.lang).cloned();

        if capability.is_none() {
            if let Some(languages) = languages {
                let Some(identity) = languages.lookup(&unit.lang) else {
                    log::debug!(
                        "unknown language, skipping source={} lineno={} lang={}",
                        unit.source.display(),
                        unit.line_offset,
                        unit.lang
                    );
                    continue;
                };

                unit.lang = identity.name.clone();
                capability = capabilities.get(&unit.lang).cloned();
            }
        }

        let Some(capability) = capability else {
            log::debug!(
                "no executor available for lang source={} lineno={} lang={}",
                unit.source.display(),
                unit.line_offset,
                unit.lang
            );
            continue;
        };

        if let Err(reason) = capability.can_execute(&unit) {
            log::debug!(
                "skipping unit source={} lineno={} reason={}",
                unit.source.display(),
                unit.line_offset,
                reason
            );
            continue;
        }

        resolved.push(Resolved { unit, capability });
    }

    log::debug!("returning runnables runnable_count={}", resolved.len());
    resolved
}
