use super::{Capability, ExecOptions, Step};
use crate::extractor::ExtractedUnit;
use crate::outcome::{Outcome, RunError, Verdict};
use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;

/// JSON examples are validated in-process; nothing is executed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

#[async_trait]
impl Capability for Json {
    fn name(&self) -> &str {
        "json"
    }

    fn extension(&self) -> &str {
        ".json"
    }

    fn commands(&self, _unit: &ExtractedUnit, _file: &Path) -> Vec<Step> {
        Vec::new()
    }

    async fn run(&self, unit: &ExtractedUnit, _ordinal: usize, _options: &ExecOptions) -> Outcome {
        let start = Instant::now();
        let at = unit.location();

        let outcome = match serde_json::from_str::<serde_json::Value>(&unit.code) {
            Ok(_) => Outcome::new(at, 0, Verdict::Passed),
            Err(error) => Outcome::new(
                at.clone(),
                1,
                Verdict::Failed(RunError::InvalidJson { at, error }),
            ),
        };

        outcome.with_code(unit.code.clone()).with_duration(start.elapsed())
    }
}
