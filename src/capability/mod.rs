//! Per-language execution strategies.
//!
//! A [`Capability`] knows how to run examples of one canonical language. The
//! set of capabilities is fixed for the lifetime of a run and lives in a
//! [`CapabilityTable`], keyed by canonical language name.

mod exec;
mod go;
mod interpreter;
mod java;
mod json;

use crate::config::FileConfig;
use crate::extractor::ExtractedUnit;
use crate::outcome::Outcome;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use go::Go;
pub use interpreter::Interpreter;
pub use java::Java;
pub use json::Json;

/// Per-example time limit when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings applied to every executed example.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Wall-clock limit for each command an example runs
    pub timeout: Duration,
    /// Report examples whose interpreter is not installed as skipped rather than failed
    pub skip_missing: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            skip_missing: false,
        }
    }
}

/// One command in the build/run cycle of an example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub program: String,
    pub args: Vec<String>,
    /// The step that actually runs the example. Its exit status and output are
    /// what the example's directives are checked against.
    pub is_final: bool,
}

impl Step {
    /// A preparatory step, e.g. a compiler invocation.
    pub fn build(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            is_final: false,
        }
    }

    /// The step that runs the example.
    pub fn run(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            is_final: true,
        }
    }
}

/// Strategy for running examples of one canonical language.
///
/// Implementations are stateless: `can_execute`, `run` and `extract` may be
/// called any number of times, in any order. `run` and `extract` never fail
/// past their boundary, every failure is encoded in the returned [`Outcome`].
#[async_trait]
pub trait Capability: Send + Sync {
    /// Canonical language name this capability is registered under.
    fn name(&self) -> &str;

    /// Extension of the file the example is written to, including the dot.
    fn extension(&self) -> &str;

    /// Name of the file the example is written to.
    fn file_name(&self, _unit: &ExtractedUnit) -> String {
        format!("example{}", self.extension())
    }

    /// Decides whether this particular example should run. `Err` carries the
    /// reason it should not. Must not have side effects.
    fn can_execute(&self, unit: &ExtractedUnit) -> Result<(), String> {
        check_directives(unit)
    }

    /// Full text written to disk for the example.
    fn source_text(&self, unit: &ExtractedUnit) -> String {
        unit.code.clone()
    }

    /// Commands that build and run the example written at `file`.
    fn commands(&self, unit: &ExtractedUnit, file: &Path) -> Vec<Step>;

    /// Builds and runs the example in a fresh working directory.
    async fn run(&self, unit: &ExtractedUnit, ordinal: usize, options: &ExecOptions) -> Outcome {
        exec::run_unit(self, unit, ordinal, options).await
    }

    /// Writes the example under `dir` without running it.
    fn extract(&self, unit: &ExtractedUnit, ordinal: usize, dir: &Path) -> Outcome {
        exec::extract_unit(self, unit, ordinal, dir)
    }
}

/// Eligibility rules shared by every language: fence flags and directive tags.
pub fn check_directives(unit: &ExtractedUnit) -> Result<(), String> {
    for flag in ["ignore", "skip"] {
        if unit.has_flag(flag) {
            return Err(format!("'{}' flag", flag));
        }
    }

    if let Some(reason) = unit.tags.skip.as_ref().and_then(|s| s.reason()) {
        return Err(reason);
    }

    if !unit.tags.os.is_empty() && !unit.tags.os.iter().any(|os| os_matches(os)) {
        return Err(format!(
            "os {} not in {:?}",
            std::env::consts::OS,
            unit.tags.os
        ));
    }

    Ok(())
}

fn os_matches(os: &str) -> bool {
    let current = std::env::consts::OS;
    let os = os.to_lowercase();
    os == current || (os == "darwin" && current == "macos")
}

/// Capabilities available to a run, keyed by canonical language name.
///
/// Built once at startup; lookups are exact matches on the canonical name.
#[derive(Clone, Default)]
pub struct CapabilityTable {
    by_name: BTreeMap<String, Arc<dyn Capability>>,
}

impl fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.by_name.keys()).finish()
    }
}

impl CapabilityTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The languages mdexec knows how to run out of the box.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for interpreter in Interpreter::builtins() {
            table.insert(Arc::new(interpreter));
        }
        table.insert(Arc::new(Go::default()));
        table.insert(Arc::new(Java));
        table.insert(Arc::new(Json));
        table
    }

    /// Built-in languages adjusted by the `[languages.*]` tables of a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if a table defines a new language without a command,
    /// or tries to give a command to a language that does not take one.
    pub fn from_config(config: &FileConfig) -> Result<Self> {
        let mut table = Self::builtin();

        for (name, lang) in &config.languages {
            if !lang.enabled {
                log::debug!("language {} disabled by config", name);
                table.by_name.remove(name);
                continue;
            }

            let customizes =
                lang.defines_command() || lang.preamble.is_some() || lang.extension.is_some();
            if !customizes {
                continue;
            }

            let capability: Arc<dyn Capability> = match name.as_str() {
                "go" => Arc::new(Go::configured(lang)),
                "java" | "json" => {
                    anyhow::bail!("Language '{}' cannot be customized beyond `enabled`", name)
                }
                _ => Arc::new(Interpreter::configured(name, lang)?),
            };
            table.insert(capability);
        }

        Ok(table)
    }

    /// Registers a capability under its own name, replacing any previous one.
    pub fn insert(&mut self, capability: Arc<dyn Capability>) {
        self.by_name.insert(capability.name().to_string(), capability);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.by_name.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
