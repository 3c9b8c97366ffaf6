use super::{Capability, Step};
use crate::config::LanguageConfig;
use crate::extractor::ExtractedUnit;
use anyhow::Result;
use std::path::Path;

/// Built-in interpreted languages: (canonical name, command, extension).
const BUILTINS: &[(&str, &str, &str)] = &[
    ("bash", "bash", ".sh"),
    ("javascript", "node", ".js"),
    ("python", "python3", ".py"),
    ("ruby", "ruby", ".rb"),
    ("sh", "sh", ".sh"),
    ("shell", "bash", ".sh"),
    ("zsh", "zsh", ".zsh"),
];

/// A language whose examples run as `<command> <flags...> <file> <args...>`.
///
/// # Preamble
///
/// Configured languages may carry a preamble, which is prepended to every
/// example followed by a blank line.
#[derive(Debug, Clone)]
pub struct Interpreter {
    name: String,
    command: String,
    flags: Vec<String>,
    preamble: Option<String>,
    extension: String,
}

impl Interpreter {
    pub fn new(name: impl Into<String>, command: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            flags: Vec::new(),
            preamble: None,
            extension: extension.into(),
        }
    }

    pub fn builtins() -> Vec<Self> {
        BUILTINS
            .iter()
            .map(|(name, command, ext)| Self::new(*name, *command, *ext))
            .collect()
    }

    /// Applies a `[languages.<name>]` table on top of the built-in of the same
    /// name, or defines a new language if there is none.
    pub fn configured(name: &str, config: &LanguageConfig) -> Result<Self> {
        let base = Self::builtins().into_iter().find(|b| b.name == name);

        let mut interpreter = match (base, &config.command) {
            (Some(base), _) => base,
            (None, Some(command)) => Self::new(name, command.clone(), format!(".{}", name)),
            (None, None) => anyhow::bail!("Language '{}' needs a `command`", name),
        };

        if let Some(ref command) = config.command {
            interpreter.command = command.clone();
        }
        if let Some(ref flags) = config.flags {
            interpreter.flags = flags.clone();
        }
        if let Some(ref ext) = config.extension {
            interpreter.extension = ext.clone();
        }
        interpreter.preamble = config.preamble.clone();

        Ok(interpreter)
    }
}

impl Capability for Interpreter {
    fn name(&self) -> &str {
        &self.name
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn source_text(&self, unit: &ExtractedUnit) -> String {
        match self.preamble {
            Some(ref preamble) => format!("{}\n\n{}", preamble, unit.code),
            None => unit.code.clone(),
        }
    }

    fn commands(&self, unit: &ExtractedUnit, file: &Path) -> Vec<Step> {
        let mut args = self.flags.clone();
        args.push(file.display().to_string());
        args.extend(unit.tags.args.iter().cloned());

        vec![Step::run(&self.command, args)]
    }
}
