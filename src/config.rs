use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

/// Name of the config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "mdexec.toml";

/// Configuration file for mdexec.
///
/// All fields are optional. Command-line flags take precedence over the
/// values found here.
///
/// # Example
///
/// ```toml
/// timeout_secs = 120
///
/// [languages.python]
/// command = "python3"
/// flags = ["-X", "dev"]
///
/// [languages.lua]
/// command = "${LUA_HOME}/bin/lua"
/// extension = ".lua"
///
/// [languages.java]
/// enabled = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    /// Per-example timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Expected number of examples (0 disables the check)
    pub count: Option<usize>,

    /// Language catalog location
    pub languages_file: Option<String>,

    /// Language-specific configurations indexed by canonical language name
    pub languages: BTreeMap<String, LanguageConfig>,
}

/// Configuration for a specific language.
///
/// For a built-in language, `command`, `flags` and `preamble` override the
/// built-in interpreter. Any other name defines a new interpreter-driven
/// language, for which `command` is required.
///
/// # Security
///
/// Command paths are validated to prevent command injection. Paths cannot
/// contain shell metacharacters or use parent directory traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Whether this language is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interpreter executable (supports ${VAR} environment variable expansion)
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments placed before the example file
    #[serde(default)]
    pub flags: Option<Vec<String>>,

    /// Optional preamble to prepend to every example
    #[serde(default)]
    pub preamble: Option<String>,

    /// File extension of the example file, including the dot
    #[serde(default)]
    pub extension: Option<String>,
}

fn default_true() -> bool {
    true
}

impl LanguageConfig {
    /// Whether this entry asks for something to be executed, which is what
    /// makes a config file subject to approval.
    pub fn defines_command(&self) -> bool {
        self.command.is_some() || self.flags.is_some()
    }

    /// Validate the configuration for security and correctness
    pub fn validate(&self) -> Result<()> {
        let Some(ref command) = self.command else {
            return Ok(());
        };

        // Ensure command path doesn't contain shell metacharacters
        let dangerous_chars = [';', '|', '&', '`', '\n', '\r'];
        for ch in dangerous_chars {
            if command.contains(ch) {
                anyhow::bail!(
                    "Command path contains invalid character '{}': {}",
                    ch.escape_default(),
                    command
                );
            }
        }

        // Ensure command path doesn't use parent directory traversal
        let command_path = Path::new(command);
        for component in command_path.components() {
            if matches!(component, std::path::Component::ParentDir) {
                anyhow::bail!("Command path cannot contain '..': {}", command);
            }
        }

        if command.is_empty() {
            anyhow::bail!("Command path cannot be empty");
        }

        if let Some(ref ext) = self.extension {
            if !ext.starts_with('.') || ext.contains(std::path::is_separator) {
                anyhow::bail!("Extension must start with '.' and be a plain suffix: {}", ext);
            }
        }

        Ok(())
    }
}

impl FileConfig {
    /// Reads, expands and validates a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Parses configuration and expands environment variables
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: FileConfig = toml::from_str(content)?;

        // Expand environment variables in all language configs and validate
        for (name, lang_config) in config.languages.iter_mut() {
            if let Some(command) = lang_config.command.as_mut() {
                *command = expand_env_vars(command);
            }
            for flag in lang_config.flags.iter_mut().flatten() {
                *flag = expand_env_vars(flag);
            }

            lang_config
                .validate()
                .with_context(|| format!("Invalid configuration for language '{}'", name))?;
        }

        Ok(config)
    }

    /// Whether any language entry runs a user-chosen command.
    pub fn defines_commands(&self) -> bool {
        self.languages.values().any(LanguageConfig::defines_command)
    }
}

/// Expand environment variables in a string
/// Supports ${VAR_NAME} syntax
/// This function processes the string in a single pass to avoid re-processing expanded values
fn expand_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_name = String::new();
            let mut found_close = false;

            for ch in chars.by_ref() {
                if ch == '}' {
                    found_close = true;
                    break;
                }
                var_name.push(ch);
            }

            if found_close {
                match env::var(&var_name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => {
                        log::warn!(
                            "Environment variable '{}' not found, leaving unexpanded",
                            var_name
                        );
                        result.push_str("${");
                        result.push_str(&var_name);
                        result.push('}');
                    }
                }
            } else {
                // No closing brace found, treat as literal
                result.push_str("${");
                result.push_str(&var_name);
            }
        } else {
            result.push(ch);
        }
    }

    result
}
