use super::{check_directives, Capability, Step};
use crate::config::LanguageConfig;
use crate::extractor::ExtractedUnit;
use std::path::Path;

/// Go examples, run with `go run`. Only `package main` examples are runnable;
/// library snippets are skipped.
#[derive(Debug, Clone)]
pub struct Go {
    command: String,
    flags: Vec<String>,
}

impl Default for Go {
    fn default() -> Self {
        Self {
            command: "go".to_string(),
            flags: Vec::new(),
        }
    }
}

impl Go {
    pub fn configured(config: &LanguageConfig) -> Self {
        let mut go = Self::default();
        if let Some(ref command) = config.command {
            go.command = command.clone();
        }
        if let Some(ref flags) = config.flags {
            go.flags = flags.clone();
        }
        go
    }
}

fn is_main_package(code: &str) -> bool {
    code.lines().any(|line| {
        let mut words = line.split_whitespace();
        words.next() == Some("package") && words.next() == Some("main")
    })
}

impl Capability for Go {
    fn name(&self) -> &str {
        "go"
    }

    fn extension(&self) -> &str {
        ".go"
    }

    fn file_name(&self, _unit: &ExtractedUnit) -> String {
        "main.go".to_string()
    }

    fn can_execute(&self, unit: &ExtractedUnit) -> Result<(), String> {
        check_directives(unit)?;

        if !is_main_package(&unit.code) {
            return Err("not a main package".to_string());
        }
        Ok(())
    }

    fn commands(&self, unit: &ExtractedUnit, file: &Path) -> Vec<Step> {
        let mut args = vec!["run".to_string()];
        args.extend(self.flags.iter().cloned());
        args.push(file.display().to_string());
        args.extend(unit.tags.args.iter().cloned());

        vec![Step::run(&self.command, args)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::tests::unit;

    #[test]
    fn test_only_main_packages_run() {
        let go = Go::default();

        let main = unit("go", "package main\n\nfunc main() {}\n");
        assert!(go.can_execute(&main).is_ok());

        let lib = unit("go", "package util\n\nfunc Helper() {}\n");
        assert_eq!(go.can_execute(&lib), Err("not a main package".to_string()));
    }

    #[test]
    fn test_go_run_command() {
        let mut u = unit("go", "package main");
        u.tags.args = vec!["-x".into()];

        let steps = Go::default().commands(&u, Path::new("/w/main.go"));
        assert_eq!(steps, vec![Step::run("go", vec!["run".into(), "/w/main.go".into(), "-x".into()])]);
    }
}
