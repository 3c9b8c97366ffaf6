use super::{check_directives, Capability, Step};
use crate::extractor::ExtractedUnit;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Java examples: compiled with `javac`, then run with `java`.
///
/// The example must declare a `public class` with a `main` method; the class
/// name decides the file name.
#[derive(Debug, Clone, Copy, Default)]
pub struct Java;

fn public_class(code: &str) -> Option<&str> {
    static CLASS: OnceLock<Regex> = OnceLock::new();
    let re = CLASS.get_or_init(|| {
        Regex::new(r"public\s+(?:final\s+|abstract\s+)*class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
            .expect("valid class regex")
    });

    re.captures(code)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

impl Capability for Java {
    fn name(&self) -> &str {
        "java"
    }

    fn extension(&self) -> &str {
        ".java"
    }

    fn file_name(&self, unit: &ExtractedUnit) -> String {
        format!("{}.java", public_class(&unit.code).unwrap_or("Main"))
    }

    fn can_execute(&self, unit: &ExtractedUnit) -> Result<(), String> {
        check_directives(unit)?;

        if public_class(&unit.code).is_none() {
            return Err("no public class".to_string());
        }
        if !unit.code.contains("static void main") {
            return Err("no main method".to_string());
        }
        Ok(())
    }

    fn commands(&self, unit: &ExtractedUnit, file: &Path) -> Vec<Step> {
        let class = public_class(&unit.code).unwrap_or("Main");
        let classpath = file
            .parent()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| ".".to_string());

        let mut run_args = vec!["-cp".to_string(), classpath, class.to_string()];
        run_args.extend(unit.tags.args.iter().cloned());

        vec![
            Step::build("javac", vec![file.display().to_string()]),
            Step::run("java", run_args),
        ]
    }
}
