use anyhow::{Context, Result};
use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Compute SHA256 hash of path + "\n" + content (direnv style)
pub fn compute_hash(path: &Path, content: &str) -> String {
    let canonical_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let input = format!("{}\n{}", canonical_path.display(), content);
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Records which config files the user has reviewed and allowed to run commands.
///
/// An approval is a file named after [`compute_hash`] of the config, so editing
/// the config (or moving it) revokes the approval.
#[derive(Debug, Clone)]
pub struct ApprovalStore {
    dir: PathBuf,
}

impl ApprovalStore {
    /// Store rooted at `$XDG_DATA_HOME/mdexec/allow`, or the platform data dir.
    pub fn from_env() -> Result<Self> {
        // XDG_DATA_HOME wins on every platform
        if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
            return Ok(Self::at(PathBuf::from(xdg_data_home).join("mdexec").join("allow")));
        }

        let proj_dirs = ProjectDirs::from("", "", "mdexec")
            .context("Failed to determine project directories")?;
        Ok(Self::at(proj_dirs.data_dir().join("allow")))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn approval_file(&self, config_path: &Path) -> Result<PathBuf> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Ok(self.dir.join(compute_hash(config_path, &content)))
    }

    /// Check if a config file is approved in its current form
    pub fn is_approved(&self, config_path: &Path) -> Result<bool> {
        Ok(self.approval_file(config_path)?.exists())
    }

    /// Fails unless the config file is approved in its current form.
    pub fn ensure_approved(&self, config_path: &Path) -> Result<()> {
        if self.is_approved(config_path)? {
            return Ok(());
        }
        anyhow::bail!("{} not approved", config_path.display())
    }

    /// Approve a config file
    pub fn approve(&self, config_path: &Path) -> Result<()> {
        let approval_file = self.approval_file(config_path)?;

        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create approval directory: {}", self.dir.display())
        })?;

        // The approval file remembers which config it belongs to, for `list`
        let canonical_path = config_path
            .canonicalize()
            .unwrap_or_else(|_| config_path.to_path_buf());
        fs::write(&approval_file, canonical_path.display().to_string()).with_context(|| {
            format!("Failed to write approval file: {}", approval_file.display())
        })?;

        Ok(())
    }

    /// Remove the approval for a config file
    pub fn deny(&self, config_path: &Path) -> Result<()> {
        let approval_file = self.approval_file(config_path)?;

        if approval_file.exists() {
            fs::remove_file(&approval_file).with_context(|| {
                format!("Failed to remove approval file: {}", approval_file.display())
            })?;
        }

        Ok(())
    }

    /// List all approved config files
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut approved = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| {
            format!("Failed to read approval directory: {}", self.dir.display())
        })? {
            let entry = entry?;
            if entry.path().is_file() {
                if let Ok(path_content) = fs::read_to_string(entry.path()) {
                    approved.push(path_content);
                }
            }
        }
        approved.sort();

        Ok(approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approve_then_deny() {
        let store_dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let config = work.path().join("mdexec.toml");
        fs::write(&config, "[languages.lua]\ncommand = \"lua\"\n").unwrap();

        let store = ApprovalStore::at(store_dir.path().join("allow"));
        assert!(!store.is_approved(&config).unwrap());
        assert!(store.list().unwrap().is_empty());

        store.approve(&config).unwrap();
        assert!(store.is_approved(&config).unwrap());
        assert_eq!(store.list().unwrap().len(), 1);

        store.deny(&config).unwrap();
        assert!(!store.is_approved(&config).unwrap());
        let err = store.ensure_approved(&config).unwrap_err();
        assert!(err.to_string().contains("not approved"));
    }

    #[test]
    fn test_editing_config_revokes_approval() {
        let store_dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let config = work.path().join("mdexec.toml");
        fs::write(&config, "[languages.lua]\ncommand = \"lua\"\n").unwrap();

        let store = ApprovalStore::at(store_dir.path());
        store.approve(&config).unwrap();

        fs::write(&config, "[languages.lua]\ncommand = \"evil\"\n").unwrap();
        assert!(!store.is_approved(&config).unwrap());
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let store_dir = tempfile::tempdir().unwrap();
        let store = ApprovalStore::at(store_dir.path());
        assert!(store.is_approved(Path::new("/nonexistent/mdexec.toml")).is_err());
    }

    #[test]
    fn test_hash_depends_on_content() {
        let a = compute_hash(Path::new("/x/mdexec.toml"), "a");
        let b = compute_hash(Path::new("/x/mdexec.toml"), "b");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
