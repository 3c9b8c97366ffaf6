//! Common test utilities for integration tests
//!
//! This module contains shared test fixtures and helper functions used across
//! integration tests. These utilities are not compiled into the library.

use anyhow::Result;
use mdexec::{CapabilityTable, FileConfig, Runner};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated test fixture with automatic cleanup
///
/// Creates a temporary copy of a fixture directory, allowing tests to run
/// in parallel without interfering with each other.
pub struct TestFixture {
    _dir: TempDir,
    root: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture from a specific source directory
    pub fn new(source: impl AsRef<Path>) -> Result<Self> {
        let dir = TempDir::new()?;

        // Copy fixture to temp location
        copy_dir_all(source.as_ref(), dir.path())?;

        Ok(Self {
            root: dir.path().to_path_buf(),
            _dir: dir,
        })
    }

    /// Get the path to the fixture directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Documents in the fixture, by name, in the given order
    pub fn docs(&self, names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|name| self.root.join(name)).collect()
    }

    /// Runner over the given documents with the built-in languages
    pub fn runner(&self, names: &[&str]) -> Runner {
        Runner::new(self.docs(names), CapabilityTable::builtin())
    }

    /// Runner over the given documents with the languages of the fixture's
    /// `mdexec.toml`
    pub fn configured_runner(&self, names: &[&str]) -> Result<Runner> {
        let config = FileConfig::load(&self.root.join("mdexec.toml"))?;
        let capabilities = CapabilityTable::from_config(&config)?;
        Ok(Runner::new(self.docs(names), capabilities))
    }
}

/// Recursively copy all files and directories from src to dst
fn copy_dir_all(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    std::fs::create_dir_all(&dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        if ty.is_dir() {
            copy_dir_all(entry.path(), dst.as_ref().join(entry.file_name()))?;
        } else {
            std::fs::copy(entry.path(), dst.as_ref().join(entry.file_name()))?;
        }
    }
    Ok(())
}
