//! mdexec library
//!
//! Finds the fenced code examples in Markdown documents, runs (or extracts)
//! each one with the matching language toolchain, and reports the ones that
//! failed. The primary interface is the `mdexec` binary, but the library can be
//! used programmatically for testing or custom integrations.
//!
//! ## Public API
//!
//! The main entry point is [`Runner`], which walks a list of documents and
//! returns the [`RunError`]s found.
//!
//! Additional building blocks:
//! - [`Finder`] / [`MarkdownFinder`] - locate examples in a document
//! - [`Capability`] / [`CapabilityTable`] - per-language execution strategies
//! - [`Languages`] - language catalog used to resolve aliases like `py`
//! - [`FileConfig`] / [`ApprovalStore`] - config file and its approval

pub mod approval;
pub mod capability;
pub mod config;
pub mod extractor;
pub mod language;
pub mod outcome;
pub mod reporting;
pub mod runner;

pub use approval::ApprovalStore;
pub use capability::{Capability, CapabilityTable, ExecOptions, Step};
pub use config::{FileConfig, LanguageConfig};
pub use extractor::{ExtractedUnit, Finder, MarkdownFinder};
pub use language::{load_languages, Languages};
pub use outcome::{Location, Outcome, RunError, Verdict};
pub use runner::{Mode, Runner};
