//! Error types for failure mining runs.
//!
//! Non-informative artifacts and unclassifiable signals are not errors; they
//! are skipped or recorded as `Unknown`. The only fatal input condition is a
//! target root that cannot be accessed at all.

use std::path::PathBuf;

use failure_taxonomy_core::RuleTableError;
use thiserror::Error;

/// Errors that can occur while mining or emitting reports.
#[derive(Debug, Error)]
pub enum MiningError {
    /// The target root is missing, not a directory, or unreadable.
    #[error("cannot access target root '{}': {reason}", path.display())]
    TargetRootInaccessible { path: PathBuf, reason: String },

    /// File I/O failure while writing outputs or reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Tabular read or write failure.
    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A custom rule table failed validation.
    #[error("invalid rule table: {0}")]
    Rules(#[from] RuleTableError),
}

/// Convenience alias for results with [`MiningError`].
pub type Result<T> = std::result::Result<T, MiningError>;
