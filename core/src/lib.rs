//! Core failure taxonomy types and the ordered classification rule table.
//!
//! This crate defines the foundational pieces of historical build-failure
//! mining:
//!
//! - [`FailureRecord`]: one normalized failure observation, shared by every
//!   artifact extractor.
//! - [`RuleTable`]: an immutable, ordered chain of [`ClassificationRule`]s
//!   evaluated first-match-wins.
//! - [`ClassOutcome`]: the stage, stage-failure kind, and canonical class
//!   resolved for a signal, with source-specific fallbacks.
//!
//! Validation ([`validate_definitions`]) catches malformed custom rule
//! tables before they are compiled.
//!
//! # Example
//!
//! ```
//! use failure_taxonomy_core::*;
//!
//! let table = RuleTable::builtin();
//! let rule = table.classify("No module named 'numpy'");
//! let outcome = ClassOutcome::resolve(rule, (Stage::Build, StageFailure::BuildFailure));
//! assert_eq!(outcome.canonical_class, "PythonImportOrABIError");
//!
//! let outcome = ClassOutcome::resolve(
//!     table.classify("something odd happened"),
//!     (Stage::Ingestion, StageFailure::InfrastructureGateFailure),
//! );
//! assert!(outcome.is_unknown());
//! assert_eq!(outcome.stage, Stage::Ingestion);
//! ```

mod rules;
mod types;
mod validate;

pub use rules::{
    CandidateProfile, ClassificationRule, PATCH_APPLICATION_CLASS, RuleDefinition, RuleTable,
    builtin_definitions,
};
pub use types::*;
pub use validate::{RuleTableError, validate_definitions};
