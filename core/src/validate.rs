//! Rule table validation.
//!
//! Catches structural problems in a rule table before it is compiled:
//! empty, padded or duplicate canonical names, use of the reserved
//! `Unknown` sentinel, and patterns that are empty or fail to compile.
//!
//! # Examples
//!
//! ```
//! use failure_taxonomy_core::*;
//!
//! assert!(validate_definitions(&builtin_definitions()).is_empty());
//!
//! let mut defs = builtin_definitions();
//! defs.push(defs[0].clone());
//! let errors = validate_definitions(&defs);
//! assert!(errors.iter().any(|e| matches!(e, RuleTableError::DuplicateCanonical(_))));
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::rules::{RuleDefinition, compile_pattern};
use crate::types::UNKNOWN_CLASS;

/// Rule table validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleTableError {
    /// Canonical name is empty or whitespace-only.
    #[error("rule canonical name cannot be empty")]
    EmptyCanonical,
    /// Canonical name has leading or trailing whitespace.
    #[error("rule canonical name has surrounding whitespace: {0:?}")]
    PaddedCanonical(String),
    /// Canonical name collides with the unclassified sentinel.
    #[error("rule canonical name is reserved: {0}")]
    ReservedCanonical(String),
    /// Two rules share a canonical name.
    #[error("duplicate rule canonical name: {0}")]
    DuplicateCanonical(String),
    /// Pattern is empty and would match every signal.
    #[error("rule {0} has an empty pattern")]
    EmptyPattern(String),
    /// Pattern does not compile.
    #[error("rule {canonical} has an invalid pattern: {detail}")]
    InvalidPattern { canonical: String, detail: String },
}

/// Validates rule definitions in declaration order.
///
/// Every problem is reported; callers that only need a pass/fail answer can
/// check `is_empty()`.
pub fn validate_definitions(definitions: &[RuleDefinition]) -> Vec<RuleTableError> {
    let mut errors = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for definition in definitions {
        let canonical = definition.canonical.trim();
        if canonical.is_empty() {
            errors.push(RuleTableError::EmptyCanonical);
            continue;
        }
        if canonical != definition.canonical {
            errors.push(RuleTableError::PaddedCanonical(definition.canonical.clone()));
        }
        if canonical == UNKNOWN_CLASS {
            errors.push(RuleTableError::ReservedCanonical(canonical.to_string()));
        }
        if !seen.insert(canonical) {
            errors.push(RuleTableError::DuplicateCanonical(canonical.to_string()));
        }
        if definition.pattern.trim().is_empty() {
            errors.push(RuleTableError::EmptyPattern(canonical.to_string()));
            continue;
        }
        if let Err(err) = compile_pattern(canonical, &definition.pattern) {
            errors.push(err);
        }
    }

    errors
}
