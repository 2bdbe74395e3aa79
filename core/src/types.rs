//! Failure record type definitions.
//!
//! This module defines the shared vocabulary every extractor and analysis
//! agrees on: pipeline stages, stage-failure kinds, structural labels, and the
//! normalized [`FailureRecord`]. The closed vocabularies are plain enums so a
//! record can never carry a stage or label outside the taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical class assigned when no rule matches a signal.
pub const UNKNOWN_CLASS: &str = "Unknown";

/// Campaign phase where a failure originated.
///
/// # Examples
///
/// ```
/// use failure_taxonomy_core::Stage;
///
/// assert_eq!(Stage::DependencyNormalization.to_string(), "DependencyNormalization");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Ingestion,
    SourceNormalization,
    DependencyNormalization,
    Build,
}

impl Stage {
    /// Returns the stable name used in tables and JSON.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingestion => "Ingestion",
            Self::SourceNormalization => "SourceNormalization",
            Self::DependencyNormalization => "DependencyNormalization",
            Self::Build => "Build",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of failure within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageFailure {
    AdapterConstraintFailure,
    RecipeParseFailure,
    DependencyResolutionFailure,
    BuildFailure,
    SpecSynthesisFailure,
    InfrastructureGateFailure,
}

impl StageFailure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdapterConstraintFailure => "AdapterConstraintFailure",
            Self::RecipeParseFailure => "RecipeParseFailure",
            Self::DependencyResolutionFailure => "DependencyResolutionFailure",
            Self::BuildFailure => "BuildFailure",
            Self::SpecSynthesisFailure => "SpecSynthesisFailure",
            Self::InfrastructureGateFailure => "InfrastructureGateFailure",
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse root-cause category of a failure class.
///
/// Serialized as the spaced human label (e.g. `"Toolchain Drift"`), which is
/// also what the reports print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructuralLabel {
    #[serde(rename = "Adapter Infrastructure Issue")]
    AdapterInfrastructureIssue,
    #[serde(rename = "Dependency Translation Defect")]
    DependencyTranslationDefect,
    #[serde(rename = "Toolchain Drift")]
    ToolchainDrift,
    #[serde(rename = "Upstream Build Defect")]
    UpstreamBuildDefect,
    #[serde(rename = "Structural Ecosystem Mismatch")]
    StructuralEcosystemMismatch,
}

impl StructuralLabel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::AdapterInfrastructureIssue => "Adapter Infrastructure Issue",
            Self::DependencyTranslationDefect => "Dependency Translation Defect",
            Self::ToolchainDrift => "Toolchain Drift",
            Self::UpstreamBuildDefect => "Upstream Build Defect",
            Self::StructuralEcosystemMismatch => "Structural Ecosystem Mismatch",
        }
    }
}

impl fmt::Display for StructuralLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Layer of the porting pipeline proposed to absorb a failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NormalizationLayer {
    ModulePolicy,
    DependencyClassifier,
    SourceNormalizer,
    SpecGenerator,
    GovernanceException,
}

impl NormalizationLayer {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModulePolicy => "ModulePolicy",
            Self::DependencyClassifier => "DependencyClassifier",
            Self::SourceNormalizer => "SourceNormalizer",
            Self::SpecGenerator => "SpecGenerator",
            Self::GovernanceException => "GovernanceException",
        }
    }
}

impl fmt::Display for NormalizationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How readily a failure class can be fixed by automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutomationFeasibility {
    High,
    Medium,
    Low,
}

impl AutomationFeasibility {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for AutomationFeasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact family a record was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// `reason=` line of a failed recipe spec.
    BadSpec,
    /// Console log of a final (non-retry) build attempt.
    BuildLog,
    /// Row of a per-package failure-gathering table.
    FailureGatheringTable,
}

impl SourceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadSpec => "bad_spec",
            Self::BuildLog => "build_log",
            Self::FailureGatheringTable => "failure_gathering_table",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment context the failure was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExecutionMode {
    Production,
    #[default]
    Unknown,
}

impl ExecutionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "Production",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed failure instance.
///
/// Records are produced by the extractors and never modified afterwards;
/// every downstream analysis reads them by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub source_type: SourceType,
    pub artifact_path: String,
    /// Artifact modification time, RFC 3339 in UTC.
    pub timestamp: String,
    pub package: String,
    pub stage: Stage,
    pub stage_failure: StageFailure,
    /// A declared rule's canonical name or [`UNKNOWN_CLASS`].
    pub canonical_class: String,
    pub raw_signal: String,
    pub log_excerpt: String,
    pub execution_mode: ExecutionMode,
    /// Only build-log records carry a patch-activity observation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_patch_activity: Option<bool>,
}

impl FailureRecord {
    /// Returns `true` when no rule classified this record.
    pub fn is_unknown(&self) -> bool {
        self.canonical_class == UNKNOWN_CLASS
    }
}

/// Stage, stage-failure kind, and canonical class resolved for one signal.
///
/// # Examples
///
/// ```
/// use failure_taxonomy_core::{ClassOutcome, Stage, StageFailure, UNKNOWN_CLASS};
///
/// let outcome = ClassOutcome::resolve(None, (Stage::Build, StageFailure::BuildFailure));
/// assert_eq!(outcome.canonical_class, UNKNOWN_CLASS);
/// assert_eq!(outcome.stage, Stage::Build);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassOutcome {
    pub stage: Stage,
    pub stage_failure: StageFailure,
    pub canonical_class: String,
}

impl ClassOutcome {
    /// Resolves the outcome for an optional matched rule, using `fallback`
    /// for stage and stage-failure when nothing matched.
    pub fn resolve(
        rule: Option<&crate::ClassificationRule>,
        fallback: (Stage, StageFailure),
    ) -> Self {
        match rule {
            Some(rule) => Self {
                stage: rule.stage(),
                stage_failure: rule.stage_failure(),
                canonical_class: rule.canonical().to_string(),
            },
            None => Self {
                stage: fallback.0,
                stage_failure: fallback.1,
                canonical_class: UNKNOWN_CLASS.to_string(),
            },
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.canonical_class == UNKNOWN_CLASS
    }
}
