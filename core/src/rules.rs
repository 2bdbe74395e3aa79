//! Ordered classification rule table and first-match classifier.
//!
//! The table is a priority chain: rules are evaluated strictly in declaration
//! order and the first rule whose pattern matches anywhere in the text wins.
//! Ecosystem-specific rules are declared ahead of the generic ones they
//! overlap with, so reordering the table changes classification outcomes.
//!
//! # Examples
//!
//! ```
//! use failure_taxonomy_core::{RuleTable, Stage};
//!
//! let table = RuleTable::builtin();
//! let rule = table
//!     .classify("fatal error: zlib.h: No such file or directory")
//!     .unwrap();
//! assert_eq!(rule.canonical(), "MissingHeaderOrIncludePath");
//! assert_eq!(rule.stage(), Stage::Build);
//!
//! assert!(table.classify("all tests passed").is_none());
//! ```

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::types::{
    AutomationFeasibility, NormalizationLayer, Stage, StageFailure, StructuralLabel,
    UNKNOWN_CLASS,
};
use crate::validate::{RuleTableError, validate_definitions};

/// Uncompiled rule as declared in the built-in table or a rules file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Canonical failure class name.
    pub canonical: String,
    pub stage: Stage,
    pub stage_failure: StageFailure,
    /// Regex matched case-insensitively anywhere in the signal text.
    pub pattern: String,
    pub structural_label: StructuralLabel,
    pub normalization_layer: NormalizationLayer,
    pub automation_feasibility: AutomationFeasibility,
    pub deterministic_opportunity: bool,
}

/// Normalization metadata attached to a canonical class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CandidateProfile {
    pub normalization_layer: NormalizationLayer,
    pub automation_feasibility: AutomationFeasibility,
    pub deterministic_opportunity: bool,
}

impl CandidateProfile {
    /// Profile assumed for signals no rule recognizes.
    pub const UNKNOWN: Self = Self {
        normalization_layer: NormalizationLayer::GovernanceException,
        automation_feasibility: AutomationFeasibility::Low,
        deterministic_opportunity: false,
    };
}

/// A rule definition paired with its compiled matcher.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    definition: RuleDefinition,
    matcher: Regex,
}

impl ClassificationRule {
    fn compile(definition: RuleDefinition) -> Result<Self, RuleTableError> {
        let matcher = compile_pattern(&definition.canonical, &definition.pattern)?;
        Ok(Self {
            definition,
            matcher,
        })
    }

    pub fn canonical(&self) -> &str {
        &self.definition.canonical
    }

    pub fn stage(&self) -> Stage {
        self.definition.stage
    }

    pub fn stage_failure(&self) -> StageFailure {
        self.definition.stage_failure
    }

    pub fn pattern(&self) -> &str {
        &self.definition.pattern
    }

    pub fn structural_label(&self) -> StructuralLabel {
        self.definition.structural_label
    }

    pub fn candidate_profile(&self) -> CandidateProfile {
        CandidateProfile {
            normalization_layer: self.definition.normalization_layer,
            automation_feasibility: self.definition.automation_feasibility,
            deterministic_opportunity: self.definition.deterministic_opportunity,
        }
    }

    pub fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    /// Returns `true` when the pattern occurs anywhere in `text`.
    pub fn matches(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}

pub(crate) fn compile_pattern(canonical: &str, pattern: &str) -> Result<Regex, RuleTableError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| RuleTableError::InvalidPattern {
            canonical: canonical.to_string(),
            detail: err.to_string(),
        })
}

/// Immutable, ordered rule table.
///
/// Construct one explicitly and pass it by reference to the extractors and
/// analyses; the table holds no interior state and can be shared freely
/// across threads and runs.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<ClassificationRule>,
}

impl RuleTable {
    /// Builds the built-in campaign rule table.
    pub fn builtin() -> Self {
        let rules = builtin_definitions()
            .into_iter()
            .map(|definition| {
                ClassificationRule::compile(definition).expect("static regex must compile")
            })
            .collect();
        Self { rules }
    }

    /// Validates and compiles a custom table, keeping declaration order.
    ///
    /// # Errors
    ///
    /// Returns the first [`RuleTableError`] found by
    /// [`validate_definitions`](crate::validate_definitions).
    ///
    /// # Examples
    ///
    /// ```
    /// use failure_taxonomy_core::*;
    ///
    /// let defs = vec![RuleDefinition {
    ///     canonical: "DiskFull".to_string(),
    ///     stage: Stage::Build,
    ///     stage_failure: StageFailure::BuildFailure,
    ///     pattern: "No space left on device".to_string(),
    ///     structural_label: StructuralLabel::ToolchainDrift,
    ///     normalization_layer: NormalizationLayer::GovernanceException,
    ///     automation_feasibility: AutomationFeasibility::Low,
    ///     deterministic_opportunity: false,
    /// }];
    /// let table = RuleTable::from_definitions(defs).unwrap();
    /// let rule = table.classify("write: no space left on device").unwrap();
    /// assert_eq!(rule.canonical(), "DiskFull");
    /// ```
    pub fn from_definitions(definitions: Vec<RuleDefinition>) -> Result<Self, RuleTableError> {
        if let Some(err) = validate_definitions(&definitions).into_iter().next() {
            return Err(err);
        }
        let rules = definitions
            .into_iter()
            .map(ClassificationRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Returns the first rule, in priority order, matching `text`.
    pub fn classify(&self, text: &str) -> Option<&ClassificationRule> {
        self.classify_indexed(text).map(|(_, rule)| rule)
    }

    /// Like [`classify`](Self::classify), also returning the zero-based
    /// position of the matching rule.
    pub fn classify_indexed(&self, text: &str) -> Option<(usize, &ClassificationRule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(text))
    }

    /// Looks up a rule by canonical class name.
    pub fn get(&self, canonical: &str) -> Option<&ClassificationRule> {
        self.rules.iter().find(|rule| rule.canonical() == canonical)
    }

    /// Rules in priority order.
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClassificationRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Owned copies of the definitions, in priority order.
    pub fn definitions(&self) -> Vec<RuleDefinition> {
        self.rules.iter().map(|r| r.definition.clone()).collect()
    }

    /// Structural label for a class; unknown or undeclared classes are
    /// attributed to adapter infrastructure.
    pub fn structural_label_for(&self, canonical: &str) -> StructuralLabel {
        self.get(canonical)
            .map(ClassificationRule::structural_label)
            .unwrap_or(StructuralLabel::AdapterInfrastructureIssue)
    }

    /// Normalization profile for a class, [`CandidateProfile::UNKNOWN`] for
    /// the sentinel and any undeclared name.
    pub fn candidate_profile(&self, canonical: &str) -> CandidateProfile {
        if canonical == UNKNOWN_CLASS {
            return CandidateProfile::UNKNOWN;
        }
        self.get(canonical)
            .map(ClassificationRule::candidate_profile)
            .unwrap_or(CandidateProfile::UNKNOWN)
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<'a> IntoIterator for &'a RuleTable {
    type Item = &'a ClassificationRule;
    type IntoIter = std::slice::Iter<'a, ClassificationRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[allow(clippy::too_many_arguments)]
fn def(
    canonical: &str,
    stage: Stage,
    stage_failure: StageFailure,
    pattern: &str,
    structural_label: StructuralLabel,
    normalization_layer: NormalizationLayer,
    automation_feasibility: AutomationFeasibility,
    deterministic_opportunity: bool,
) -> RuleDefinition {
    RuleDefinition {
        canonical: canonical.to_string(),
        stage,
        stage_failure,
        pattern: pattern.to_string(),
        structural_label,
        normalization_layer,
        automation_feasibility,
        deterministic_opportunity,
    }
}

/// Built-in rule definitions in priority order.
///
/// Keep the R and Python dependency rules ahead of the header/link rules and
/// the patch rule ahead of the generic build-script rule; later rules assume
/// the earlier ones already claimed their overlap.
pub fn builtin_definitions() -> Vec<RuleDefinition> {
    use AutomationFeasibility::{High, Low, Medium};
    use NormalizationLayer::*;
    use Stage::*;
    use StageFailure::*;
    use StructuralLabel::*;

    vec![
        def(
            "MetadataAdapterRuntimeMissing",
            Ingestion,
            AdapterConstraintFailure,
            r"(conda[_-]?build.*(not installed|import failed)|No module named 'conda_build')",
            AdapterInfrastructureIssue,
            ModulePolicy,
            High,
            true,
        ),
        def(
            "MetadataRenderFailure",
            Ingestion,
            RecipeParseFailure,
            r"failed to parse rendered metadata",
            AdapterInfrastructureIssue,
            ModulePolicy,
            High,
            true,
        ),
        def(
            "DependencyBlockedCascade",
            DependencyNormalization,
            DependencyResolutionFailure,
            r"blocked by failed dependencies",
            DependencyTranslationDefect,
            DependencyClassifier,
            High,
            true,
        ),
        def(
            "UnresolvedBuildRequiresToken",
            DependencyNormalization,
            DependencyResolutionFailure,
            r"(DEPGRAPH\|[^|]+\|unresolved\||Failed build dependencies:|No match for argument:)",
            DependencyTranslationDefect,
            DependencyClassifier,
            High,
            true,
        ),
        def(
            "RDependencyRestoreFailure",
            Build,
            BuildFailure,
            r"(unresolved R deps after restore|dependency '.*' is not available)",
            StructuralEcosystemMismatch,
            DependencyClassifier,
            Medium,
            true,
        ),
        def(
            "PythonImportOrABIError",
            Build,
            BuildFailure,
            r"(No module named |ImportError:|DistributionNotFound)",
            StructuralEcosystemMismatch,
            DependencyClassifier,
            Medium,
            true,
        ),
        def(
            "MissingHeaderOrIncludePath",
            Build,
            BuildFailure,
            r"fatal error: .*No such file or directory",
            DependencyTranslationDefect,
            DependencyClassifier,
            High,
            true,
        ),
        def(
            "MissingLinkTimeDependency",
            Build,
            BuildFailure,
            r"(undefined reference to|cannot find -l|no usable version found)",
            DependencyTranslationDefect,
            DependencyClassifier,
            High,
            true,
        ),
        def(
            "CMakeConfigurationFailure",
            Build,
            BuildFailure,
            r"CMake Error",
            ToolchainDrift,
            SourceNormalizer,
            Medium,
            true,
        ),
        def(
            "AutotoolsConfigureFailure",
            Build,
            BuildFailure,
            r"configure: error:",
            ToolchainDrift,
            SourceNormalizer,
            Medium,
            true,
        ),
        def(
            "PatchApplicationFailure",
            SourceNormalization,
            SpecSynthesisFailure,
            r"(can't find file to patch|No file to patch|Hunk .*FAILED)",
            UpstreamBuildDefect,
            SourceNormalizer,
            Low,
            false,
        ),
        def(
            "SourceFetchFailure",
            SourceNormalization,
            InfrastructureGateFailure,
            r"(source download failed after retries|Downloaded: .* failed)",
            AdapterInfrastructureIssue,
            SourceNormalizer,
            Medium,
            true,
        ),
        def(
            "BuildScriptContractFailure",
            Build,
            BuildFailure,
            r"(empty string invalid as file name|No rule to make target|No targets specified and no makefile found|C compiler cannot create executables)",
            UpstreamBuildDefect,
            SourceNormalizer,
            Low,
            false,
        ),
        def(
            "ToolchainResourceExhaustion",
            Build,
            BuildFailure,
            r"(exit status: 137|signal: 9|Killed)",
            ToolchainDrift,
            GovernanceException,
            Low,
            true,
        ),
        def(
            "RpmInstallScriptFailure",
            Build,
            BuildFailure,
            r"Bad exit status from .* \(%install\)",
            UpstreamBuildDefect,
            SpecGenerator,
            Low,
            false,
        ),
    ]
}

/// Canonical class of the dedicated patch-application rule.
pub const PATCH_APPLICATION_CLASS: &str = "PatchApplicationFailure";
