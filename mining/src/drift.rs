//! Heuristic drift findings over the record set.
//!
//! Repeated signatures surface packages failing the same way across several
//! artifacts. Patch drift flags logs where a patch step ran but the failure
//! was attributed to something other than patch application. Normalization
//! candidates attach the rule table's remediation metadata to every observed
//! class.

use std::collections::HashMap;

use failure_taxonomy_core::{
    AutomationFeasibility, FailureRecord, NormalizationLayer, PATCH_APPLICATION_CLASS, RuleTable,
    SourceType,
};
use serde::Serialize;

use crate::aggregate::ClassCount;

/// A (package, class) pair seen more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepeatedSignature {
    pub package: String,
    pub canonical_class: String,
    pub occurrences: usize,
}

/// A build log with patch activity whose class is not patch application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchDriftFinding {
    pub package: String,
    pub canonical_class: String,
    pub artifact_path: String,
}

/// Remediation metadata for one observed class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizationCandidate {
    pub failure_category: String,
    pub proposed_layer: NormalizationLayer,
    pub automation_feasibility: AutomationFeasibility,
    pub deterministic_normalization_opportunity: bool,
    pub occurrences: usize,
    /// Share of all records, unrounded.
    pub estimated_impact_percent: f64,
}

/// Counts (package, class) pairs and keeps those seen at least
/// `min_occurrences` times, most frequent first, then by package and class.
pub fn repeated_signatures(
    records: &[FailureRecord],
    min_occurrences: usize,
) -> Vec<RepeatedSignature> {
    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    for record in records {
        *counts
            .entry((record.package.as_str(), record.canonical_class.as_str()))
            .or_default() += 1;
    }

    let mut repeated: Vec<RepeatedSignature> = counts
        .into_iter()
        .filter(|(_, occurrences)| *occurrences >= min_occurrences)
        .map(|((package, class), occurrences)| RepeatedSignature {
            package: package.to_string(),
            canonical_class: class.to_string(),
            occurrences,
        })
        .collect();
    repeated.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.package.cmp(&b.package))
            .then_with(|| a.canonical_class.cmp(&b.canonical_class))
    });
    repeated
}

/// Build-log records with patch activity not classified as a patch
/// application failure, in record order.
pub fn patch_drift(records: &[FailureRecord]) -> Vec<PatchDriftFinding> {
    records
        .iter()
        .filter(|r| r.source_type == SourceType::BuildLog)
        .filter(|r| r.has_patch_activity == Some(true))
        .filter(|r| r.canonical_class != PATCH_APPLICATION_CLASS)
        .map(|r| PatchDriftFinding {
            package: r.package.clone(),
            canonical_class: r.canonical_class.clone(),
            artifact_path: r.artifact_path.clone(),
        })
        .collect()
}

/// One candidate per observed class, in the order of `class_counts`.
///
/// `class_counts` is expected sorted by count descending then name, as
/// [`aggregate`](crate::aggregate::aggregate) produces it.
pub fn normalization_candidates(
    class_counts: &[ClassCount],
    rules: &RuleTable,
) -> Vec<NormalizationCandidate> {
    class_counts
        .iter()
        .map(|count| {
            let profile = rules.candidate_profile(&count.canonical_class);
            NormalizationCandidate {
                failure_category: count.canonical_class.clone(),
                proposed_layer: profile.normalization_layer,
                automation_feasibility: profile.automation_feasibility,
                deterministic_normalization_opportunity: profile.deterministic_opportunity,
                occurrences: count.occurrences,
                estimated_impact_percent: count.percent,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use failure_taxonomy_core::{ExecutionMode, Stage, StageFailure, UNKNOWN_CLASS};

    use super::*;
    use crate::aggregate::aggregate;
    use crate::config::ThresholdConfig;

    fn record(
        source: SourceType,
        package: &str,
        class: &str,
        patched: Option<bool>,
    ) -> FailureRecord {
        FailureRecord {
            source_type: source,
            artifact_path: format!("{package}.log"),
            timestamp: String::new(),
            package: package.to_string(),
            stage: Stage::Build,
            stage_failure: StageFailure::BuildFailure,
            canonical_class: class.to_string(),
            raw_signal: String::new(),
            log_excerpt: String::new(),
            execution_mode: ExecutionMode::Unknown,
            has_patch_activity: patched,
        }
    }

    #[test]
    fn test_repeated_signatures_threshold_and_order() {
        let records = vec![
            record(SourceType::BuildLog, "zlib", "MissingHeaderOrIncludePath", None),
            record(SourceType::BadSpec, "zlib", "MissingHeaderOrIncludePath", None),
            record(SourceType::BuildLog, "abc", "CMakeConfigurationFailure", None),
            record(SourceType::FailureGatheringTable, "abc", "CMakeConfigurationFailure", None),
            record(SourceType::BuildLog, "abc", "CMakeConfigurationFailure", None),
            record(SourceType::BuildLog, "abc", UNKNOWN_CLASS, None),
            record(SourceType::BuildLog, "aaa", "PatchApplicationFailure", None),
            record(SourceType::BuildLog, "aaa", "PatchApplicationFailure", None),
        ];
        let repeated = repeated_signatures(&records, 2);
        let summary: Vec<(&str, &str, usize)> = repeated
            .iter()
            .map(|r| (r.package.as_str(), r.canonical_class.as_str(), r.occurrences))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("abc", "CMakeConfigurationFailure", 3),
                ("aaa", "PatchApplicationFailure", 2),
                ("zlib", "MissingHeaderOrIncludePath", 2),
            ]
        );
        assert_eq!(repeated_signatures(&records, 3).len(), 1);
    }

    #[test]
    fn test_patch_drift_only_flags_misattributed_build_logs() {
        let records = vec![
            record(SourceType::BuildLog, "a", "MissingLinkTimeDependency", Some(true)),
            record(SourceType::BuildLog, "b", PATCH_APPLICATION_CLASS, Some(true)),
            record(SourceType::BuildLog, "c", "MissingLinkTimeDependency", Some(false)),
            record(SourceType::BadSpec, "d", "MissingLinkTimeDependency", None),
            record(SourceType::BuildLog, "e", UNKNOWN_CLASS, Some(true)),
        ];
        let drift = patch_drift(&records);
        let packages: Vec<&str> = drift.iter().map(|d| d.package.as_str()).collect();
        assert_eq!(packages, vec!["a", "e"]);
        assert_eq!(drift[0].artifact_path, "a.log");
    }

    #[test]
    fn test_candidates_follow_rule_metadata() {
        let records = vec![
            record(SourceType::BuildLog, "a", "MissingHeaderOrIncludePath", None),
            record(SourceType::BuildLog, "b", "MissingHeaderOrIncludePath", None),
            record(SourceType::BuildLog, "c", UNKNOWN_CLASS, None),
        ];
        let rules = RuleTable::builtin();
        let aggregates = aggregate(&records, &rules, &ThresholdConfig::default(), 10);
        let candidates = normalization_candidates(&aggregates.class_counts, &rules);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].failure_category, "MissingHeaderOrIncludePath");
        let profile = rules.candidate_profile("MissingHeaderOrIncludePath");
        assert_eq!(candidates[0].proposed_layer, profile.normalization_layer);
        assert_eq!(candidates[0].occurrences, 2);

        let unknown = &candidates[1];
        assert_eq!(unknown.failure_category, UNKNOWN_CLASS);
        assert_eq!(unknown.proposed_layer, NormalizationLayer::GovernanceException);
        assert_eq!(unknown.automation_feasibility, AutomationFeasibility::Low);
        assert!(!unknown.deterministic_normalization_opportunity);
        assert!((unknown.estimated_impact_percent - 100.0 / 3.0).abs() < 1e-9);
    }
}
