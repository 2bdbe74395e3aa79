//! Class-level aggregation: clustering, distributions, coverage, long tail.
//!
//! Everything here is a pure function of the record slice and the rule
//! table. Ordering is fully determined (count descending, then name
//! ascending), so two runs over the same records aggregate identically.

use std::collections::{BTreeMap, HashSet};

use failure_taxonomy_core::{FailureRecord, RuleTable, SourceType, Stage, StructuralLabel};

use crate::config::ThresholdConfig;

/// Representative signals kept per cluster.
pub const MAX_REPRESENTATIVES: usize = 3;
/// Characters kept of each representative signal.
pub const REPRESENTATIVE_CHAR_LIMIT: usize = 240;

/// Occurrences of one canonical class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassCount {
    pub canonical_class: String,
    pub occurrences: usize,
    /// Share of all records, unrounded.
    pub percent: f64,
}

/// Occurrences of one pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCount {
    pub stage: Stage,
    pub occurrences: usize,
    pub percent: f64,
}

/// Records grouped under one canonical class.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub canonical_class: String,
    pub occurrences: usize,
    /// Distinct raw signals in first-seen order, truncated.
    pub representative_examples: Vec<String>,
    pub structural_label: StructuralLabel,
}

/// Classifier coverage over the record set.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageScore {
    pub total: usize,
    pub classified_count: usize,
    pub classified_percent: f64,
    pub unknown_count: usize,
    pub unknown_percent: f64,
    /// Unknown share exceeds the insufficiency threshold.
    pub taxonomy_insufficient: bool,
}

/// All class-level aggregates of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    pub total: usize,
    /// Every observed class, count descending then name ascending.
    pub class_counts: Vec<ClassCount>,
    pub stage_counts: Vec<StageCount>,
    pub source_counts: BTreeMap<SourceType, usize>,
    /// One cluster per observed class, same order as `class_counts`.
    pub clusters: Vec<Cluster>,
    pub top_classes: Vec<ClassCount>,
    /// Classes below the long-tail share, same order as `class_counts`.
    pub long_tail: Vec<ClassCount>,
    pub long_tail_share: f64,
    /// Combined long-tail share exceeds the proliferation threshold.
    pub rule_proliferation: bool,
    pub coverage: CoverageScore,
}

/// `num / den` as a percentage; zero for an empty denominator.
pub fn percent(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        100.0 * num as f64 / den as f64
    }
}

/// Rounds to two decimal places for emission.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregates `records` by canonical class.
///
/// # Examples
///
/// ```
/// use failure_taxonomy_core::RuleTable;
/// use failure_taxonomy_mining::aggregate::aggregate;
/// use failure_taxonomy_mining::config::ThresholdConfig;
///
/// let aggregates = aggregate(&[], &RuleTable::builtin(), &ThresholdConfig::default(), 10);
/// assert_eq!(aggregates.total, 0);
/// assert_eq!(aggregates.coverage.classified_percent, 0.0);
/// assert!(!aggregates.rule_proliferation);
/// ```
pub fn aggregate(
    records: &[FailureRecord],
    rules: &RuleTable,
    thresholds: &ThresholdConfig,
    top_n: usize,
) -> Aggregates {
    let total = records.len();

    let mut by_class: BTreeMap<&str, Vec<&FailureRecord>> = BTreeMap::new();
    for record in records {
        by_class
            .entry(record.canonical_class.as_str())
            .or_default()
            .push(record);
    }

    let mut groups: Vec<(&str, Vec<&FailureRecord>)> = by_class.into_iter().collect();
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

    let class_counts: Vec<ClassCount> = groups
        .iter()
        .map(|(class, members)| ClassCount {
            canonical_class: (*class).to_string(),
            occurrences: members.len(),
            percent: percent(members.len(), total),
        })
        .collect();

    let clusters = groups
        .iter()
        .map(|(class, members)| Cluster {
            canonical_class: (*class).to_string(),
            occurrences: members.len(),
            representative_examples: representative_examples(members),
            structural_label: rules.structural_label_for(class),
        })
        .collect();

    let long_tail: Vec<ClassCount> = class_counts
        .iter()
        .filter(|count| count.percent < thresholds.long_tail_percent)
        .cloned()
        .collect();
    let long_tail_share = percent(long_tail.iter().map(|c| c.occurrences).sum(), total);

    let unknown_count = records.iter().filter(|r| r.is_unknown()).count();
    let classified_count = total - unknown_count;
    let unknown_percent = percent(unknown_count, total);

    Aggregates {
        total,
        top_classes: class_counts.iter().take(top_n).cloned().collect(),
        stage_counts: stage_counts(records),
        source_counts: source_counts(records),
        clusters,
        long_tail,
        long_tail_share,
        rule_proliferation: long_tail_share > thresholds.proliferation_percent,
        coverage: CoverageScore {
            total,
            classified_count,
            classified_percent: percent(classified_count, total),
            unknown_count,
            unknown_percent,
            taxonomy_insufficient: unknown_percent > thresholds.insufficiency_percent,
        },
        class_counts,
    }
}

fn representative_examples(members: &[&FailureRecord]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut examples = Vec::new();
    for record in members {
        if seen.insert(record.raw_signal.as_str()) {
            examples.push(
                record
                    .raw_signal
                    .chars()
                    .take(REPRESENTATIVE_CHAR_LIMIT)
                    .collect(),
            );
        }
        if examples.len() >= MAX_REPRESENTATIVES {
            break;
        }
    }
    examples
}

fn stage_counts(records: &[FailureRecord]) -> Vec<StageCount> {
    let mut counts: BTreeMap<Stage, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.stage).or_default() += 1;
    }
    let mut stages: Vec<StageCount> = counts
        .into_iter()
        .map(|(stage, occurrences)| StageCount {
            stage,
            occurrences,
            percent: percent(occurrences, records.len()),
        })
        .collect();
    stages.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.stage.as_str().cmp(b.stage.as_str()))
    });
    stages
}

fn source_counts(records: &[FailureRecord]) -> BTreeMap<SourceType, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.source_type).or_default() += 1;
    }
    counts
}
