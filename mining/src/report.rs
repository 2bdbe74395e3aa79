//! Structured summary and narrative report for one mining run.
//!
//! Both renderings are pure functions of a [`MiningRun`], the output paths
//! and the injected generation timestamp.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use failure_taxonomy_core::{AutomationFeasibility, RuleTable, UNKNOWN_CLASS};
use serde::Serialize;

use crate::MiningRun;
use crate::aggregate::round2;
use crate::drift::{PatchDriftFinding, RepeatedSignature};
use crate::extract::NOISE_TOKEN;
use crate::output::OutputPaths;

/// Characters of a rule pattern shown in the narrative priority table.
const PATTERN_DISPLAY_LIMIT: usize = 100;
/// Separator between representative examples inside one table cell.
const EXAMPLE_CELL_SEPARATOR: &str = " <br> ";

/// Artifact counts observed at discovery time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputDiscovery {
    pub bad_spec_files: usize,
    pub build_logs_examined: usize,
    pub failure_gathering_tsv_files: usize,
    pub patch_activity_logs: usize,
    /// Records per source type.
    pub source_counts: BTreeMap<String, usize>,
}

/// Classifier coverage, percentages rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierValidation {
    pub total_historical_failures: usize,
    pub classified_count: usize,
    pub classified_percent: f64,
    pub unknown_count: usize,
    pub unknown_percent: f64,
    pub taxonomy_insufficiency_flag: bool,
}

/// Locations of every emitted artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactIndex {
    pub records_tsv: String,
    pub clusters_tsv: String,
    pub candidates_tsv: String,
    pub summary: String,
    pub report_md: String,
}

impl From<&OutputPaths> for ArtifactIndex {
    fn from(paths: &OutputPaths) -> Self {
        Self {
            records_tsv: paths.records_tsv.display().to_string(),
            clusters_tsv: paths.clusters_tsv.display().to_string(),
            candidates_tsv: paths.candidates_tsv.display().to_string(),
            summary: paths.summary.display().to_string(),
            report_md: paths.report_md.display().to_string(),
        }
    }
}

/// Machine-readable summary of a mining run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiningSummary {
    pub target_root: String,
    pub generated_at_utc: String,
    /// SHA-256 of the artifact snapshot the run analysed.
    pub input_fingerprint: String,
    pub input_discovery: InputDiscovery,
    pub classifier_validation: ClassifierValidation,
    /// `[class, occurrences]` pairs, most frequent first.
    pub top10_classes: Vec<(String, usize)>,
    pub stage_distribution: BTreeMap<String, usize>,
    pub long_tail_share_percent: f64,
    pub rule_proliferation_indicator: bool,
    pub repeated_signatures_top: Vec<RepeatedSignature>,
    pub patch_drift_top: Vec<PatchDriftFinding>,
    pub artifacts: ArtifactIndex,
}

/// Current UTC time in the format used for `generated_at_utc`.
pub fn generation_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Builds the summary object for `run`.
pub fn build_summary(run: &MiningRun, paths: &OutputPaths, generated_at: &str) -> MiningSummary {
    let aggregates = &run.aggregates;
    let coverage = &aggregates.coverage;
    let keep = run.limits.summary_findings;

    MiningSummary {
        target_root: run.target_root.display().to_string(),
        generated_at_utc: generated_at.to_string(),
        input_fingerprint: run.fingerprint.clone(),
        input_discovery: InputDiscovery {
            bad_spec_files: run.discovered.bad_specs.len(),
            build_logs_examined: run.discovered.build_logs.len(),
            failure_gathering_tsv_files: run.discovered.failure_tables.len(),
            patch_activity_logs: run.patch_activity_logs,
            source_counts: aggregates
                .source_counts
                .iter()
                .map(|(source, count)| (source.as_str().to_string(), *count))
                .collect(),
        },
        classifier_validation: ClassifierValidation {
            total_historical_failures: coverage.total,
            classified_count: coverage.classified_count,
            classified_percent: round2(coverage.classified_percent),
            unknown_count: coverage.unknown_count,
            unknown_percent: round2(coverage.unknown_percent),
            taxonomy_insufficiency_flag: coverage.taxonomy_insufficient,
        },
        top10_classes: aggregates
            .top_classes
            .iter()
            .map(|c| (c.canonical_class.clone(), c.occurrences))
            .collect(),
        stage_distribution: aggregates
            .stage_counts
            .iter()
            .map(|s| (s.stage.as_str().to_string(), s.occurrences))
            .collect(),
        long_tail_share_percent: round2(aggregates.long_tail_share),
        rule_proliferation_indicator: aggregates.rule_proliferation,
        repeated_signatures_top: run.repeated_signatures.iter().take(keep).cloned().collect(),
        patch_drift_top: run.patch_drift.iter().take(keep).cloned().collect(),
        artifacts: ArtifactIndex::from(paths),
    }
}

/// Escapes a value for use inside a markdown table cell.
pub(crate) fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Pattern text as shown in priority tables: pipes escaped, long patterns
/// abridged with an ellipsis.
pub(crate) fn abridge_pattern(pattern: &str) -> String {
    let escaped = pattern.replace('|', "\\|");
    if escaped.chars().count() > PATTERN_DISPLAY_LIMIT {
        let head: String = escaped.chars().take(PATTERN_DISPLAY_LIMIT - 3).collect();
        format!("{head}...")
    } else {
        escaped
    }
}

/// Markdown priority table of `rules`, in declaration order.
pub fn rules_to_markdown(rules: &RuleTable) -> String {
    let mut out = String::new();
    out.push_str("| Priority | Pattern (abridged) | CanonicalClass |\n");
    out.push_str("|---:|---|---|\n");
    for (i, rule) in rules.iter().enumerate() {
        out.push_str(&format!(
            "| {} | `{}` | {} |\n",
            i + 1,
            abridge_pattern(rule.pattern()),
            rule.canonical()
        ));
    }
    out
}

/// Renders the narrative report.
pub fn render_markdown(run: &MiningRun, paths: &OutputPaths, generated_at: &str) -> String {
    let aggregates = &run.aggregates;
    let coverage = &aggregates.coverage;
    let total = aggregates.total;
    let mut out = String::new();

    out.push_str("# Historical Log Mining Report\n\n");

    out.push_str("## 1. HistoricalFailureSummary\n");
    out.push_str(&format!("- Target root: `{}`\n", run.target_root.display()));
    out.push_str(&format!("- Generated at (UTC): `{generated_at}`\n"));
    out.push_str(&format!("- Input fingerprint: `{}`\n", run.fingerprint));
    out.push_str(&format!("- Total historical failure records: **{total}**\n"));
    out.push_str(&format!(
        "- BAD_SPEC artifacts: **{}**\n",
        run.discovered.bad_specs.len()
    ));
    out.push_str(&format!(
        "- Build logs examined (non-attempt): **{}**\n",
        run.discovered.build_logs.len()
    ));
    out.push_str(&format!(
        "- Failure-gathering TSV inputs: **{}**\n",
        run.discovered.failure_tables.len()
    ));
    out.push_str(&format!(
        "- Patch-injection artifacts observed in failing logs: **{}**\n\n",
        run.patch_activity_logs
    ));
    out.push_str("### HistoricalFailureRecord schema\n");
    out.push_str("`{ package, stage, raw_signal, log_excerpt }`\n\n");

    out.push_str("## 2. Failure Signal Extraction Rules (Deterministic)\n\n");
    out.push_str("Ordered extraction patterns, first match wins:\n\n");
    out.push_str(&rules_to_markdown(&run.rules));
    out.push('\n');
    out.push_str("Noise suppression rules:\n");
    out.push_str("- Ignore empty lines.\n");
    out.push_str(&format!("- Ignore `{NOISE_TOKEN}` command lines.\n"));
    out.push_str(
        "- If no deterministic pattern matches, fallback to first explicit `error:` line.\n\n",
    );

    out.push_str("## 3. Canonicalization\n\n");
    out.push_str("| CanonicalClass | Occurrences | RepresentativeExamples |\n");
    out.push_str("|---|---:|---|\n");
    for cluster in aggregates.clusters.iter().take(run.limits.report_clusters) {
        let examples = cluster
            .representative_examples
            .iter()
            .map(|e| escape_cell(e))
            .collect::<Vec<_>>()
            .join(EXAMPLE_CELL_SEPARATOR);
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            cluster.canonical_class, cluster.occurrences, examples
        ));
    }
    out.push('\n');

    out.push_str("## 4. CanonicalFailureDistribution\n\n");
    out.push_str("| FailureCategory | Count | % of Historical Failures |\n");
    out.push_str("|---|---:|---:|\n");
    for count in &aggregates.class_counts {
        out.push_str(&format!(
            "| {} | {} | {:.2}% |\n",
            count.canonical_class, count.occurrences, count.percent
        ));
    }
    out.push('\n');

    out.push_str("## 5. Frequency & Stage Distribution\n\n");
    out.push_str("| PipelineStage | Count | % |\n");
    out.push_str("|---|---:|---:|\n");
    for stage in &aggregates.stage_counts {
        out.push_str(&format!(
            "| {} | {} | {:.2}% |\n",
            stage.stage, stage.occurrences, stage.percent
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "### Top {} recurring canonical classes\n\n",
        run.limits.top_classes
    ));
    out.push_str("| Rank | FailureCategory | Count | % |\n");
    out.push_str("|---:|---|---:|---:|\n");
    for (i, count) in aggregates.top_classes.iter().enumerate() {
        out.push_str(&format!(
            "| {} | {} | {} | {:.2}% |\n",
            i + 1,
            count.canonical_class,
            count.occurrences,
            count.percent
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "### Long-tail classes (<{}% frequency)\n\n",
        run.thresholds.long_tail_percent
    ));
    out.push_str("| FailureCategory | Count | % |\n");
    out.push_str("|---|---:|---:|\n");
    for count in &aggregates.long_tail {
        out.push_str(&format!(
            "| {} | {} | {:.2}% |\n",
            count.canonical_class, count.occurrences, count.percent
        ));
    }
    out.push('\n');

    out.push_str("## 6. StructuralVsIncidentalBreakdown\n\n");
    out.push_str("| FailureCategory | Structural Label | Count |\n");
    out.push_str("|---|---|---:|\n");
    for cluster in &aggregates.clusters {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            cluster.canonical_class, cluster.structural_label, cluster.occurrences
        ));
    }
    out.push('\n');

    out.push_str("## 7. NormalizationCandidateMatrix\n\n");
    out.push_str(
        "| FailureCategory | Deterministic Normalization Opportunity | Proposed Layer | Automation Feasibility | Estimated Impact % |\n",
    );
    out.push_str("|---|---|---|---|---:|\n");
    for candidate in &run.candidates {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {:.2}% |\n",
            candidate.failure_category,
            yes_no(candidate.deterministic_normalization_opportunity),
            candidate.proposed_layer,
            candidate.automation_feasibility,
            candidate.estimated_impact_percent
        ));
    }
    out.push('\n');

    out.push_str("## 8. ClassifierCoverageScore\n\n");
    out.push_str(&format!(
        "- Classified: **{}/{} ({:.2}%)**\n",
        coverage.classified_count, total, coverage.classified_percent
    ));
    out.push_str(&format!(
        "- Unknown: **{}/{} ({:.2}%)**\n",
        coverage.unknown_count, total, coverage.unknown_percent
    ));
    out.push_str(&format!(
        "- Taxonomy insufficiency flag (`Unknown > {}%`): **{}**\n\n",
        run.thresholds.insufficiency_percent, coverage.taxonomy_insufficient
    ));

    out.push_str("## 9. HeuristicDriftFindings\n\n");
    out.push_str(&format!(
        "### Repeated manual-signature candidates (package + canonical class, occurrences >={})\n\n",
        run.thresholds.repeated_min_occurrences
    ));
    out.push_str("| Package | FailureCategory | Occurrences |\n");
    out.push_str("|---|---|---:|\n");
    for item in run.repeated_signatures.iter().take(run.limits.report_findings) {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            escape_cell(&item.package),
            item.canonical_class,
            item.occurrences
        ));
    }
    out.push('\n');
    out.push_str("### Patch activity not ending in PatchApplicationFailure\n\n");
    out.push_str("| Package | FailureCategory | Artifact |\n");
    out.push_str("|---|---|---|\n");
    for item in run.patch_drift.iter().take(run.limits.report_findings) {
        out.push_str(&format!(
            "| {} | {} | `{}` |\n",
            escape_cell(&item.package),
            item.canonical_class,
            escape_cell(&item.artifact_path)
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "- Long-tail share: **{:.2}%**\n",
        aggregates.long_tail_share
    ));
    out.push_str(&format!(
        "- Rule proliferation indicator (long-tail share > {}%): **{}**\n\n",
        run.thresholds.proliferation_percent, aggregates.rule_proliferation
    ));

    out.push_str("## 10. StrategicRecommendations\n\n");
    for (i, line) in recommendations(run).iter().enumerate() {
        out.push_str(&format!("{}. {line}\n", i + 1));
    }
    out.push('\n');

    out.push_str("## 11. Artifact Paths\n");
    out.push_str(&format!("- Records: `{}`\n", paths.records_tsv.display()));
    out.push_str(&format!("- Clusters: `{}`\n", paths.clusters_tsv.display()));
    out.push_str(&format!("- Candidates: `{}`\n", paths.candidates_tsv.display()));
    out.push_str(&format!("- Summary: `{}`\n", paths.summary.display()));
    out.push_str(&format!("- Report: `{}`\n", paths.report_md.display()));

    out
}

/// Recommendations derived from coverage, the candidate matrix and drift.
pub fn recommendations(run: &MiningRun) -> Vec<String> {
    let aggregates = &run.aggregates;
    let coverage = &aggregates.coverage;
    let mut lines = Vec::new();

    if aggregates.total == 0 {
        lines.push(
            "No historical failures were found; re-run once the campaign has produced build artifacts."
                .to_string(),
        );
        return lines;
    }

    if coverage.taxonomy_insufficient {
        lines.push(format!(
            "Extend the rule table before relying on these distributions: `{UNKNOWN_CLASS}` covers {:.2}% of failures (threshold {}%).",
            coverage.unknown_percent, run.thresholds.insufficiency_percent
        ));
    } else {
        lines.push(format!(
            "Keep the current rule table as the classification baseline; it covers {:.2}% of historical failures.",
            coverage.classified_percent
        ));
    }

    let deterministic: Vec<_> = run
        .candidates
        .iter()
        .filter(|c| c.deterministic_normalization_opportunity)
        .filter(|c| c.automation_feasibility == AutomationFeasibility::High)
        .take(3)
        .collect();
    if deterministic.is_empty() {
        lines.push(
            "No high-feasibility deterministic normalization candidates were observed.".to_string(),
        );
    } else {
        let names: Vec<&str> = deterministic
            .iter()
            .map(|c| c.failure_category.as_str())
            .collect();
        let impact: f64 = deterministic.iter().map(|c| c.estimated_impact_percent).sum();
        lines.push(format!(
            "Prioritize deterministic normalization for {} ({impact:.2}% combined impact) before expanding sampling breadth.",
            join_names(&names)
        ));
    }

    let manual: Vec<&str> = run
        .candidates
        .iter()
        .filter(|c| c.automation_feasibility == AutomationFeasibility::Low)
        .filter(|c| c.failure_category != UNKNOWN_CLASS)
        .map(|c| c.failure_category.as_str())
        .take(3)
        .collect();
    if !manual.is_empty() {
        lines.push(format!(
            "Treat {} as lower-automation classes requiring targeted policy, not package-local heuristics.",
            join_names(&manual)
        ));
    }

    if !run.patch_drift.is_empty() {
        lines.push(format!(
            "Review {} build log(s) where patch activity ended in a different class; the patch step may be the real cause.",
            run.patch_drift.len()
        ));
    }

    if aggregates.rule_proliferation {
        lines.push(format!(
            "Consolidate rare classes before adding rules: the long tail holds {:.2}% of failures.",
            aggregates.long_tail_share
        ));
    } else {
        lines.push(
            "Use this distribution as a prior for sampling weights; refresh it after each normalization rule cycle."
                .to_string(),
        );
    }

    lines
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn join_names(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("`{n}`")).collect();
    match quoted.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abridge_pattern_escapes_and_truncates() {
        assert_eq!(abridge_pattern("a|b"), "a\\|b");
        let long = "x".repeat(150);
        let abridged = abridge_pattern(&long);
        assert_eq!(abridged.chars().count(), PATTERN_DISPLAY_LIMIT);
        assert!(abridged.ends_with("..."));
        assert_eq!(abridge_pattern(&"y".repeat(100)), "y".repeat(100));
    }

    #[test]
    fn test_escape_cell() {
        assert_eq!(escape_cell("a|b\nc"), "a\\|b c");
    }

    #[test]
    fn test_rules_table_lists_every_rule_in_order() {
        let rules = RuleTable::builtin();
        let md = rules_to_markdown(&rules);
        let rows: Vec<&str> = md.lines().skip(2).collect();
        assert_eq!(rows.len(), rules.len());
        assert!(rows[0].starts_with("| 1 | "));
        assert!(rows[0].ends_with("| MetadataAdapterRuntimeMissing |"));
        assert!(md.contains("`CMake Error`"));
    }

    #[test]
    fn test_join_names() {
        assert_eq!(join_names(&["A"]), "`A`");
        assert_eq!(join_names(&["A", "B"]), "`A` and `B`");
        assert_eq!(join_names(&["A", "B", "C"]), "`A`, `B`, and `C`");
    }

    #[test]
    fn test_generation_timestamp_is_utc() {
        let stamp = generation_timestamp();
        assert!(stamp.ends_with("+00:00"));
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }
}
