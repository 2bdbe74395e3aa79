//! Output formatting and artifact emission.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use failure_taxonomy_core::RuleTable;
use tracing::info;

use crate::MiningRun;
use crate::error::Result;
use crate::report::{build_summary, render_markdown, rules_to_markdown};

pub const RECORDS_FILE: &str = "historical_failure_records.tsv";
pub const CLUSTERS_FILE: &str = "historical_failure_clusters.tsv";
pub const CANDIDATES_FILE: &str = "historical_normalization_candidates.tsv";
pub const SUMMARY_STEM: &str = "historical_log_mining_summary";
pub const REPORT_FILE: &str = "historical_log_mining_report.md";

/// Separator between representative examples in the cluster table.
pub const EXAMPLE_SEPARATOR: &str = " || ";

const RECORD_COLUMNS: [&str; 10] = [
    "package",
    "stage",
    "stage_failure",
    "canonical_class",
    "source_type",
    "timestamp",
    "execution_mode",
    "raw_signal",
    "log_excerpt",
    "artifact_path",
];

const CLUSTER_COLUMNS: [&str; 4] = [
    "canonical_class",
    "occurrences",
    "structural_label",
    "representative_examples",
];

const CANDIDATE_COLUMNS: [&str; 5] = [
    "failure_category",
    "proposed_layer",
    "automation_feasibility",
    "deterministic_normalization_opportunity",
    "estimated_impact_percent",
];

/// Supported formats for listing the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Json,
    Yaml,
    Markdown,
    Table,
}

/// Serialization of the summary object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SummaryFormat {
    #[default]
    Json,
    Yaml,
}

impl SummaryFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

/// Where each artifact of a run is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub records_tsv: PathBuf,
    pub clusters_tsv: PathBuf,
    pub candidates_tsv: PathBuf,
    pub summary: PathBuf,
    pub report_md: PathBuf,
}

impl OutputPaths {
    pub fn in_dir(out_dir: &Path, format: SummaryFormat) -> Self {
        Self {
            records_tsv: out_dir.join(RECORDS_FILE),
            clusters_tsv: out_dir.join(CLUSTERS_FILE),
            candidates_tsv: out_dir.join(CANDIDATES_FILE),
            summary: out_dir.join(format!("{SUMMARY_STEM}.{}", format.extension())),
            report_md: out_dir.join(REPORT_FILE),
        }
    }
}

/// Formats the rule table in the requested output format.
///
/// JSON and YAML list the rule definitions, so the YAML output can be
/// edited and loaded back as a rules file.
pub fn format_rules(
    rules: &RuleTable,
    format: OutputFormat,
) -> std::result::Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&rules.definitions())
            .map_err(|e| format!("JSON serialization failed: {e}")),
        OutputFormat::Yaml => serde_yaml::to_string(&rules.definitions())
            .map_err(|e| format!("YAML serialization failed: {e}")),
        OutputFormat::Markdown => Ok(rules_to_markdown(rules)),
        OutputFormat::Table => Ok(rules_to_table(rules)),
    }
}

fn rules_to_table(rules: &RuleTable) -> String {
    let mut out = String::new();
    for (i, rule) in rules.iter().enumerate() {
        out.push_str(&format!(
            "{:>3} {:<30} {:<24} {:<26} {}\n",
            i + 1,
            rule.canonical(),
            rule.stage().as_str(),
            rule.stage_failure().as_str(),
            rule.pattern()
        ));
    }
    out
}

/// Writes every artifact of `run` into `out_dir`, creating it if needed.
///
/// `generated_at` is the only value embedded in the outputs that is not
/// derived from the run itself.
pub fn write_outputs(
    run: &MiningRun,
    out_dir: &Path,
    generated_at: &str,
    format: SummaryFormat,
) -> Result<OutputPaths> {
    fs::create_dir_all(out_dir)?;
    let paths = OutputPaths::in_dir(out_dir, format);

    write_records(run, &paths.records_tsv)?;
    write_clusters(run, &paths.clusters_tsv)?;
    write_candidates(run, &paths.candidates_tsv)?;

    let summary = build_summary(run, &paths, generated_at);
    let mut writer = BufWriter::new(fs::File::create(&paths.summary)?);
    match format {
        SummaryFormat::Json => serde_json::to_writer_pretty(&mut writer, &summary)?,
        SummaryFormat::Yaml => serde_yaml::to_writer(&mut writer, &summary)?,
    }
    writer.flush()?;

    fs::write(&paths.report_md, render_markdown(run, &paths, generated_at))?;

    info!(
        out_dir = %out_dir.display(),
        records = run.records.len(),
        clusters = run.aggregates.clusters.len(),
        "Wrote mining outputs"
    );
    Ok(paths)
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

fn write_records(run: &MiningRun, path: &Path) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(RECORD_COLUMNS)?;
    for record in &run.records {
        writer.write_record([
            record.package.as_str(),
            record.stage.as_str(),
            record.stage_failure.as_str(),
            record.canonical_class.as_str(),
            record.source_type.as_str(),
            record.timestamp.as_str(),
            record.execution_mode.as_str(),
            record.raw_signal.as_str(),
            record.log_excerpt.as_str(),
            record.artifact_path.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_clusters(run: &MiningRun, path: &Path) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(CLUSTER_COLUMNS)?;
    for cluster in &run.aggregates.clusters {
        writer.write_record([
            cluster.canonical_class.clone(),
            cluster.occurrences.to_string(),
            cluster.structural_label.to_string(),
            cluster.representative_examples.join(EXAMPLE_SEPARATOR),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_candidates(run: &MiningRun, path: &Path) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(CANDIDATE_COLUMNS)?;
    for candidate in &run.candidates {
        let deterministic = if candidate.deterministic_normalization_opportunity {
            "yes"
        } else {
            "no"
        };
        writer.write_record([
            candidate.failure_category.clone(),
            candidate.proposed_layer.to_string(),
            candidate.automation_feasibility.to_string(),
            deterministic.to_string(),
            format!("{:.2}", candidate.estimated_impact_percent),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
