//! Signal extraction for the three artifact families.
//!
//! Each [`Artifact`] variant turns one raw artifact into at most one
//! [`FailureRecord`]. Returning `None` means the artifact carries no failure
//! signal (no `reason=` line, a log that never failed, an empty table
//! signal); it is never an error.

use std::path::Path;
use std::sync::LazyLock;

use failure_taxonomy_core::{
    ClassOutcome, ExecutionMode, FailureRecord, RuleTable, SourceType, Stage, StageFailure,
};
use regex::Regex;
use tracing::{debug, warn};

use crate::discover::{ArtifactSnapshot, LoadedArtifact};

/// Prefix of the single informative line in a bad-spec file.
pub const REASON_PREFIX: &str = "reason=";
/// Separates the generic reason from its discriminating tail.
pub const TAIL_DELIMITER: &str = " tail=";
/// Upper bound, in characters, for bad-spec signals and excerpts.
pub const BAD_SPEC_SIGNAL_LIMIT: usize = 1200;
/// Compiler diagnostic-format flag echoed on command lines; never a signal.
pub const NOISE_TOKEN: &str = "error-format=json";
/// Progress line printed by `patch` for every file it touches.
pub const PATCH_MARKER: &str = "patching file";
/// Module-context marker of production executions.
pub const PRODUCTION_MARKER: &str = "deployment=Production";
/// Joins excerpt lines.
pub const EXCERPT_SEPARATOR: &str = " | ";
/// Lines kept on each side of the anchor line in a log excerpt.
const EXCERPT_WIDTH: usize = 2;

const BAD_SPEC_FALLBACK: (Stage, StageFailure) = (Stage::Build, StageFailure::BuildFailure);
const BUILD_LOG_FALLBACK: (Stage, StageFailure) = (Stage::Build, StageFailure::BuildFailure);
const TABLE_FALLBACK: (Stage, StageFailure) =
    (Stage::Ingestion, StageFailure::InfrastructureGateFailure);

/// Coarse "did this build fail at all" gate, independent of the rule table.
static FAILURE_GATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(DEPGRAPH\|[^|]+\|unresolved\||Failed build dependencies:|No match for argument:|fatal error:|configure: error:|CMake Error|No module named |ImportError:|Bad exit status from|undefined reference to|cannot find -l|can't find file to patch|No file to patch|source download failed after retries|blocked by failed dependencies|signal: 9|exit status: 137)",
    )
    .expect("static regex must compile")
});

/// Generic diagnostic marker used when no rule matches any log line.
static ERROR_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\berror:\b").expect("static regex must compile"));

static RETRY_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.attempt\d+$").expect("static regex must compile"));

/// One row of a per-package failure-gathering table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureTableRow {
    pub package: String,
    pub failure_signal: String,
    pub first_failure_category: String,
    pub module_context: String,
}

/// A raw artifact, tagged by origin.
#[derive(Debug, Clone, Copy)]
pub enum Artifact<'a> {
    BadSpec(&'a LoadedArtifact),
    BuildLog(&'a LoadedArtifact),
    TableRow {
        table: &'a LoadedArtifact,
        row: &'a FailureTableRow,
    },
}

impl Artifact<'_> {
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::BadSpec(_) => SourceType::BadSpec,
            Self::BuildLog(_) => SourceType::BuildLog,
            Self::TableRow { .. } => SourceType::FailureGatheringTable,
        }
    }

    /// Produces the failure record this artifact carries, if any.
    pub fn extract(&self, rules: &RuleTable) -> Option<FailureRecord> {
        match *self {
            Self::BadSpec(artifact) => extract_bad_spec(artifact, rules),
            Self::BuildLog(artifact) => extract_build_log(artifact, rules),
            Self::TableRow { table, row } => extract_table_row(table, row, rules),
        }
    }
}

/// Records extracted from a snapshot, in the canonical order: bad specs,
/// then build logs, then table rows.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<FailureRecord>,
    /// Failing build logs that showed patch-application activity.
    pub patch_activity_logs: usize,
}

/// Runs every extractor over the snapshot.
pub fn extract_all(snapshot: &ArtifactSnapshot, rules: &RuleTable) -> Extraction {
    let mut extraction = Extraction::default();

    for artifact in &snapshot.bad_specs {
        extraction
            .records
            .extend(Artifact::BadSpec(artifact).extract(rules));
    }

    for artifact in &snapshot.build_logs {
        if let Some(record) = Artifact::BuildLog(artifact).extract(rules) {
            if record.has_patch_activity == Some(true) {
                extraction.patch_activity_logs += 1;
            }
            extraction.records.push(record);
        }
    }

    for table in &snapshot.failure_tables {
        let rows = parse_failure_table(&table.text, &table.path);
        for row in &rows {
            extraction
                .records
                .extend(Artifact::TableRow { table, row }.extract(rules));
        }
    }

    extraction
}

fn extract_bad_spec(artifact: &LoadedArtifact, rules: &RuleTable) -> Option<FailureRecord> {
    let reason = artifact
        .text
        .lines()
        .find_map(|line| line.strip_prefix(REASON_PREFIX))
        .map(str::trim)
        .unwrap_or_default();
    if reason.is_empty() {
        debug!(path = %artifact.path.display(), "Bad spec has no reason line");
        return None;
    }

    let signal = match reason.split_once(TAIL_DELIMITER) {
        Some((_, tail)) => tail.trim(),
        None => reason,
    };
    let rule = rules.classify(signal).or_else(|| rules.classify(reason));
    let outcome = ClassOutcome::resolve(rule, BAD_SPEC_FALLBACK);

    Some(FailureRecord {
        source_type: SourceType::BadSpec,
        artifact_path: artifact.path.display().to_string(),
        timestamp: artifact.timestamp.clone(),
        package: file_stem(&artifact.path),
        stage: outcome.stage,
        stage_failure: outcome.stage_failure,
        canonical_class: outcome.canonical_class,
        raw_signal: truncate_chars(signal, BAD_SPEC_SIGNAL_LIMIT),
        log_excerpt: truncate_chars(reason, BAD_SPEC_SIGNAL_LIMIT),
        execution_mode: ExecutionMode::Unknown,
        has_patch_activity: None,
    })
}

fn extract_build_log(artifact: &LoadedArtifact, rules: &RuleTable) -> Option<FailureRecord> {
    let lines: Vec<&str> = artifact.text.lines().collect();
    if !is_failing_log(&lines) {
        debug!(path = %artifact.path.display(), "Build log shows no failure");
        return None;
    }

    let Some((signal, anchor)) = first_signal(&lines, rules) else {
        debug!(path = %artifact.path.display(), "Failing build log has no signal line");
        return None;
    };
    let outcome = ClassOutcome::resolve(rules.classify(signal), BUILD_LOG_FALLBACK);

    Some(FailureRecord {
        source_type: SourceType::BuildLog,
        artifact_path: artifact.path.display().to_string(),
        timestamp: artifact.timestamp.clone(),
        package: package_from_log(&artifact.path),
        stage: outcome.stage,
        stage_failure: outcome.stage_failure,
        canonical_class: outcome.canonical_class,
        raw_signal: signal.to_string(),
        log_excerpt: excerpt(&lines, anchor),
        execution_mode: ExecutionMode::Unknown,
        has_patch_activity: Some(lines.iter().any(|line| line.contains(PATCH_MARKER))),
    })
}

fn extract_table_row(
    table: &LoadedArtifact,
    row: &FailureTableRow,
    rules: &RuleTable,
) -> Option<FailureRecord> {
    let signal = row.failure_signal.trim();
    if signal.is_empty() {
        return None;
    }

    let rule = rules
        .classify(signal)
        .or_else(|| rules.classify(&row.first_failure_category));
    let outcome = ClassOutcome::resolve(rule, TABLE_FALLBACK);
    let execution_mode = if row.module_context.contains(PRODUCTION_MARKER) {
        ExecutionMode::Production
    } else {
        ExecutionMode::Unknown
    };

    Some(FailureRecord {
        source_type: SourceType::FailureGatheringTable,
        artifact_path: table.path.display().to_string(),
        timestamp: table.timestamp.clone(),
        package: row.package.trim().to_string(),
        stage: outcome.stage,
        stage_failure: outcome.stage_failure,
        canonical_class: outcome.canonical_class,
        raw_signal: signal.to_string(),
        log_excerpt: signal.to_string(),
        execution_mode,
        has_patch_activity: None,
    })
}

/// Returns `true` when any line carries a known hard-failure phrase.
pub fn is_failing_log(lines: &[&str]) -> bool {
    lines.iter().any(|line| FAILURE_GATE.is_match(line))
}

/// Finds the trimmed signal line and its index.
///
/// The first non-empty, non-noise line matching a rule wins; otherwise the
/// first line carrying a generic `error:` marker glued to the following word
/// (`error:foo`), so `error: Bad exit status ...` is not a fallback signal.
pub fn first_signal<'a>(lines: &[&'a str], rules: &RuleTable) -> Option<(&'a str, usize)> {
    lines
        .iter()
        .copied()
        .map(str::trim)
        .enumerate()
        .find(|(_, line)| {
            !line.is_empty() && !line.contains(NOISE_TOKEN) && rules.classify(line).is_some()
        })
        .or_else(|| {
            lines
                .iter()
                .copied()
                .map(str::trim)
                .enumerate()
                .find(|(_, line)| ERROR_MARKER.is_match(line))
        })
        .map(|(index, line)| (line, index))
}

/// Joins the non-empty lines within two lines of `anchor`.
pub fn excerpt(lines: &[&str], anchor: usize) -> String {
    let lo = anchor.saturating_sub(EXCERPT_WIDTH);
    let hi = (anchor + EXCERPT_WIDTH + 1).min(lines.len());
    if lo >= hi {
        return String::new();
    }
    lines[lo..hi]
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(EXCERPT_SEPARATOR)
}

/// Package name of a build log: the file name without `.log` and without a
/// trailing `.attemptN` retry suffix.
pub fn package_from_log(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    let name = name.strip_suffix(".log").unwrap_or(&name);
    RETRY_SUFFIX.replace(name, "").into_owned()
}

/// Parses a tab-separated failure table by header name.
///
/// Missing columns read as empty strings. A malformed row ends parsing of
/// that table; rows read before it are kept.
pub fn parse_failure_table(text: &str, path: &Path) -> Vec<FailureTableRow> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read table header");
            return Vec::new();
        }
    };
    let column = |name: &str| headers.iter().position(|header| header == name);
    let package = column("Package");
    let signal = column("FailureSignal");
    let category = column("FirstFailureCategory");
    let context = column("ModuleContext");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Stopped reading malformed table");
                break;
            }
        };
        let field = |index: Option<usize>| {
            index
                .and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string()
        };
        rows.push(FailureTableRow {
            package: field(package),
            failure_signal: field(signal),
            first_failure_category: field(category),
            module_context: field(context),
        });
    }
    rows
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
