//! Offline mining of historical build-failure artifacts.
//!
//! This crate turns a snapshot of failed recipe specs, build console logs and
//! per-package failure tables into a reproducible failure taxonomy: one
//! [`FailureRecord`] per failure, clusters by canonical class, coverage and
//! long-tail statistics, drift findings, and the emitted reports.
//!
//! The pipeline is a single linear pass:
//!
//! 1. [`discover::load_snapshot`] lists and reads every artifact once.
//! 2. [`extract::extract_all`] turns artifacts into records, classifying
//!    with the supplied [`RuleTable`].
//! 3. [`aggregate::aggregate`] and the [`drift`] detectors derive the
//!    analyses.
//! 4. [`output::write_outputs`] renders the tables, the summary and the
//!    narrative report.
//!
//! # Example
//!
//! ```
//! use failure_taxonomy_core::RuleTable;
//! use failure_taxonomy_mining::config::MiningConfig;
//! use failure_taxonomy_mining::mine;
//!
//! let root = tempfile::tempdir().unwrap();
//! let logs = root.path().join("reports/build_logs");
//! std::fs::create_dir_all(&logs).unwrap();
//! std::fs::write(
//!     logs.join("zlib.log"),
//!     "compiling\nsrc/a.c:1:10: fatal error: zlib.h: No such file or directory\n",
//! )
//! .unwrap();
//!
//! let run = mine(root.path(), &RuleTable::builtin(), &MiningConfig::default()).unwrap();
//! assert_eq!(run.records.len(), 1);
//! assert_eq!(run.records[0].canonical_class, "MissingHeaderOrIncludePath");
//! assert_eq!(run.aggregates.coverage.classified_count, 1);
//! ```
//!
//! [`FailureRecord`]: failure_taxonomy_core::FailureRecord

pub mod aggregate;
pub mod config;
pub mod discover;
pub mod drift;
pub mod error;
pub mod extract;
pub mod output;
pub mod report;

use std::path::{Path, PathBuf};

use failure_taxonomy_core::{FailureRecord, RuleTable};
use tracing::info;

pub use error::{MiningError, Result};

use crate::aggregate::Aggregates;
use crate::config::{LimitConfig, MiningConfig, ThresholdConfig};
use crate::discover::{ArtifactPaths, ArtifactSnapshot, load_snapshot};
use crate::drift::{NormalizationCandidate, PatchDriftFinding, RepeatedSignature};

/// Everything one mining pass derived from its snapshot.
#[derive(Debug, Clone)]
pub struct MiningRun {
    pub target_root: PathBuf,
    pub discovered: ArtifactPaths,
    pub fingerprint: String,
    pub records: Vec<FailureRecord>,
    /// Failing build logs that showed patch-application activity.
    pub patch_activity_logs: usize,
    pub aggregates: Aggregates,
    pub repeated_signatures: Vec<RepeatedSignature>,
    pub patch_drift: Vec<PatchDriftFinding>,
    pub candidates: Vec<NormalizationCandidate>,
    /// Table the records were classified with.
    pub rules: RuleTable,
    pub thresholds: ThresholdConfig,
    pub limits: LimitConfig,
}

/// Snapshots `target_root` and runs the full analysis over it.
///
/// # Errors
///
/// Fails only when the target root itself cannot be accessed. Zero
/// discovered artifacts produce an empty run.
pub fn mine(target_root: &Path, rules: &RuleTable, config: &MiningConfig) -> Result<MiningRun> {
    let snapshot = load_snapshot(target_root, &config.layout)?;
    Ok(analyze(target_root, snapshot, rules, config))
}

/// Runs the analysis over an already loaded snapshot.
pub fn analyze(
    target_root: &Path,
    snapshot: ArtifactSnapshot,
    rules: &RuleTable,
    config: &MiningConfig,
) -> MiningRun {
    let extraction = extract::extract_all(&snapshot, rules);
    let records = extraction.records;

    let aggregates = aggregate::aggregate(
        &records,
        rules,
        &config.thresholds,
        config.limits.top_classes,
    );
    let repeated_signatures =
        drift::repeated_signatures(&records, config.thresholds.repeated_min_occurrences);
    let patch_drift = drift::patch_drift(&records);
    let candidates = drift::normalization_candidates(&aggregates.class_counts, rules);

    info!(
        root = %target_root.display(),
        artifacts = snapshot.paths.total(),
        records = records.len(),
        unknown = aggregates.coverage.unknown_count,
        classes = aggregates.class_counts.len(),
        "Mined failure records"
    );

    MiningRun {
        target_root: target_root.to_path_buf(),
        discovered: snapshot.paths,
        fingerprint: snapshot.fingerprint,
        records,
        patch_activity_logs: extraction.patch_activity_logs,
        aggregates,
        repeated_signatures,
        patch_drift,
        candidates,
        rules: rules.clone(),
        thresholds: config.thresholds.clone(),
        limits: config.limits.clone(),
    }
}
