//! Artifact discovery and snapshot loading.
//!
//! Discovery is deterministic: each artifact family is listed from its own
//! directory under the target root and sorted by path. The snapshot is read
//! once at run start and never touched again, so a run always analyses an
//! immutable view of the corpus.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::error::{MiningError, Result};

const BAD_SPEC_EXTENSION: &str = "txt";
const BUILD_LOG_EXTENSION: &str = "log";
/// Retry attempts are logged as `<package>.attemptN.log`.
const RETRY_MARKER: &str = ".attempt";
const FAILURE_TABLE_SUFFIX: &str = "_per_package.tsv";

/// Paths of every artifact discovered under one target root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub bad_specs: Vec<PathBuf>,
    /// Final build logs only; retry-attempt logs are excluded.
    pub build_logs: Vec<PathBuf>,
    pub failure_tables: Vec<PathBuf>,
}

impl ArtifactPaths {
    pub fn total(&self) -> usize {
        self.bad_specs.len() + self.build_logs.len() + self.failure_tables.len()
    }
}

/// One artifact read into memory.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub path: PathBuf,
    /// Modification time, RFC 3339 in UTC with microseconds.
    pub timestamp: String,
    /// File contents decoded as UTF-8 with lossy substitution.
    pub text: String,
}

/// Immutable in-memory view of the discovered corpus.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSnapshot {
    pub paths: ArtifactPaths,
    pub bad_specs: Vec<LoadedArtifact>,
    pub build_logs: Vec<LoadedArtifact>,
    pub failure_tables: Vec<LoadedArtifact>,
    /// SHA-256 over every loaded artifact's relative path and bytes.
    pub fingerprint: String,
}

/// Lists artifacts under `target_root` according to `layout`.
///
/// Missing artifact directories are treated as empty.
///
/// # Errors
///
/// Returns [`MiningError::TargetRootInaccessible`] when the root itself does
/// not exist, is not a directory, or cannot be listed.
pub fn discover_artifacts(target_root: &Path, layout: &LayoutConfig) -> Result<ArtifactPaths> {
    ensure_accessible_root(target_root)?;

    let bad_specs = list_sorted(&target_root.join(&layout.bad_spec_dir), |name| {
        has_extension(name, BAD_SPEC_EXTENSION)
    });
    let build_logs = list_sorted(&target_root.join(&layout.build_logs_dir), |name| {
        has_extension(name, BUILD_LOG_EXTENSION) && !name.contains(RETRY_MARKER)
    });
    let failure_tables = list_sorted(&target_root.join(&layout.failure_tables_dir), |name| {
        name.ends_with(FAILURE_TABLE_SUFFIX)
    });

    debug!(
        root = %target_root.display(),
        bad_specs = bad_specs.len(),
        build_logs = build_logs.len(),
        failure_tables = failure_tables.len(),
        "Discovered artifacts"
    );

    Ok(ArtifactPaths {
        bad_specs,
        build_logs,
        failure_tables,
    })
}

/// Discovers and reads every artifact under `target_root`.
///
/// Individual artifacts that disappear or cannot be read between listing and
/// loading are logged and left out of the snapshot; they still count as
/// discovered.
pub fn load_snapshot(target_root: &Path, layout: &LayoutConfig) -> Result<ArtifactSnapshot> {
    let paths = discover_artifacts(target_root, layout)?;
    let mut hasher = Sha256::new();

    let mut load_all = |list: &[PathBuf]| -> Vec<LoadedArtifact> {
        list.iter()
            .filter_map(|path| {
                let artifact = load_artifact(path)?;
                let relative = path.strip_prefix(target_root).unwrap_or(path);
                hasher.update(relative.to_string_lossy().as_bytes());
                hasher.update([0u8]);
                hasher.update((artifact.text.len() as u64).to_le_bytes());
                hasher.update(artifact.text.as_bytes());
                Some(artifact)
            })
            .collect()
    };

    let bad_specs = load_all(&paths.bad_specs);
    let build_logs = load_all(&paths.build_logs);
    let failure_tables = load_all(&paths.failure_tables);

    Ok(ArtifactSnapshot {
        paths,
        bad_specs,
        build_logs,
        failure_tables,
        fingerprint: format!("{:x}", hasher.finalize()),
    })
}

fn ensure_accessible_root(target_root: &Path) -> Result<()> {
    let inaccessible = |reason: String| MiningError::TargetRootInaccessible {
        path: target_root.to_path_buf(),
        reason,
    };

    let metadata = fs::metadata(target_root).map_err(|err| inaccessible(err.to_string()))?;
    if !metadata.is_dir() {
        return Err(inaccessible("not a directory".to_string()));
    }
    fs::read_dir(target_root).map_err(|err| inaccessible(err.to_string()))?;
    Ok(())
}

fn list_sorted(dir: &Path, keep: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Artifact directory absent");
            return Vec::new();
        }
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "Failed to list artifact directory");
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| !ft.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(&keep)
        })
        .collect();
    paths.sort();
    paths
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext == extension)
}

fn load_artifact(path: &Path) -> Option<LoadedArtifact> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read artifact");
            return None;
        }
    };

    Some(LoadedArtifact {
        path: path.to_path_buf(),
        timestamp: modified_timestamp(path),
        text: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Formats a file's modification time; empty when the platform cannot
/// report one.
pub fn modified_timestamp(path: &Path) -> String {
    match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(modified) => {
            DateTime::<Utc>::from(modified).to_rfc3339_opts(SecondsFormat::Micros, false)
        }
        Err(err) => {
            debug!(path = %path.display(), error = %err, "No modification time");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_discovery_excludes_retry_logs_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "reports/build_logs/foo.log", "x");
        touch(root, "reports/build_logs/foo.attempt1.log", "x");
        touch(root, "reports/build_logs/bar.txt", "x");
        touch(root, "BAD_SPEC/b.txt", "reason=x");
        touch(root, "BAD_SPEC/a.txt", "reason=y");
        touch(root, "BAD_SPEC/notes.md", "");
        touch(root, "reports/failure_gathering/run1_per_package.tsv", "");
        touch(root, "reports/failure_gathering/run1_summary.tsv", "");

        let paths = discover_artifacts(root, &LayoutConfig::default()).unwrap();
        assert_eq!(paths.build_logs, vec![root.join("reports/build_logs/foo.log")]);
        assert_eq!(
            paths.bad_specs,
            vec![root.join("BAD_SPEC/a.txt"), root.join("BAD_SPEC/b.txt")]
        );
        assert_eq!(
            paths.failure_tables,
            vec![root.join("reports/failure_gathering/run1_per_package.tsv")]
        );
        assert_eq!(paths.total(), 4);
    }

    #[test]
    fn test_empty_root_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = load_snapshot(dir.path(), &LayoutConfig::default()).unwrap();
        assert_eq!(snapshot.paths.total(), 0);
        assert!(snapshot.bad_specs.is_empty());
        assert_eq!(snapshot.fingerprint.len(), 64);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = discover_artifacts(&missing, &LayoutConfig::default()).unwrap_err();
        assert!(matches!(err, MiningError::TargetRootInaccessible { .. }));
    }

    #[test]
    fn test_file_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("root.txt");
        fs::write(&file, "").unwrap();
        let err = discover_artifacts(&file, &LayoutConfig::default()).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_lossy_decoding_and_stable_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let log = root.join("reports/build_logs/pkg.log");
        fs::create_dir_all(log.parent().unwrap()).unwrap();
        fs::write(&log, b"CMake Error \xff\xfe here\n").unwrap();

        let first = load_snapshot(root, &LayoutConfig::default()).unwrap();
        let second = load_snapshot(root, &LayoutConfig::default()).unwrap();
        assert!(first.build_logs[0].text.contains('\u{FFFD}'));
        assert!(first.build_logs[0].text.starts_with("CMake Error"));
        assert!(!first.build_logs[0].timestamp.is_empty());
        assert_eq!(first.fingerprint, second.fingerprint);

        fs::write(&log, b"CMake Error changed\n").unwrap();
        let third = load_snapshot(root, &LayoutConfig::default()).unwrap();
        assert_ne!(first.fingerprint, third.fingerprint);
    }
}
