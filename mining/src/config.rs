//! Mining run configuration.
//!
//! Defines the YAML-serializable configuration controlling where artifacts
//! live under a target root, the thresholds behind the summary flags, and how
//! many findings each output keeps. Every field has a default, so an empty
//! document is a valid configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! layout:
//!   bad_spec_dir: BAD_SPEC
//!   build_logs_dir: reports/build_logs
//!   failure_tables_dir: reports/failure_gathering
//! thresholds:
//!   long_tail_percent: 3.0
//!   proliferation_percent: 40.0
//!   insufficiency_percent: 20.0
//!   repeated_min_occurrences: 2
//! limits:
//!   top_classes: 10
//!   summary_findings: 20
//!   report_findings: 25
//!   report_clusters: 10
//! rules_file: custom-rules.yaml
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use failure_taxonomy_core::{RuleDefinition, RuleTable};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Artifact directories, relative to the target root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub bad_spec_dir: PathBuf,
    pub build_logs_dir: PathBuf,
    pub failure_tables_dir: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            bad_spec_dir: PathBuf::from("BAD_SPEC"),
            build_logs_dir: PathBuf::from("reports/build_logs"),
            failure_tables_dir: PathBuf::from("reports/failure_gathering"),
        }
    }
}

/// Percentages and counts behind the summary flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Classes whose share is below this percentage are long-tail.
    pub long_tail_percent: f64,
    /// Combined long-tail share above which rule proliferation is flagged.
    pub proliferation_percent: f64,
    /// Unknown share above which the taxonomy is flagged insufficient.
    pub insufficiency_percent: f64,
    /// Minimum occurrences for a (package, class) pair to be reported.
    pub repeated_min_occurrences: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            long_tail_percent: 3.0,
            proliferation_percent: 40.0,
            insufficiency_percent: 20.0,
            repeated_min_occurrences: 2,
        }
    }
}

/// How many entries each output keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    pub top_classes: usize,
    /// Drift findings kept in the summary object.
    pub summary_findings: usize,
    /// Drift findings kept in the narrative report.
    pub report_findings: usize,
    /// Clusters shown in the narrative canonicalization table.
    pub report_clusters: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            top_classes: 10,
            summary_findings: 20,
            report_findings: 25,
            report_clusters: 10,
        }
    }
}

/// Top-level mining configuration.
///
/// # Examples
///
/// ```
/// use failure_taxonomy_mining::config::MiningConfig;
///
/// let yaml = "thresholds:\n  long_tail_percent: 5.0\n";
/// let config: MiningConfig = serde_yaml::from_str(yaml).unwrap();
/// assert_eq!(config.thresholds.long_tail_percent, 5.0);
/// assert_eq!(config.thresholds.proliferation_percent, 40.0);
/// assert_eq!(config.limits.top_classes, 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub layout: LayoutConfig,
    pub thresholds: ThresholdConfig,
    pub limits: LimitConfig,
    /// YAML list of rule definitions replacing the built-in table. A
    /// relative path is resolved against the directory of the config file
    /// it was loaded from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
}

impl MiningConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::MiningError::Io) if the file cannot be read, or
    /// [`Yaml`](crate::MiningError::Yaml) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut config: Self = serde_yaml::from_reader(reader)?;
        if let Some(rules_file) = config.rules_file.take() {
            config.rules_file = Some(match path.parent() {
                Some(base) if rules_file.is_relative() => base.join(rules_file),
                _ => rules_file,
            });
        }
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Builds the rule table this configuration selects: the rules file when
    /// one is configured, the built-in table otherwise.
    pub fn rule_table(&self) -> Result<RuleTable> {
        match &self.rules_file {
            Some(path) => load_rule_table(path),
            None => Ok(RuleTable::builtin()),
        }
    }
}

/// Loads and validates a YAML rule table, keeping declaration order.
pub fn load_rule_table(path: impl AsRef<Path>) -> Result<RuleTable> {
    let file = std::fs::File::open(path)?;
    let definitions: Vec<RuleDefinition> = serde_yaml::from_reader(BufReader::new(file))?;
    Ok(RuleTable::from_definitions(definitions)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MiningError;

    fn sample_yaml() -> &'static str {
        r#"
layout:
  bad_spec_dir: specs/bad
  build_logs_dir: logs
  failure_tables_dir: tables
thresholds:
  long_tail_percent: 2.5
  proliferation_percent: 50.0
  insufficiency_percent: 10.0
  repeated_min_occurrences: 3
limits:
  top_classes: 5
  summary_findings: 7
  report_findings: 9
  report_clusters: 4
"#
    }

    #[test]
    fn test_deserialize_complete() {
        let config: MiningConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.layout.bad_spec_dir, PathBuf::from("specs/bad"));
        assert_eq!(config.layout.build_logs_dir, PathBuf::from("logs"));
        assert_eq!(config.thresholds.long_tail_percent, 2.5);
        assert_eq!(config.thresholds.repeated_min_occurrences, 3);
        assert_eq!(config.limits.top_classes, 5);
        assert_eq!(config.limits.report_clusters, 4);
        assert!(config.rules_file.is_none());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: MiningConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, MiningConfig::default());
        assert_eq!(
            config.layout.failure_tables_dir,
            PathBuf::from("reports/failure_gathering")
        );
        assert_eq!(config.thresholds.insufficiency_percent, 20.0);
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mining.yaml");

        let original: MiningConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        original.save(&path).unwrap();

        let loaded = MiningConfig::load(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_rules_file_replaces_builtin_table() {
        let dir = tempfile::tempdir().unwrap();
        let rules_path = dir.path().join("rules.yaml");
        std::fs::write(
            &rules_path,
            r#"
- canonical: DiskFull
  stage: Build
  stage_failure: BuildFailure
  pattern: "No space left on device"
  structural_label: Toolchain Drift
  normalization_layer: GovernanceException
  automation_feasibility: Low
  deterministic_opportunity: false
"#,
        )
        .unwrap();

        let config = MiningConfig {
            rules_file: Some(rules_path),
            ..MiningConfig::default()
        };
        let table = config.rule_table().unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.classify("cp: No space left on device").is_some());
        assert!(table.classify("CMake Error").is_none());
    }

    #[test]
    fn test_relative_rules_file_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("conf");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            nested.join("rules.yaml"),
            r#"
- canonical: DiskFull
  stage: Build
  stage_failure: BuildFailure
  pattern: "No space left on device"
  structural_label: Toolchain Drift
  normalization_layer: GovernanceException
  automation_feasibility: Low
  deterministic_opportunity: false
"#,
        )
        .unwrap();
        let config_path = nested.join("mining.yaml");
        std::fs::write(&config_path, "rules_file: rules.yaml\n").unwrap();

        let config = MiningConfig::load(&config_path).unwrap();
        assert_eq!(config.rules_file, Some(nested.join("rules.yaml")));
        let table = config.rule_table().unwrap();
        assert_eq!(table.rules()[0].canonical(), "DiskFull");
    }

    #[test]
    fn test_invalid_rules_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let rules_path = dir.path().join("rules.yaml");
        std::fs::write(
            &rules_path,
            r#"
- canonical: Unknown
  stage: Build
  stage_failure: BuildFailure
  pattern: "boom"
  structural_label: Toolchain Drift
  normalization_layer: GovernanceException
  automation_feasibility: Low
  deterministic_opportunity: false
"#,
        )
        .unwrap();

        let err = load_rule_table(&rules_path).unwrap_err();
        assert!(matches!(err, MiningError::Rules(_)));
    }
}
