use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

const BIN: &str = env!("CARGO_BIN_EXE_failure-mine");
const GENERATED_AT: &str = "2025-01-01T00:00:00+00:00";

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("relative path has a parent"))
        .expect("failed to create artifact dir");
    fs::write(path, contents).expect("failed to write artifact");
}

/// Small campaign: one failing log, its retry, a bad spec and a table.
fn write_campaign(root: &Path) {
    write(
        root,
        "reports/build_logs/zlib.log",
        "patching file configure\n./configure\nconfigure: error: C compiler cannot create executables\n",
    );
    write(
        root,
        "reports/build_logs/zlib.attempt2.log",
        "CMake Error at CMakeLists.txt:1\n",
    );
    write(
        root,
        "BAD_SPEC/rpkg.txt",
        "reason=restore failed tail=unresolved R deps after restore: Rcpp\n",
    );
    write(
        root,
        "reports/failure_gathering/wave1_per_package.tsv",
        "Package\tFailureSignal\tFirstFailureCategory\tModuleContext\n\
         openssl\tcannot find -lcrypto\tbuild\t\n\
         empty\t\tbuild\t\n",
    );
}

fn mine(root: &Path, out: &Path, extra: &[&str]) -> std::process::Output {
    Command::new(BIN)
        .arg("mine")
        .arg("--target-root")
        .arg(root)
        .arg("--out-dir")
        .arg(out)
        .args(["--generated-at", GENERATED_AT])
        .args(extra)
        .output()
        .expect("failed to run failure-mine")
}

#[test]
fn test_mine_writes_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("campaign");
    let out = dir.path().join("out");
    write_campaign(&root);

    let output = mine(&root, &out, &[]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Mined 3 failure records from 3 artifacts"));

    for name in [
        "historical_failure_records.tsv",
        "historical_failure_clusters.tsv",
        "historical_normalization_candidates.tsv",
        "historical_log_mining_summary.json",
        "historical_log_mining_report.md",
    ] {
        assert!(out.join(name).is_file(), "missing {name}");
    }

    let summary: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(out.join("historical_log_mining_summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["generated_at_utc"], GENERATED_AT);
    assert_eq!(summary["classifier_validation"]["unknown_count"], 0);
    assert_eq!(summary["input_discovery"]["build_logs_examined"], 1);
    assert_eq!(summary["patch_drift_top"][0]["package"], "zlib");
    assert_eq!(
        summary["patch_drift_top"][0]["canonical_class"],
        "AutotoolsConfigureFailure"
    );

    let records = fs::read_to_string(out.join("historical_failure_records.tsv")).unwrap();
    assert!(records.contains("RDependencyRestoreFailure"));
    assert!(records.contains("MissingLinkTimeDependency"));
    assert!(!records.contains("\nempty\t"));
}

#[test]
fn test_mine_is_reproducible_with_fixed_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("campaign");
    let out = dir.path().join("out");
    write_campaign(&root);

    assert!(mine(&root, &out, &[]).status.success());
    let first = fs::read(out.join("historical_log_mining_report.md")).unwrap();
    let first_summary = fs::read(out.join("historical_log_mining_summary.json")).unwrap();

    assert!(mine(&root, &out, &[]).status.success());
    assert_eq!(first, fs::read(out.join("historical_log_mining_report.md")).unwrap());
    assert_eq!(
        first_summary,
        fs::read(out.join("historical_log_mining_summary.json")).unwrap()
    );
}

#[test]
fn test_mine_empty_root_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("campaign");
    let out = dir.path().join("out");
    fs::create_dir_all(&root).unwrap();

    let output = mine(&root, &out, &["--summary-format", "yaml"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Mined 0 failure records"));
    assert!(out.join("historical_log_mining_summary.yaml").is_file());
}

#[test]
fn test_mine_missing_root_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = mine(&dir.path().join("absent"), &dir.path().join("out"), &[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: cannot access target root"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_mine_rejects_bad_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(BIN)
        .arg("mine")
        .arg("--target-root")
        .arg(dir.path())
        .arg("--out-dir")
        .arg(dir.path().join("out"))
        .args(["--generated-at", "yesterday"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid --generated-at"));
}

#[test]
fn test_mine_with_custom_rules() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("campaign");
    let out = dir.path().join("out");
    write_campaign(&root);
    let rules = dir.path().join("rules.yaml");
    fs::write(
        &rules,
        r#"
- canonical: CompilerMissing
  stage: Build
  stage_failure: BuildFailure
  pattern: "C compiler cannot create executables"
  structural_label: Toolchain Drift
  normalization_layer: SourceNormalizer
  automation_feasibility: Medium
  deterministic_opportunity: true
"#,
    )
    .unwrap();

    let output = mine(&root, &out, &["--rules", rules.to_str().unwrap()]);
    assert!(output.status.success());
    let records = fs::read_to_string(out.join("historical_failure_records.tsv")).unwrap();
    assert!(records.contains("CompilerMissing"));
    assert!(records.contains("Unknown"));
}

#[test]
fn test_rules_lists_builtin_table() {
    let output = Command::new(BIN)
        .args(["rules", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let rules: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let list = rules.as_array().unwrap();
    assert_eq!(list.len(), 15);
    assert_eq!(list[0]["canonical"], "MetadataAdapterRuntimeMissing");

    let table = Command::new(BIN).arg("rules").output().unwrap();
    assert!(table.status.success());
    assert_eq!(String::from_utf8_lossy(&table.stdout).lines().count(), 15);
}

#[test]
fn test_rules_accepts_every_listing_format() {
    let markdown = Command::new(BIN)
        .args(["rules", "--format", "markdown"])
        .output()
        .unwrap();
    assert!(markdown.status.success());
    assert!(String::from_utf8_lossy(&markdown.stdout).starts_with("| Priority |"));

    let yaml = Command::new(BIN)
        .args(["rules", "--format", "yaml"])
        .output()
        .unwrap();
    assert!(yaml.status.success());
    assert!(
        String::from_utf8_lossy(&yaml.stdout).contains("canonical: MetadataAdapterRuntimeMissing")
    );

    let bogus = Command::new(BIN)
        .args(["rules", "--format", "xml"])
        .output()
        .unwrap();
    assert!(!bogus.status.success());
}

#[test]
fn test_classify_text_argument() {
    let output = Command::new(BIN)
        .args(["classify", "--text", "fatal error: zlib.h: No such file or directory"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["canonical_class"], "MissingHeaderOrIncludePath");
    assert_eq!(result["stage"], "Build");
    assert_eq!(result["stage_failure"], "BuildFailure");
    assert_eq!(result["deterministic_opportunity"], true);
}

#[test]
fn test_classify_reads_stdin() {
    let mut child = Command::new(BIN)
        .arg("classify")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"the weather is nice\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["canonical_class"], "Unknown");
    assert_eq!(result["normalization_layer"], "GovernanceException");
    assert!(result.get("priority").is_none());
}

#[test]
fn test_default_config_roundtrips_through_mine() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("mining.yaml");
    let status = Command::new(BIN)
        .arg("default-config")
        .arg("--output")
        .arg(&config)
        .status()
        .unwrap();
    assert!(status.success());
    let yaml = fs::read_to_string(&config).unwrap();
    assert!(yaml.contains("long_tail_percent: 3.0"));

    let root = dir.path().join("campaign");
    write_campaign(&root);
    let output = mine(
        &root,
        &dir.path().join("out"),
        &["--config", config.to_str().unwrap()],
    );
    assert!(output.status.success());
}
