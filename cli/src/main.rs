use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use failure_taxonomy_core::{CandidateProfile, RuleTable, StructuralLabel, UNKNOWN_CLASS};
use failure_taxonomy_mining::config::{MiningConfig, load_rule_table};
use failure_taxonomy_mining::mine;
use failure_taxonomy_mining::output::{OutputFormat, SummaryFormat, format_rules, write_outputs};
use failure_taxonomy_mining::report::generation_timestamp;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "failure-mine")]
#[command(about = "Offline mining of historical build-failure artifacts")]
struct Cli {
    /// Log per-artifact decisions to stderr (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Mine a target root and write the taxonomy artifacts.
    Mine(MineArgs),
    /// Print the active rule table in priority order.
    Rules(RulesArgs),
    /// Classify one failure signal against the rule table.
    Classify(ClassifyArgs),
    /// Write the default mining configuration as YAML.
    DefaultConfig(DefaultConfigArgs),
}

#[derive(Debug, Args)]
struct MineArgs {
    /// Campaign directory containing BAD_SPEC/ and reports/.
    #[arg(long)]
    target_root: PathBuf,
    /// Directory receiving the tables, summary and report.
    #[arg(long)]
    out_dir: PathBuf,
    /// Mining configuration YAML.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Rule table YAML (overrides the configuration's rules_file).
    #[arg(long)]
    rules: Option<PathBuf>,
    /// Serialization of the summary object.
    #[arg(long, default_value = "json")]
    summary_format: SummaryFormat,
    /// Fixed RFC 3339 generation timestamp, for reproducible outputs.
    #[arg(long)]
    generated_at: Option<String>,
}

#[derive(Debug, Args)]
struct RulesArgs {
    /// Output format.
    #[arg(long, default_value = "table")]
    format: OutputFormat,
    /// Rule table YAML to list instead of the built-in table.
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ClassifyArgs {
    /// Signal text; read from stdin when omitted.
    #[arg(long)]
    text: Option<String>,
    /// Rule table YAML to classify against instead of the built-in table.
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct DefaultConfigArgs {
    /// Output YAML path.
    #[arg(long)]
    output: PathBuf,
}

/// Classification of one signal as printed by `classify`.
#[derive(Debug, Serialize)]
struct ClassifyOutput {
    canonical_class: String,
    /// 1-based position of the matching rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage_failure: Option<String>,
    structural_label: StructuralLabel,
    #[serde(flatten)]
    profile: CandidateProfile,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Mine(args) => run_mine(args),
        Command::Rules(args) => run_rules(args),
        Command::Classify(args) => run_classify(args),
        Command::DefaultConfig(args) => run_default_config(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_mine(args: MineArgs) -> Result<(), String> {
    let config = match &args.config {
        Some(path) => MiningConfig::load(path)
            .map_err(|err| format!("Failed to load config '{}': {err}", path.display()))?,
        None => MiningConfig::default(),
    };
    let rules = match &args.rules {
        Some(path) => load_rules(path)?,
        None => config
            .rule_table()
            .map_err(|err| format!("Failed to load rule table: {err}"))?,
    };
    let generated_at = match args.generated_at {
        Some(stamp) => {
            chrono::DateTime::parse_from_rfc3339(&stamp)
                .map_err(|err| format!("Invalid --generated-at '{stamp}': {err}"))?;
            stamp
        }
        None => generation_timestamp(),
    };
    debug!(rules = rules.len(), generated_at = %generated_at, "Starting mining run");

    let run = mine(&args.target_root, &rules, &config).map_err(|err| err.to_string())?;
    let paths = write_outputs(
        &run,
        &args.out_dir,
        &generated_at,
        args.summary_format,
    )
    .map_err(|err| format!("Failed to write outputs: {err}"))?;

    let coverage = &run.aggregates.coverage;
    println!(
        "Mined {} failure records from {} artifacts ({:.2}% classified); summary at {}",
        coverage.total,
        run.discovered.total(),
        coverage.classified_percent,
        paths.summary.display()
    );
    if coverage.taxonomy_insufficient {
        eprintln!(
            "warning: {:.2}% of failures are {UNKNOWN_CLASS}; the rule table needs extending",
            coverage.unknown_percent
        );
    }
    Ok(())
}

fn run_rules(args: RulesArgs) -> Result<(), String> {
    let rules = match &args.rules {
        Some(path) => load_rules(path)?,
        None => RuleTable::builtin(),
    };
    let rendered = format_rules(&rules, args.format)?;
    print!("{rendered}");
    if !rendered.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn run_classify(args: ClassifyArgs) -> Result<(), String> {
    let text = match args.text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|err| format!("Failed to read stdin: {err}"))?;
            buf
        }
    };
    let rules = match &args.rules {
        Some(path) => load_rules(path)?,
        None => RuleTable::builtin(),
    };

    let output = classify_signal(&rules, text.trim());
    let json = serde_json::to_string_pretty(&output)
        .map_err(|err| format!("JSON serialization failed: {err}"))?;
    println!("{json}");
    Ok(())
}

fn run_default_config(args: DefaultConfigArgs) -> Result<(), String> {
    MiningConfig::default()
        .save(&args.output)
        .map_err(|err| format!("Failed to write '{}': {err}", args.output.display()))?;
    println!("Wrote default configuration to {}", args.output.display());
    Ok(())
}

fn load_rules(path: &Path) -> Result<RuleTable, String> {
    load_rule_table(path)
        .map_err(|err| format!("Failed to load rules '{}': {err}", path.display()))
}

fn classify_signal(rules: &RuleTable, text: &str) -> ClassifyOutput {
    match rules.classify_indexed(text) {
        Some((index, rule)) => ClassifyOutput {
            canonical_class: rule.canonical().to_string(),
            priority: Some(index + 1),
            stage: Some(rule.stage().to_string()),
            stage_failure: Some(rule.stage_failure().to_string()),
            structural_label: rule.structural_label(),
            profile: rule.candidate_profile(),
        },
        None => ClassifyOutput {
            canonical_class: UNKNOWN_CLASS.to_string(),
            priority: None,
            stage: None,
            stage_failure: None,
            structural_label: rules.structural_label_for(UNKNOWN_CLASS),
            profile: CandidateProfile::UNKNOWN,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::classify_signal;
    use failure_taxonomy_core::RuleTable;

    #[test]
    fn test_classify_signal_reports_priority() {
        let rules = RuleTable::builtin();
        let output = classify_signal(&rules, "ld: cannot find -lssl");
        assert_eq!(output.canonical_class, "MissingLinkTimeDependency");
        assert_eq!(output.priority, Some(8));
        assert_eq!(output.stage.as_deref(), Some("Build"));

        // Earlier rules win over later ones for the reported priority.
        let output = classify_signal(&rules, "configure: error: No module named 'six'");
        assert_eq!(output.canonical_class, "PythonImportOrABIError");
        assert_eq!(output.priority, Some(6));
    }

    #[test]
    fn test_classify_signal_unknown() {
        let output = classify_signal(&RuleTable::builtin(), "everything is fine");
        assert_eq!(output.canonical_class, "Unknown");
        assert!(output.priority.is_none());
        assert!(!output.profile.deterministic_opportunity);
    }
}
