//! Hybrid IDS command line.
//!
//! Usage:
//!   hybrid-ids analyze --input flows.csv --model model.json [--threshold 0.7] [--top-n 3]
//!   hybrid-ids rules [--rules extra.yaml]
//!   hybrid-ids feedback --flow-id 12 --label "False Positive"

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};

use hybrid_ids::feedback::{FeedbackEntry, FeedbackLabel, FeedbackLog};
use hybrid_ids::ingest::{load_flows, IngestOptions};
use hybrid_ids::oracle::{evaluate_predictions, LinearModel};
use hybrid_ids::{DetectionPipeline, RuleEngine};
use ids_core::{bootstrap, DetectionConfig};

#[derive(Parser)]
#[command(name = "hybrid-ids")]
#[command(about = "Hybrid ML + signature intrusion detection over flow records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a CSV of flows and emit one JSON line per flow
    Analyze {
        #[arg(short, long)]
        input: PathBuf,
        /// Logistic model artifact (JSON)
        #[arg(short, long)]
        model: PathBuf,
        #[arg(short, long)]
        threshold: Option<f64>,
        #[arg(long)]
        top_n: Option<usize>,
        /// Extra signature rules (YAML), appended after the built-ins
        #[arg(short, long)]
        rules: Option<PathBuf>,
        /// Write JSON lines here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        parallel: bool,
        /// Require labels and report detection quality
        #[arg(long)]
        evaluate: bool,
    },
    /// List active signature rules in priority order
    Rules {
        #[arg(short, long)]
        rules: Option<PathBuf>,
        /// One JSON object per rule instead of text lines
        #[arg(long)]
        json: bool,
    },
    /// Record analyst feedback for an alerted flow
    ///
    /// The flow id is taken as given and recorded with Hybrid_Alert=1; it is
    /// not checked against an analysis run, so only pass ids that `analyze`
    /// reported as ATTACK.
    Feedback {
        /// Flow id of an ATTACK row from `analyze` output
        #[arg(long)]
        flow_id: u64,
        /// "True Alert" or "False Positive"
        #[arg(short, long)]
        label: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = bootstrap("hybrid-ids")?;

    match cli.command {
        Commands::Analyze { input, model, threshold, top_n, rules, output, parallel, evaluate } => {
            if let Some(t) = threshold { cfg.ml_threshold = t; }
            if let Some(n) = top_n { cfg.top_n = n; }
            if let Some(r) = rules { cfg.rules_file = Some(r.display().to_string()); }
            cfg.parallel |= parallel;
            cfg.validate()?;
            analyze(&cfg, input, model, output, evaluate)
        }
        Commands::Rules { rules, json } => {
            let engine = match rules {
                Some(path) => RuleEngine::load_file(&path).with_context(|| format!("loading rules from {}", path.display()))?,
                None => match &cfg.rules_file {
                    Some(path) => RuleEngine::load_file(path).with_context(|| format!("loading rules from {path}"))?,
                    None => RuleEngine::default(),
                },
            };
            let mut out = io::stdout().lock();
            for rule in engine.rules() {
                if json { writeln!(out, "{}", serde_json::to_string(rule)?)?; } else { writeln!(out, "{rule}")?; }
            }
            Ok(())
        }
        Commands::Feedback { flow_id, label, file } => {
            let feedback: FeedbackLabel = label.parse()?;
            let log = FeedbackLog::new(file.unwrap_or_else(|| PathBuf::from(&cfg.feedback_file)));
            log.append(&[FeedbackEntry { flow_id, hybrid_alert: 1, feedback }])?;
            Ok(())
        }
    }
}

fn analyze(cfg: &DetectionConfig, input: PathBuf, model_path: PathBuf, output: Option<PathBuf>, evaluate: bool) -> Result<()> {
    let dataset = load_flows(&input, IngestOptions { require_label: evaluate })
        .with_context(|| format!("reading flows from {}", input.display()))?;
    if dataset.report.rows_dropped > 0 {
        warn!(dropped = dataset.report.rows_dropped, "rows with missing or non-finite values skipped");
    }
    let model = LinearModel::load(&model_path).with_context(|| format!("loading model {}", model_path.display()))?;
    let pipeline = DetectionPipeline::from_config(cfg)?;
    let report = pipeline.run(&dataset.records, &model)?;

    let mut sink: Box<dyn Write> = match &output {
        Some(p) => Box::new(BufWriter::new(File::create(p).with_context(|| format!("creating {}", p.display()))?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    for row in &report.rows { writeln!(sink, "{}", serde_json::to_string(row)?)?; }
    sink.flush()?;

    info!(summary = ?report.summary, top_features = ?report.ranking.names(), "analysis_complete");
    if evaluate {
        let ml = evaluate_predictions(&dataset.records, report.rows.iter().map(|r| r.ml_probability > pipeline.threshold()));
        let hybrid = evaluate_predictions(&dataset.records, report.rows.iter().map(|r| r.verdict.is_attack()));
        info!(?ml, ?hybrid, "detection_quality");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn feedback_help_states_alert_only_contract() {
        let mut cmd = Cli::command();
        let feedback = cmd.find_subcommand_mut("feedback").unwrap();
        let help = feedback.render_long_help().to_string();
        assert!(help.contains("Hybrid_Alert=1"));
        assert!(help.contains("not checked against an analysis run"));
    }

    #[test]
    fn rules_defaults_to_text_output() {
        let cli = Cli::try_parse_from(["hybrid-ids", "rules"]).unwrap();
        assert!(matches!(cli.command, Commands::Rules { rules: None, json: false }));
    }
}
