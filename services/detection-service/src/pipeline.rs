use anyhow::Context;
use ids_core::{detection_metrics, DetectionConfig};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::DetectionError;
use crate::flow::FlowRecord;
use crate::hybrid::{decide, Trigger, Verdict, DEFAULT_ML_THRESHOLD};
use crate::oracle::ClassifierOracle;
use crate::risk::{explain_model, risk_score, FeatureRanking, DEFAULT_TOP_N};
use crate::rules::RuleEngine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedFlow {
    pub flow_id: u64,
    pub ml_probability: f64,
    pub verdict: Verdict,
    pub reason: String,
    pub triggers: Vec<Trigger>,
    pub risk_score: u8,
    /// Shared across the batch; this is the model's ranking, not a per-flow attribution.
    pub top_features: Arc<FeatureRanking>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_flows: usize,
    pub predicted_attacks: usize,
    pub predicted_benign: usize,
    pub rule_triggered: usize,
    pub ml_triggered: usize,
}

impl BatchSummary {
    fn from_rows(rows: &[EvaluatedFlow]) -> Self {
        rows.iter().fold(Self::default(), |mut s, r| {
            s.total_flows += 1;
            if r.verdict.is_attack() { s.predicted_attacks += 1; } else { s.predicted_benign += 1; }
            for t in &r.triggers {
                match t {
                    Trigger::Classifier { .. } => s.ml_triggered += 1,
                    Trigger::Signature { .. } => s.rule_triggered += 1,
                }
            }
            s
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub rows: Vec<EvaluatedFlow>,
    pub summary: BatchSummary,
    pub ranking: Arc<FeatureRanking>,
    pub latency_ms: f64,
}

pub struct DetectionPipeline {
    rules: RuleEngine,
    threshold: f64,
    top_n: usize,
    parallel: bool,
}

impl Default for DetectionPipeline {
    fn default() -> Self { Self::new(RuleEngine::default(), DEFAULT_ML_THRESHOLD) }
}

impl DetectionPipeline {
    pub fn new(rules: RuleEngine, threshold: f64) -> Self {
        Self { rules, threshold, top_n: DEFAULT_TOP_N, parallel: false }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self { self.top_n = top_n; self }
    pub fn with_parallel(mut self, parallel: bool) -> Self { self.parallel = parallel; self }

    /// Rules from `cfg.rules_file` (appended to the built-ins) or the built-ins alone.
    pub fn from_config(cfg: &DetectionConfig) -> anyhow::Result<Self> {
        let rules = match &cfg.rules_file {
            Some(path) => RuleEngine::load_file(path).with_context(|| format!("loading rules from {path}"))?,
            None => RuleEngine::default(),
        };
        info!(rules = rules.len(), threshold = cfg.ml_threshold, top_n = cfg.top_n, "pipeline_configured");
        Ok(Self::new(rules, cfg.ml_threshold).with_top_n(cfg.top_n).with_parallel(cfg.parallel))
    }

    pub fn rules(&self) -> &RuleEngine { &self.rules }
    pub fn rules_mut(&mut self) -> &mut RuleEngine { &mut self.rules }
    pub fn threshold(&self) -> f64 { self.threshold }
    pub fn top_n(&self) -> usize { self.top_n }

    fn evaluate_one(&self, flow: &FlowRecord, probability: f64, ranking: &Arc<FeatureRanking>) -> EvaluatedFlow {
        let decision = decide(&self.rules, flow, probability, self.threshold);
        let risk = risk_score(probability, decision.verdict);
        let reason = decision.reason();
        debug!(flow_id = flow.id(), verdict = %decision.verdict, risk, %reason, "flow_evaluated");
        EvaluatedFlow {
            flow_id: flow.id(),
            ml_probability: probability,
            verdict: decision.verdict,
            reason,
            triggers: decision.triggers,
            risk_score: risk,
            top_features: Arc::clone(ranking),
        }
    }

    /// Evaluate pre-scored flows in order. Scores must be one per flow, each in [0, 1].
    #[instrument(skip_all, fields(flows = flows.len()))]
    pub fn evaluate_batch(&self, flows: &[FlowRecord], scores: &[f64], ranking: Arc<FeatureRanking>) -> Result<BatchReport, DetectionError> {
        let start = Instant::now();
        validate_scores(flows.len(), scores)?;
        let rows: Vec<EvaluatedFlow> = flows.iter().zip(scores).map(|(f, &p)| self.evaluate_one(f, p, &ranking)).collect();
        Ok(self.finish(rows, ranking, start))
    }

    /// Same output as [`evaluate_batch`](Self::evaluate_batch), rows spread across the rayon pool.
    #[instrument(skip_all, fields(flows = flows.len()))]
    pub fn evaluate_batch_parallel(&self, flows: &[FlowRecord], scores: &[f64], ranking: Arc<FeatureRanking>) -> Result<BatchReport, DetectionError> {
        let start = Instant::now();
        validate_scores(flows.len(), scores)?;
        let rows: Vec<EvaluatedFlow> = flows.par_iter().zip(scores.par_iter()).map(|(f, &p)| self.evaluate_one(f, p, &ranking)).collect();
        Ok(self.finish(rows, ranking, start))
    }

    /// Score with the oracle, rank its features once, then evaluate.
    pub fn run(&self, flows: &[FlowRecord], model: &dyn ClassifierOracle) -> Result<BatchReport, DetectionError> {
        let scores = model.predict_probability(flows)?;
        let ranking = Arc::new(explain_model(model, self.top_n).inspect_err(|_| detection_metrics().contract_violation_total.add(1, &[]))?);
        if self.parallel {
            self.evaluate_batch_parallel(flows, &scores, ranking)
        } else {
            self.evaluate_batch(flows, &scores, ranking)
        }
    }

    fn finish(&self, rows: Vec<EvaluatedFlow>, ranking: Arc<FeatureRanking>, start: Instant) -> BatchReport {
        let summary = BatchSummary::from_rows(&rows);
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let m = detection_metrics();
        m.flows_total.add(summary.total_flows as u64, &[]);
        m.attack_total.add(summary.predicted_attacks as u64, &[]);
        m.benign_total.add(summary.predicted_benign as u64, &[]);
        m.rule_alert_total.add(summary.rule_triggered as u64, &[]);
        m.ml_alert_total.add(summary.ml_triggered as u64, &[]);
        m.batch_latency_ms.record(latency_ms, &[]);
        info!(total = summary.total_flows, attacks = summary.predicted_attacks, benign = summary.predicted_benign, latency_ms, "batch_evaluated");
        BatchReport { rows, summary, ranking, latency_ms }
    }
}

fn validate_scores(flows: usize, scores: &[f64]) -> Result<(), DetectionError> {
    let err = if scores.len() != flows {
        Some(DetectionError::ScoreCountMismatch { flows, scores: scores.len() })
    } else {
        scores.iter().enumerate()
            .find(|(_, s)| !(0.0..=1.0).contains(*s))
            .map(|(row, &score)| DetectionError::ScoreOutOfRange { row, score })
    };
    match err {
        Some(e) => {
            detection_metrics().contract_violation_total.add(1, &[]);
            warn!(error = %e, "classifier_contract_violation");
            Err(e)
        }
        None => Ok(()),
    }
}
