//! Hybrid intrusion detection: signature rules fused with a classifier score.
//!
//! Per flow, [`rules::RuleEngine`] and a [`oracle::ClassifierOracle`] are
//! consulted, [`hybrid::decide`] merges them into a verdict, and [`risk`]
//! turns the verdict into a bounded score plus the model-wide feature ranking.

pub mod error;
pub mod feedback;
pub mod flow;
pub mod hybrid;
pub mod ingest;
pub mod oracle;
pub mod pipeline;
pub mod risk;
pub mod rules;

pub use error::DetectionError;
pub use flow::{FlowFeature, FlowRecord, Label};
pub use hybrid::{decide, Decision, Trigger, Verdict, DEFAULT_ML_THRESHOLD};
pub use oracle::{ClassifierOracle, LinearModel};
pub use pipeline::{BatchReport, BatchSummary, DetectionPipeline, EvaluatedFlow};
pub use risk::{explain, risk_score, FeatureRanking, FeatureWeight};
pub use rules::{RuleEngine, RuleOutcome, SignatureRule};
