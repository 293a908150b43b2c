//! End-to-end: CSV ingestion -> model scoring -> fusion -> risk -> feedback.

use std::io::Write;
use std::sync::Arc;

use hybrid_ids::feedback::{FeedbackEntry, FeedbackLabel, FeedbackLog};
use hybrid_ids::flow::{FlowFeature, FlowRecord};
use hybrid_ids::ingest::{read_flows, IngestOptions, StandardScaler};
use hybrid_ids::oracle::{evaluate_predictions, LinearModel, ModelArtifact};
use hybrid_ids::risk::{explain, explain_model};
use hybrid_ids::rules::{Comparison, SignatureRule};
use hybrid_ids::{ClassifierOracle, DetectionError, DetectionPipeline, RuleEngine, Verdict};

const FLOWS_CSV: &str = "\
Flow Duration,Total Fwd Packets,Total Backward Packets,Packet Length Mean,Packet Length Std,Flow Bytes/s,Flow Packets/s,SYN Flag Count,ACK Flag Count,Label
1000,10,8,200,20,5000,1500,10,4,DDoS
2000,4,4,90,5,800,20,1,3,BENIGN
1500,60,0,40,1,300,900,120,0,PortScan
800,3,2,1700,30,9000,15,0,2,BENIGN
900,3,2,100,30,Infinity,15,0,2,BENIGN
";

fn model() -> LinearModel {
    LinearModel::from_artifact(ModelArtifact {
        feature_names: FlowFeature::ALL.iter().map(|f| f.column().to_string()).collect(),
        coefficients: vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.004, 0.03, 0.0],
        intercept: -3.0,
        importances: Some(vec![0.02, 0.08, 0.05, 0.15, 0.05, 0.1, 0.3, 0.2, 0.05]),
        scaler: None,
    })
    .unwrap()
}

#[test]
fn end_to_end_scenario_from_overview() {
    let flow = FlowRecord::from_pairs(0, [
        (FlowFeature::FlowPacketsPerSec, 1500.0),
        (FlowFeature::SynFlagCount, 10.0),
        (FlowFeature::PacketLengthMean, 200.0),
    ]);
    let pipe = DetectionPipeline::default();
    let ranking = Arc::new(explain(&["Flow Packets/s".to_string()], &[1.0], 3).unwrap());
    let report = pipe.evaluate_batch(&[flow], &[0.85], ranking).unwrap();
    let row = &report.rows[0];
    assert_eq!(row.verdict, Verdict::Attack);
    assert_eq!(row.reason, "ML-based anomaly detected (prob=0.85) + High traffic rate (possible DDoS)");
    assert_eq!(row.risk_score, 100);
}

#[test]
fn csv_through_model_and_pipeline() {
    let ds = read_flows(FLOWS_CSV.as_bytes(), IngestOptions { require_label: true }).unwrap();
    assert_eq!(ds.report.rows_dropped, 1);
    let model = model();
    let report = DetectionPipeline::default().run(&ds.records, &model).unwrap();

    assert_eq!(report.rows.len(), 4);
    assert_eq!(report.ranking.names(), vec!["Flow Packets/s", "SYN Flag Count", "Packet Length Mean"]);

    let by_id = |id: u64| report.rows.iter().find(|r| r.flow_id == id).unwrap();
    // 1500 pkt/s: both signals.
    assert_eq!(by_id(0).verdict, Verdict::Attack);
    assert!(by_id(0).reason.starts_with("ML-based anomaly detected (prob="));
    assert!(by_id(0).reason.ends_with(" + High traffic rate (possible DDoS)"));
    assert_eq!(by_id(0).risk_score, 100);
    // quiet flow
    assert_eq!(by_id(1).verdict, Verdict::Benign);
    assert_eq!(by_id(1).reason, "No alerts");
    // SYN scan: ML fires from the SYN weight, rule fires too.
    assert_eq!(by_id(2).triggers.len(), 2);
    assert!(by_id(2).reason.ends_with("High SYN flag count (possible port scan)"));
    // jumbo packets: rule only
    assert_eq!(by_id(3).reason, "Abnormal packet length");
    assert!(by_id(3).risk_score >= 20);

    assert_eq!(report.summary.total_flows, 4);
    assert_eq!(report.summary.predicted_attacks, 3);

    let hybrid = evaluate_predictions(&ds.records, report.rows.iter().map(|r| r.verdict.is_attack()));
    assert_eq!(hybrid.support, 4);
    assert_eq!(hybrid.recall, 1.0);
}

#[test]
fn explain_is_deterministic_and_prefix_stable() {
    let model = model();
    let five = explain_model(&model, 5).unwrap();
    let three = explain_model(&model, 3).unwrap();
    assert_eq!(explain_model(&model, 5).unwrap(), five);
    assert_eq!(three.entries(), &five.entries()[..3]);
}

#[test]
fn misaligned_oracle_is_a_contract_violation() {
    struct Broken;
    impl ClassifierOracle for Broken {
        fn feature_names(&self) -> &[String] { &[] }
        fn predict_probability(&self, flows: &[FlowRecord]) -> Result<Vec<f64>, hybrid_ids::oracle::ModelError> { Ok(vec![1.5; flows.len()]) }
        fn feature_importances(&self) -> Vec<f64> { vec![0.2] }
    }
    let err = DetectionPipeline::default().run(&[FlowRecord::new(0)], &Broken).unwrap_err();
    assert!(matches!(err, DetectionError::ImportanceMisaligned { names: 0, importances: 1 }));
}

#[test]
fn out_of_range_oracle_scores_rejected() {
    struct Overconfident(Vec<String>);
    impl ClassifierOracle for Overconfident {
        fn feature_names(&self) -> &[String] { &self.0 }
        fn predict_probability(&self, flows: &[FlowRecord]) -> Result<Vec<f64>, hybrid_ids::oracle::ModelError> { Ok(vec![1.5; flows.len()]) }
        fn feature_importances(&self) -> Vec<f64> { vec![1.0] }
    }
    let oracle = Overconfident(vec!["SYN Flag Count".into()]);
    let err = DetectionPipeline::default().run(&[FlowRecord::new(0)], &oracle).unwrap_err();
    assert!(matches!(err, DetectionError::ScoreOutOfRange { row: 0, .. }));
}

#[test]
fn registered_rule_changes_verdicts_without_touching_fusion() {
    let mut pipe = DetectionPipeline::default();
    pipe.rules_mut()
        .push(SignatureRule::threshold("ack-flood", FlowFeature::AckFlagCount, Comparison::Gt, 1000.0, "ACK flood"))
        .unwrap();
    let flow = FlowRecord::new(1).with(FlowFeature::AckFlagCount, 5000.0);
    let ranking = Arc::new(Default::default());
    let report = pipe.evaluate_batch(&[flow], &[0.1], ranking).unwrap();
    assert_eq!(report.rows[0].verdict, Verdict::Attack);
    assert_eq!(report.rows[0].reason, "ACK flood");
    assert_eq!(report.rows[0].risk_score, 30);
}

#[test]
fn rules_file_on_disk_extends_defaults() {
    let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(f, "rules:\n  - {{ id: slow-loris, feature: Flow Duration, op: gt, value: 100000, reason: Slow connection hold }}").unwrap();
    let engine = RuleEngine::load_file(f.path()).unwrap();
    assert_eq!(engine.len(), 4);
    let out = engine.evaluate(&FlowRecord::new(0).with(FlowFeature::FlowDuration, 2e5));
    assert_eq!(out.reason, "Slow connection hold");
}

#[test]
fn scaled_model_scores_standardised_rows() {
    let ds = read_flows(FLOWS_CSV.as_bytes(), IngestOptions::default()).unwrap();
    let scaler = StandardScaler::fit(&ds.records).unwrap();
    let mut coefficients = vec![0.0; FlowFeature::ALL.len()];
    coefficients[FlowFeature::SynFlagCount.index()] = 2.0;
    let model = LinearModel::from_artifact(ModelArtifact {
        feature_names: FlowFeature::ALL.iter().map(|f| f.column().to_string()).collect(),
        coefficients,
        intercept: 0.0,
        importances: None,
        scaler: Some(scaler.params()),
    })
    .unwrap();
    let scores = model.predict_probability(&ds.records).unwrap();
    let max = scores.iter().cloned().fold(f64::MIN, f64::max);
    assert_eq!(scores[2], max);
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
}

#[test]
fn feedback_round_trip_for_alerts() {
    let ds = read_flows(FLOWS_CSV.as_bytes(), IngestOptions::default()).unwrap();
    let report = DetectionPipeline::default().run(&ds.records, &model()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let log = FeedbackLog::new(dir.path().join("feedback.csv"));
    let entries: Vec<FeedbackEntry> = report.rows.iter()
        .filter(|r| r.verdict.is_attack())
        .map(|r| FeedbackEntry::for_flow(r, FeedbackLabel::TrueAlert).unwrap())
        .collect();
    assert_eq!(log.append(&entries).unwrap(), 3);
    let stored = log.read_all().unwrap();
    assert_eq!(stored, entries);
    assert!(stored.iter().all(|e| e.hybrid_alert == 1));
}

#[test]
fn shipped_examples_load() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let engine = RuleEngine::load_file(dir.join("rules.example.yaml")).unwrap();
    assert_eq!(engine.list(), vec!["ddos-packet-rate", "syn-port-scan", "abnormal-packet-length", "slow-loris", "syn-ack-imbalance"]);
    let model = LinearModel::load(dir.join("model.example.json")).unwrap();
    assert_eq!(model.feature_names().len(), FlowFeature::ALL.len());
    let cfg = ids_core::load_config_from("hybrid-ids", Some(&dir.join("hids.example.yaml"))).unwrap();
    assert_eq!(cfg.rules_file.as_deref(), Some("config/rules.example.yaml"));
}
