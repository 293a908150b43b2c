//! Detection metric handles.
//!
//! Instruments hang off the global meter, so they are no-ops until a host
//! installs a meter provider.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};

#[derive(Clone, Debug)]
pub struct DetectionMetrics {
    pub flows_total: Counter<u64>,
    pub rule_alert_total: Counter<u64>,
    pub ml_alert_total: Counter<u64>,
    pub attack_total: Counter<u64>,
    pub benign_total: Counter<u64>,
    pub contract_violation_total: Counter<u64>,
    pub feedback_total: Counter<u64>,
    pub batch_latency_ms: Histogram<f64>,
}

static DETECTION_METER: Lazy<Meter> = Lazy::new(|| opentelemetry::global::meter("hids_detection"));

static DETECTION_METRICS: Lazy<DetectionMetrics> = Lazy::new(|| DetectionMetrics {
    flows_total: DETECTION_METER.u64_counter("hids_flows_evaluated_total").with_description("Flows passed through the hybrid decision engine").build(),
    rule_alert_total: DETECTION_METER.u64_counter("hids_rule_alert_total").with_description("Flows matched by a signature rule").build(),
    ml_alert_total: DETECTION_METER.u64_counter("hids_ml_alert_total").with_description("Flows whose classifier score crossed the threshold").build(),
    attack_total: DETECTION_METER.u64_counter("hids_attack_verdict_total").with_description("ATTACK verdicts").build(),
    benign_total: DETECTION_METER.u64_counter("hids_benign_verdict_total").with_description("BENIGN verdicts").build(),
    contract_violation_total: DETECTION_METER.u64_counter("hids_contract_violation_total").with_description("Batches rejected for collaborator contract violations").build(),
    feedback_total: DETECTION_METER.u64_counter("hids_feedback_total").with_description("Analyst feedback entries persisted").build(),
    batch_latency_ms: DETECTION_METER.f64_histogram("hids_batch_latency_ms").with_description("Wall time to evaluate one batch (ms)").with_unit("ms").build(),
});

pub fn detection_metrics() -> &'static DetectionMetrics { &DETECTION_METRICS }
