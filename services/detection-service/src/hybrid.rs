//! Fusion of the classifier signal and signature rules into one verdict.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::flow::FlowRecord;
use crate::rules::{RuleEngine, RuleOutcome};

pub const DEFAULT_ML_THRESHOLD: f64 = 0.7;
pub const NO_ALERTS_REASON: &str = "No alerts";
const REASON_SEPARATOR: &str = " + ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict { Benign = 0, Attack = 1 }

impl Verdict {
    pub fn as_u8(self) -> u8 { self as u8 }
    pub fn is_attack(self) -> bool { self == Verdict::Attack }
    pub fn as_str(self) -> &'static str {
        match self { Verdict::Benign => "BENIGN", Verdict::Attack => "ATTACK" }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One signal that pushed the verdict to ATTACK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Trigger {
    Classifier { probability: f64 },
    Signature { rule_id: Option<String>, reason: String },
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Classifier { probability } => write!(f, "ML-based anomaly detected (prob={probability:.2})"),
            Trigger::Signature { reason, .. } => f.write_str(reason),
        }
    }
}

/// Verdict plus the triggers behind it, classifier first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub ml_alert: bool,
    pub rule_alert: bool,
    pub triggers: Vec<Trigger>,
}

impl Decision {
    /// Human-readable reason: triggers joined by `" + "`, or `"No alerts"`.
    pub fn reason(&self) -> String {
        if self.triggers.is_empty() { return NO_ALERTS_REASON.to_string(); }
        self.triggers.iter().join(REASON_SEPARATOR)
    }
}

/// Classifier alert: strictly above the threshold.
pub fn ml_alert(probability: f64, threshold: f64) -> bool { probability > threshold }

/// Logical OR of the two signals; each firing signal contributes a trigger.
pub fn fuse(probability: f64, ml_alert: bool, rule: RuleOutcome) -> Decision {
    let mut triggers = Vec::with_capacity(2);
    if ml_alert { triggers.push(Trigger::Classifier { probability }); }
    if rule.alert { triggers.push(Trigger::Signature { rule_id: rule.rule_id, reason: rule.reason }); }
    let verdict = if ml_alert || rule.alert { Verdict::Attack } else { Verdict::Benign };
    Decision { verdict, ml_alert, rule_alert: rule.alert, triggers }
}

pub fn decide(rules: &RuleEngine, flow: &FlowRecord, probability: f64, threshold: f64) -> Decision {
    fuse(probability, ml_alert(probability, threshold), rules.evaluate(flow))
}
