//! Ordered signature rules over flow features.
//!
//! Evaluation walks the list in order and stops at the first match, so the
//! position of a rule is its priority.

use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path};
use thiserror::Error;
use tracing::debug;

use crate::flow::{FlowFeature, FlowRecord};

pub const DDOS_PACKET_RATE: f64 = 1000.0;
pub const PORT_SCAN_SYN_COUNT: f64 = 50.0;
pub const ABNORMAL_PACKET_LENGTH: f64 = 1500.0;

pub const DDOS_REASON: &str = "High traffic rate (possible DDoS)";
pub const PORT_SCAN_REASON: &str = "High SYN flag count (possible port scan)";
pub const PACKET_LENGTH_REASON: &str = "Abnormal packet length";
pub const NO_SIGNATURE_REASON: &str = "No signature-based alerts";

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("io error: {0}")] Io(#[from] std::io::Error),
    #[error("serde error: {0}")] Serde(#[from] serde_yaml::Error),
    #[error("rule {id}: unknown feature {feature}")] UnknownFeature { id: String, feature: String },
    #[error("rule {id}: threshold {value} is not finite")] InvalidThreshold { id: String, value: f64 },
    #[error("duplicate rule id: {0}")] DuplicateId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison { Gt, Ge, Lt, Le }

impl Comparison {
    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self { Comparison::Gt => ">", Comparison::Ge => ">=", Comparison::Lt => "<", Comparison::Le => "<=" }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RulePredicate {
    /// `feature <op> value`
    Threshold { feature: FlowFeature, op: Comparison, value: f64 },
    /// `numerator / denominator <op> value`; never fires when the denominator is zero.
    Ratio { numerator: FlowFeature, denominator: FlowFeature, op: Comparison, value: f64 },
}

impl RulePredicate {
    pub fn matches(&self, flow: &FlowRecord) -> bool {
        match *self {
            RulePredicate::Threshold { feature, op, value } => op.holds(flow.get(feature), value),
            RulePredicate::Ratio { numerator, denominator, op, value } => {
                let d = flow.get(denominator);
                d != 0.0 && op.holds(flow.get(numerator) / d, value)
            }
        }
    }
}

impl fmt::Display for RulePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulePredicate::Threshold { feature, op, value } => write!(f, "{feature} {} {value}", op.symbol()),
            RulePredicate::Ratio { numerator, denominator, op, value } => write!(f, "{numerator} / {denominator} {} {value}", op.symbol()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignatureRule {
    pub id: String,
    pub predicate: RulePredicate,
    pub reason: String,
}

impl SignatureRule {
    pub fn threshold(id: impl Into<String>, feature: FlowFeature, op: Comparison, value: f64, reason: impl Into<String>) -> Self {
        Self { id: id.into(), predicate: RulePredicate::Threshold { feature, op, value }, reason: reason.into() }
    }

    pub fn matches(&self, flow: &FlowRecord) -> bool { self.predicate.matches(flow) }
}

impl fmt::Display for SignatureRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} => {}", self.id, self.predicate, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub alert: bool,
    pub rule_id: Option<String>,
    pub reason: String,
}

impl RuleOutcome {
    fn quiet() -> Self { Self { alert: false, rule_id: None, reason: NO_SIGNATURE_REASON.into() } }
}

/// Signature checks in priority order.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEngine {
    rules: Vec<SignatureRule>,
}

impl Default for RuleEngine {
    fn default() -> Self { Self::with_default_rules() }
}

impl RuleEngine {
    pub fn empty() -> Self { Self { rules: Vec::new() } }

    pub fn with_default_rules() -> Self {
        Self {
            rules: vec![
                SignatureRule::threshold("ddos-packet-rate", FlowFeature::FlowPacketsPerSec, Comparison::Gt, DDOS_PACKET_RATE, DDOS_REASON),
                SignatureRule::threshold("syn-port-scan", FlowFeature::SynFlagCount, Comparison::Gt, PORT_SCAN_SYN_COUNT, PORT_SCAN_REASON),
                SignatureRule::threshold("abnormal-packet-length", FlowFeature::PacketLengthMean, Comparison::Gt, ABNORMAL_PACKET_LENGTH, PACKET_LENGTH_REASON),
            ],
        }
    }

    pub fn rules(&self) -> &[SignatureRule] { &self.rules }
    pub fn len(&self) -> usize { self.rules.len() }
    pub fn is_empty(&self) -> bool { self.rules.is_empty() }
    pub fn list(&self) -> Vec<String> { self.rules.iter().map(|r| r.id.clone()).collect() }

    /// Append at lowest priority.
    pub fn push(&mut self, rule: SignatureRule) -> Result<(), RuleError> {
        if self.rules.iter().any(|r| r.id == rule.id) { return Err(RuleError::DuplicateId(rule.id)); }
        self.rules.push(rule);
        Ok(())
    }

    pub fn extend(&mut self, rules: impl IntoIterator<Item = SignatureRule>) -> Result<(), RuleError> {
        for r in rules { self.push(r)?; }
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<SignatureRule> {
        let pos = self.rules.iter().position(|r| r.id == id)?;
        Some(self.rules.remove(pos))
    }

    /// First matching rule wins; later matches are not reported.
    pub fn evaluate(&self, flow: &FlowRecord) -> RuleOutcome {
        match self.rules.iter().find(|r| r.matches(flow)) {
            Some(rule) => {
                debug!(flow_id = flow.id(), rule_id = %rule.id, "signature_match");
                RuleOutcome { alert: true, rule_id: Some(rule.id.clone()), reason: rule.reason.clone() }
            }
            None => RuleOutcome::quiet(),
        }
    }

    /// Build from a YAML bundle. Bundle rules follow the built-in ones unless
    /// `replace_defaults` is set.
    pub fn from_yaml_str(content: &str) -> Result<Self, RuleError> {
        let bundle: RuleBundle = serde_yaml::from_str(content)?;
        let mut engine = if bundle.replace_defaults { Self::empty() } else { Self::with_default_rules() };
        for entry in bundle.rules { engine.push(entry.compile()?)?; }
        Ok(engine)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

#[derive(Debug, Deserialize)]
struct RuleBundle {
    #[serde(default)]
    replace_defaults: bool,
    rules: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    id: String,
    feature: String,
    op: Comparison,
    value: f64,
    reason: String,
    /// Divide `feature` by this one before comparing.
    #[serde(default)]
    per: Option<String>,
}

impl RuleSpec {
    fn compile(self) -> Result<SignatureRule, RuleError> {
        let RuleSpec { id, feature, op, value, reason, per } = self;
        if !value.is_finite() { return Err(RuleError::InvalidThreshold { id, value }); }
        let resolve = |name: &str| FlowFeature::from_column(name).ok_or_else(|| RuleError::UnknownFeature { id: id.clone(), feature: name.to_string() });
        let numerator = resolve(&feature)?;
        let predicate = match per {
            Some(den) => RulePredicate::Ratio { numerator, denominator: resolve(&den)?, op, value },
            None => RulePredicate::Threshold { feature: numerator, op, value },
        };
        Ok(SignatureRule { id, predicate, reason })
    }
}
