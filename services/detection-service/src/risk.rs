//! Risk scoring and model-wide feature attribution.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::DetectionError;
use crate::hybrid::Verdict;
use crate::oracle::ClassifierOracle;

pub const ATTACK_BOOST: f64 = 20.0;
pub const MAX_RISK: f64 = 100.0;
pub const DEFAULT_TOP_N: usize = 3;

/// `probability * 100`, plus 20 capped at 100 on ATTACK, truncated toward zero.
pub fn risk_score(probability: f64, verdict: Verdict) -> u8 {
    let base = probability * 100.0;
    let risk = match verdict {
        Verdict::Attack => (base + ATTACK_BOOST).min(MAX_RISK),
        Verdict::Benign => base,
    };
    // `as` truncates; it also saturates so the result stays within u8.
    risk as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub name: String,
    pub weight: f64,
}

/// Global importance ranking of one model. Identical for every flow the
/// model scores, so batches share a single instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureRanking {
    entries: Vec<FeatureWeight>,
}

impl FeatureRanking {
    pub fn entries(&self) -> &[FeatureWeight] { &self.entries }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn names(&self) -> Vec<&str> { self.entries.iter().map(|e| e.name.as_str()).collect() }
}

/// Pair names with importances by position, sort by weight descending
/// (stable, so ties keep schema order) and keep the first `top_n`.
pub fn explain(names: &[String], importances: &[f64], top_n: usize) -> Result<FeatureRanking, DetectionError> {
    if names.len() != importances.len() {
        return Err(DetectionError::ImportanceMisaligned { names: names.len(), importances: importances.len() });
    }
    if let Some((name, _)) = names.iter().zip(importances).find(|(_, w)| !w.is_finite()) {
        return Err(DetectionError::ImportanceInvalid { name: name.clone() });
    }
    let mut entries: Vec<FeatureWeight> = names.iter().zip(importances)
        .map(|(name, &weight)| FeatureWeight { name: name.clone(), weight })
        .collect();
    entries.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));
    entries.truncate(top_n);
    Ok(FeatureRanking { entries })
}

pub fn explain_model(model: &dyn ClassifierOracle, top_n: usize) -> Result<FeatureRanking, DetectionError> {
    explain(model.feature_names(), &model.feature_importances(), top_n)
}
