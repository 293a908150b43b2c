//! Classifier oracle seam and the bundled logistic model.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::flow::{FlowFeature, FlowRecord, Label};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("io error: {0}")] Io(#[from] std::io::Error),
    #[error("model json error: {0}")] Json(#[from] serde_json::Error),
    #[error("model has no features")] Empty,
    #[error("{field} has {got} entries, expected {expected}")] Misaligned { field: &'static str, expected: usize, got: usize },
    #[error("model references unknown feature {0}")] UnknownFeature(String),
    #[error("{field} contains a non-finite value")] NonFinite { field: &'static str },
}

/// Probability source consumed by the decision core. Implementations must
/// return one score per input row, in input order, and keep
/// [`feature_importances`](Self::feature_importances) aligned with
/// [`feature_names`](Self::feature_names).
pub trait ClassifierOracle: Send + Sync {
    fn feature_names(&self) -> &[String];
    fn predict_probability(&self, flows: &[FlowRecord]) -> Result<Vec<f64>, ModelError>;
    fn feature_importances(&self) -> Vec<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub importances: Option<Vec<f64>>,
    #[serde(default)]
    pub scaler: Option<ScalerParams>,
}

/// Logistic regression over schema features, optionally standardised first.
#[derive(Debug, Clone)]
pub struct LinearModel {
    names: Vec<String>,
    features: Vec<FlowFeature>,
    coefficients: Vec<f64>,
    intercept: f64,
    importances: Vec<f64>,
    scaler: Option<ScalerParams>,
}

impl LinearModel {
    pub fn from_artifact(a: ModelArtifact) -> Result<Self, ModelError> {
        let n = a.feature_names.len();
        if n == 0 { return Err(ModelError::Empty); }
        let features = a.feature_names.iter()
            .map(|name| FlowFeature::from_column(name).ok_or_else(|| ModelError::UnknownFeature(name.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        check_aligned("coefficients", &a.coefficients, n)?;
        if !a.intercept.is_finite() { return Err(ModelError::NonFinite { field: "intercept" }); }
        let importances = match a.importances {
            Some(imp) => { check_aligned("importances", &imp, n)?; imp }
            None => normalized_magnitudes(&a.coefficients),
        };
        if let Some(s) = &a.scaler {
            check_aligned("scaler.means", &s.means, n)?;
            check_aligned("scaler.stds", &s.stds, n)?;
        }
        Ok(Self { names: a.feature_names, features, coefficients: a.coefficients, intercept: a.intercept, importances, scaler: a.scaler })
    }

    pub fn from_json(content: &str) -> Result<Self, ModelError> {
        Self::from_artifact(serde_json::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let model = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(path = %path.display(), features = model.names.len(), "model_loaded");
        Ok(model)
    }

    fn score(&self, flow: &FlowRecord) -> f64 {
        let z = self.features.iter().enumerate().fold(self.intercept, |acc, (i, f)| {
            let mut x = flow.get(*f);
            if let Some(s) = &self.scaler { x = if s.stds[i] > 0.0 { (x - s.means[i]) / s.stds[i] } else { 0.0 }; }
            acc + self.coefficients[i] * x
        });
        sigmoid(z)
    }
}

impl ClassifierOracle for LinearModel {
    fn feature_names(&self) -> &[String] { &self.names }

    fn predict_probability(&self, flows: &[FlowRecord]) -> Result<Vec<f64>, ModelError> {
        Ok(flows.iter().map(|f| self.score(f)).collect())
    }

    fn feature_importances(&self) -> Vec<f64> { self.importances.clone() }
}

fn check_aligned(field: &'static str, v: &[f64], expected: usize) -> Result<(), ModelError> {
    if v.len() != expected { return Err(ModelError::Misaligned { field, expected, got: v.len() }); }
    if v.iter().any(|x| !x.is_finite()) { return Err(ModelError::NonFinite { field }); }
    Ok(())
}

fn normalized_magnitudes(coefs: &[f64]) -> Vec<f64> {
    let total: f64 = coefs.iter().map(|c| c.abs()).sum();
    if total == 0.0 { return vec![0.0; coefs.len()]; }
    coefs.iter().map(|c| c.abs() / total).collect()
}

fn sigmoid(z: f64) -> f64 { 1.0 / (1.0 + (-z).exp()) }

/// Binary classification quality of `scores` against ground-truth labels,
/// treating `score > threshold` as a positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelEvaluation {
    pub support: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Rows without a label are skipped.
pub fn evaluate_predictions(flows: &[FlowRecord], predicted_attack: impl IntoIterator<Item = bool>) -> ModelEvaluation {
    let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    for (flow, pred) in flows.iter().zip(predicted_attack) {
        match (flow.label(), pred) {
            (Some(Label::Attack), true) => tp += 1,
            (Some(Label::Benign), true) => fp += 1,
            (Some(Label::Benign), false) => tn += 1,
            (Some(Label::Attack), false) => fn_ += 1,
            (None, _) => {}
        }
    }
    let support = tp + fp + tn + fn_;
    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 { 0.0 } else { 2.0 * precision * recall / (precision + recall) };
    ModelEvaluation { support, accuracy: ratio(tp + tn, support), precision, recall, f1 }
}
