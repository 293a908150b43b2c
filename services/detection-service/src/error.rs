use thiserror::Error;

use crate::oracle::ModelError;

/// Collaborator contract violations. The decision core itself never fails;
/// these are raised at the batch boundary instead of clamping bad input.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("classifier score {score} for row {row} lies outside [0, 1]")]
    ScoreOutOfRange { row: usize, score: f64 },
    #[error("{scores} classifier scores supplied for {flows} flows")]
    ScoreCountMismatch { flows: usize, scores: usize },
    #[error("{importances} feature importances supplied for {names} feature names")]
    ImportanceMisaligned { names: usize, importances: usize },
    #[error("feature importance for {name} is not finite")]
    ImportanceInvalid { name: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}
