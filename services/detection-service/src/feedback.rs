//! Analyst feedback on alerts, appended to a CSV log.

use ids_core::detection_metrics;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

use crate::pipeline::EvaluatedFlow;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("io error: {0}")] Io(#[from] std::io::Error),
    #[error("csv error: {0}")] Csv(#[from] csv::Error),
    #[error("flow {0} was not alerted; feedback applies to alerts only")] NotAnAlert(u64),
    #[error("unknown feedback label: {0}")] UnknownLabel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackLabel {
    #[serde(rename = "True Alert")] TrueAlert,
    #[serde(rename = "False Positive")] FalsePositive,
}

impl FromStr for FeedbackLabel {
    type Err = FeedbackError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], " ").as_str() {
            "true alert" | "true" | "tp" => Ok(FeedbackLabel::TrueAlert),
            "false positive" | "false" | "fp" => Ok(FeedbackLabel::FalsePositive),
            _ => Err(FeedbackError::UnknownLabel(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    #[serde(rename = "Flow_ID")]
    pub flow_id: u64,
    #[serde(rename = "Hybrid_Alert")]
    pub hybrid_alert: u8,
    #[serde(rename = "Feedback")]
    pub feedback: FeedbackLabel,
}

impl FeedbackEntry {
    pub fn for_flow(flow: &EvaluatedFlow, feedback: FeedbackLabel) -> Result<Self, FeedbackError> {
        if !flow.verdict.is_attack() { return Err(FeedbackError::NotAnAlert(flow.flow_id)); }
        Ok(Self { flow_id: flow.flow_id, hybrid_alert: flow.verdict.as_u8(), feedback })
    }
}

pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    pub fn path(&self) -> &Path { &self.path }

    /// Append entries after any existing rows; the header is written only
    /// when the file is new or empty.
    pub fn append(&self, entries: &[FeedbackEntry]) -> Result<usize, FeedbackError> {
        let mut file = OpenOptions::new().create(true).read(true).append(true).open(&self.path)?;
        let has_rows = file.metadata()?.len() > 0;
        if has_rows && !ends_with_newline(&mut file)? { file.write_all(b"\n")?; }
        let mut w = csv::WriterBuilder::new().has_headers(!has_rows).from_writer(file);
        for e in entries { w.serialize(e)?; }
        w.flush()?;
        detection_metrics().feedback_total.add(entries.len() as u64, &[]);
        info!(path = %self.path.display(), entries = entries.len(), "feedback_saved");
        Ok(entries.len())
    }

    pub fn read_all(&self) -> Result<Vec<FeedbackEntry>, FeedbackError> {
        if !self.path.exists() { return Ok(Vec::new()); }
        let mut rdr = csv::Reader::from_path(&self.path)?;
        rdr.deserialize().map(|r| r.map_err(FeedbackError::from)).collect()
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
