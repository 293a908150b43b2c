//! CSV ingestion into typed flow records.
//!
//! Headers are matched after normalisation (see [`normalize_column`]), so
//! `flow_packets/s` and `Flow Packets/s` resolve to the same feature. Rows with
//! a missing, unparsable or non-finite required value are dropped and counted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::flow::{normalize_column, FlowFeature, FlowRecord, Label, FEATURE_COUNT};
use crate::oracle::ScalerParams;

pub const LABEL_COLUMN: &str = "Label";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")] Io(#[from] std::io::Error),
    #[error("csv error: {0}")] Csv(#[from] csv::Error),
    #[error("missing required columns in dataset: {0:?}")] MissingColumns(Vec<String>),
    #[error("required columns appear more than once after normalisation: {0:?}")] AmbiguousColumns(Vec<String>),
    #[error("no flows to fit a scaler on")] EmptyDataset,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Demand the label column and drop rows with an empty label.
    pub require_label: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_dropped: usize,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub records: Vec<FlowRecord>,
    pub report: IngestReport,
}

pub fn load_flows(path: impl AsRef<Path>, opts: IngestOptions) -> Result<Dataset, IngestError> {
    let path = path.as_ref();
    let ds = read_flows(File::open(path)?, opts)?;
    info!(path = %path.display(), kept = ds.report.rows_kept, dropped = ds.report.rows_dropped, "flows_loaded");
    Ok(ds)
}

pub fn read_flows<R: Read>(reader: R, opts: IngestOptions) -> Result<Dataset, IngestError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut columns: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, h) in rdr.headers()?.iter().enumerate() { columns.entry(normalize_column(h)).or_default().push(i); }

    let mut missing: Vec<String> = Vec::new();
    let mut ambiguous: Vec<String> = Vec::new();
    let mut resolve = |name: &str, required: bool| -> Option<usize> {
        match columns.get(&normalize_column(name)).map(Vec::as_slice) {
            Some([i]) => Some(*i),
            Some(_) => { ambiguous.push(name.to_string()); None }
            None => { if required { missing.push(name.to_string()); } None }
        }
    };
    let mut feature_idx = [0usize; FEATURE_COUNT];
    for f in FlowFeature::ALL {
        if let Some(i) = resolve(f.column(), true) { feature_idx[f.index()] = i; }
    }
    let label_idx = resolve(LABEL_COLUMN, opts.require_label);
    if !ambiguous.is_empty() { return Err(IngestError::AmbiguousColumns(ambiguous)); }
    if !missing.is_empty() { return Err(IngestError::MissingColumns(missing)); }
    for (name, idx) in columns.iter().filter(|(_, idx)| idx.len() > 1) {
        warn!(column = %name, positions = ?idx, "duplicate_column_ignored");
    }

    let mut report = IngestReport::default();
    let mut records = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let rec = result?;
        report.rows_read += 1;
        match parse_row(row as u64, &rec, &feature_idx, label_idx, opts.require_label) {
            Some(flow) => records.push(flow),
            None => {
                report.rows_dropped += 1;
                debug!(row, "row_dropped");
            }
        }
    }
    report.rows_kept = records.len();
    Ok(Dataset { records, report })
}

fn parse_row(id: u64, rec: &csv::StringRecord, feature_idx: &[usize; FEATURE_COUNT], label_idx: Option<usize>, require_label: bool) -> Option<FlowRecord> {
    let mut flow = FlowRecord::new(id);
    for f in FlowFeature::ALL {
        let v: f64 = rec.get(feature_idx[f.index()])?.trim().parse().ok()?;
        if !v.is_finite() { return None; }
        flow = flow.with(f, v);
    }
    match label_idx.and_then(|i| rec.get(i)).map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(flow.with_label(Label::from_raw(raw))),
        None if require_label => None,
        None => Some(flow),
    }
}

/// Per-feature standardisation: `(x - mean) / std` with population std;
/// constant features map to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: [f64; FEATURE_COUNT],
    stds: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    pub fn fit(records: &[FlowRecord]) -> Result<Self, IngestError> {
        if records.is_empty() { return Err(IngestError::EmptyDataset); }
        let n = records.len() as f64;
        let mut means = [0.0; FEATURE_COUNT];
        let mut stds = [0.0; FEATURE_COUNT];
        for r in records { for (m, x) in means.iter_mut().zip(r.to_row()) { *m += x / n; } }
        for r in records {
            for ((s, x), m) in stds.iter_mut().zip(r.to_row()).zip(means) { *s += (x - m).powi(2) / n; }
        }
        for s in stds.iter_mut() { *s = s.sqrt(); }
        Ok(Self { means, stds })
    }

    pub fn transform(&self, record: &FlowRecord) -> [f64; FEATURE_COUNT] {
        let mut row = record.to_row();
        for (i, x) in row.iter_mut().enumerate() {
            *x = if self.stds[i] > 0.0 { (*x - self.means[i]) / self.stds[i] } else { 0.0 };
        }
        row
    }

    pub fn transform_all(&self, records: &[FlowRecord]) -> Vec<[f64; FEATURE_COUNT]> {
        records.iter().map(|r| self.transform(r)).collect()
    }

    /// Parameters in schema order, for embedding in a model artifact.
    pub fn params(&self) -> ScalerParams {
        ScalerParams { means: self.means.to_vec(), stds: self.stds.to_vec() }
    }
}
