//! Typed flow records over the fixed CIC-IDS feature schema.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const FEATURE_COUNT: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlowFeature {
    #[serde(rename = "Flow Duration")] FlowDuration,
    #[serde(rename = "Total Fwd Packets")] TotalFwdPackets,
    #[serde(rename = "Total Backward Packets")] TotalBackwardPackets,
    #[serde(rename = "Packet Length Mean")] PacketLengthMean,
    #[serde(rename = "Packet Length Std")] PacketLengthStd,
    #[serde(rename = "Flow Bytes/s")] FlowBytesPerSec,
    #[serde(rename = "Flow Packets/s")] FlowPacketsPerSec,
    #[serde(rename = "SYN Flag Count")] SynFlagCount,
    #[serde(rename = "ACK Flag Count")] AckFlagCount,
}

impl FlowFeature {
    /// Schema order. Feature matrices and model artifacts use this ordering.
    pub const ALL: [FlowFeature; FEATURE_COUNT] = [
        FlowFeature::FlowDuration,
        FlowFeature::TotalFwdPackets,
        FlowFeature::TotalBackwardPackets,
        FlowFeature::PacketLengthMean,
        FlowFeature::PacketLengthStd,
        FlowFeature::FlowBytesPerSec,
        FlowFeature::FlowPacketsPerSec,
        FlowFeature::SynFlagCount,
        FlowFeature::AckFlagCount,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            FlowFeature::FlowDuration => "Flow Duration",
            FlowFeature::TotalFwdPackets => "Total Fwd Packets",
            FlowFeature::TotalBackwardPackets => "Total Backward Packets",
            FlowFeature::PacketLengthMean => "Packet Length Mean",
            FlowFeature::PacketLengthStd => "Packet Length Std",
            FlowFeature::FlowBytesPerSec => "Flow Bytes/s",
            FlowFeature::FlowPacketsPerSec => "Flow Packets/s",
            FlowFeature::SynFlagCount => "SYN Flag Count",
            FlowFeature::AckFlagCount => "ACK Flag Count",
        }
    }

    pub fn index(self) -> usize { self as usize }

    /// Value read when a record lacks the feature. Every counter and rate
    /// in the schema defaults to zero, which keeps signature rules fail-open.
    pub fn default_value(&self) -> f64 { 0.0 }

    /// Resolve a header or rule reference, tolerant of case, padding and
    /// `_` in place of spaces.
    pub fn from_column(name: &str) -> Option<Self> {
        let wanted = normalize_column(name);
        Self::ALL.into_iter().find(|f| normalize_column(f.column()) == wanted)
    }
}

impl fmt::Display for FlowFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.column()) }
}

impl FromStr for FlowFeature {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_column(s).ok_or_else(|| format!("unknown flow feature: {s}"))
    }
}

/// Canonical header form: trimmed, `_` as space, each alphabetic run
/// capitalised with the rest lowercased (`syn_flag_count` -> `Syn Flag Count`,
/// `Flow Packets/s` -> `Flow Packets/S`).
pub fn normalize_column(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_alpha = false;
    for ch in name.trim().replace('_', " ").chars() {
        if ch.is_alphabetic() {
            if prev_alpha { out.extend(ch.to_lowercase()); } else { out.extend(ch.to_uppercase()); }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label { Benign, Attack }

impl Label {
    /// `BENIGN` and `NORMAL` (any case) are benign; every other label is an attack class.
    pub fn from_raw(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        if upper == "BENIGN" || upper == "NORMAL" { Label::Benign } else { Label::Attack }
    }

    pub fn is_attack(&self) -> bool { matches!(self, Label::Attack) }
}

/// One flow's feature values. Built once, then read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    id: u64,
    values: [Option<f64>; FEATURE_COUNT],
    label: Option<Label>,
}

impl FlowRecord {
    pub fn new(id: u64) -> Self { Self { id, values: [None; FEATURE_COUNT], label: None } }

    pub fn from_pairs(id: u64, pairs: impl IntoIterator<Item = (FlowFeature, f64)>) -> Self {
        pairs.into_iter().fold(Self::new(id), |rec, (f, v)| rec.with(f, v))
    }

    pub fn with(mut self, feature: FlowFeature, value: f64) -> Self {
        self.values[feature.index()] = Some(value);
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    pub fn id(&self) -> u64 { self.id }
    pub fn label(&self) -> Option<Label> { self.label }

    /// Feature value, or the feature's default when absent.
    pub fn get(&self, feature: FlowFeature) -> f64 {
        self.values[feature.index()].unwrap_or_else(|| feature.default_value())
    }

    pub fn raw(&self, feature: FlowFeature) -> Option<f64> { self.values[feature.index()] }

    pub fn is_present(&self, feature: FlowFeature) -> bool { self.values[feature.index()].is_some() }

    /// Dense row in schema order with defaults filled in.
    pub fn to_row(&self) -> [f64; FEATURE_COUNT] {
        let mut row = [0.0; FEATURE_COUNT];
        for f in FlowFeature::ALL { row[f.index()] = self.get(f); }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_feature_reads_default() {
        let rec = FlowRecord::new(7).with(FlowFeature::SynFlagCount, 12.0);
        assert_eq!(rec.get(FlowFeature::SynFlagCount), 12.0);
        assert_eq!(rec.get(FlowFeature::FlowPacketsPerSec), 0.0);
        assert!(!rec.is_present(FlowFeature::FlowPacketsPerSec));
        assert_eq!(rec.raw(FlowFeature::FlowPacketsPerSec), None);
    }

    #[test]
    fn column_resolution_is_lenient() {
        assert_eq!(FlowFeature::from_column("flow_packets/s"), Some(FlowFeature::FlowPacketsPerSec));
        assert_eq!(FlowFeature::from_column("  SYN Flag Count "), Some(FlowFeature::SynFlagCount));
        assert_eq!(FlowFeature::from_column("Syn Flag Count"), Some(FlowFeature::SynFlagCount));
        assert_eq!(FlowFeature::from_column("Fwd IAT Min"), None);
        assert!("Bogus".parse::<FlowFeature>().is_err());
    }

    #[test]
    fn normalize_matches_title_case() {
        assert_eq!(normalize_column(" total_fwd_packets "), "Total Fwd Packets");
        assert_eq!(normalize_column("Flow Packets/s"), "Flow Packets/S");
        assert_eq!(normalize_column("ACK Flag Count"), "Ack Flag Count");
    }

    #[test]
    fn labels_map_to_binary_classes() {
        assert_eq!(Label::from_raw("BENIGN"), Label::Benign);
        assert_eq!(Label::from_raw(" normal "), Label::Benign);
        assert_eq!(Label::from_raw("DDoS"), Label::Attack);
        assert!(Label::from_raw("PortScan").is_attack());
    }

    #[test]
    fn row_follows_schema_order() {
        let rec = FlowRecord::from_pairs(1, [(FlowFeature::AckFlagCount, 3.0), (FlowFeature::FlowDuration, 9.0)]);
        let row = rec.to_row();
        assert_eq!(row[0], 9.0);
        assert_eq!(row[FEATURE_COUNT - 1], 3.0);
        assert_eq!(row.iter().sum::<f64>(), 12.0);
    }
}
