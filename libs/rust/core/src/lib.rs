//! Core shared utilities for the hybrid IDS services.
//!
//! Tracing bootstrap, layered configuration and the detection metric handles
//! live here so every binary initialises them the same way.

use anyhow::{bail, Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod metrics;
pub use metrics::{detection_metrics, DetectionMetrics};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

pub const CONFIG_FILE_ENV: &str = "HIDS_CONFIG_FILE";
pub const JSON_LOG_ENV: &str = "HIDS_JSON_LOG";
pub const ENV_PREFIX: &str = "HIDS";

/// Install the global subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var(JSON_LOG_ENV).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let (json_layer, plain_layer) = if json {
            (Some(tracing_subscriber::fmt::layer().json().flatten_event(true).with_current_span(true).with_span_list(false)), None)
        } else {
            (None, Some(tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false).with_line_number(true)))
        };
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .with(plain_layer)
            .try_init()
            .context("installing tracing subscriber")?;
        Ok(())
    })?;
    info!(target: "ids_core", service, "tracing initialized");
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    pub service_name: String,
    /// Classifier probability above which the ML signal fires.
    pub ml_threshold: f64,
    pub top_n: usize,
    #[serde(default)]
    pub rules_file: Option<String>,
    pub feedback_file: String,
    pub log_level: String,
    pub parallel: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            service_name: "hybrid-ids".into(),
            ml_threshold: 0.7,
            top_n: 3,
            rules_file: None,
            feedback_file: "feedback_log.csv".into(),
            log_level: "info".into(),
            parallel: false,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.ml_threshold.is_finite() || !(0.0..=1.0).contains(&self.ml_threshold) {
            bail!("ml_threshold must lie in [0, 1], got {}", self.ml_threshold);
        }
        if self.feedback_file.trim().is_empty() { bail!("feedback_file must not be empty"); }
        Ok(())
    }
}

/// Layer defaults, the optional YAML file named by `HIDS_CONFIG_FILE` and
/// `HIDS__*` environment overrides.
pub fn load_config(service: &str) -> Result<DetectionConfig> {
    load_config_from(service, config_file_from_env().as_deref())
}

pub fn load_config_from(service: &str, file: Option<&Path>) -> Result<DetectionConfig> {
    let defaults = DetectionConfig::default();
    let mut builder = config::Config::builder()
        .set_default("service_name", service)?
        .set_default("ml_threshold", defaults.ml_threshold)?
        .set_default("top_n", defaults.top_n as i64)?
        .set_default("feedback_file", defaults.feedback_file.as_str())?
        .set_default("log_level", defaults.log_level.as_str())?
        .set_default("parallel", defaults.parallel)?;
    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml).required(true));
    }
    builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true));
    let cfg: DetectionConfig = builder
        .build()
        .with_context(|| format!("building config for {service}"))?
        .try_deserialize()
        .context("deserializing detection config")?;
    cfg.validate()?;
    Ok(cfg)
}

fn config_file_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from)
}

/// Load config, then install tracing at its `log_level`. The load is only
/// logged once the subscriber exists.
pub fn bootstrap(service: &str) -> Result<DetectionConfig> {
    bootstrap_from(service, config_file_from_env().as_deref())
}

pub fn bootstrap_from(service: &str, file: Option<&Path>) -> Result<DetectionConfig> {
    let cfg = load_config_from(service, file)?;
    init_tracing(&cfg.service_name, &cfg.log_level)?;
    info!(target: "ids_core", service, file = ?file, threshold = cfg.ml_threshold, top_n = cfg.top_n, "config loaded");
    Ok(cfg)
}
