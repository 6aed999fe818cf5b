//! TOML configuration for breakscope.
//!
//! Layered the usual way: an explicit `--config` path (or the
//! `BREAKSCOPE_CONFIG` environment variable), then `./breakscope.toml`,
//! then compiled-in defaults. Every section and field is optional.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Config file picked up from the working directory when no path is given.
pub const LOCAL_CONFIG_FILE: &str = "breakscope.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the breakscope process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path must load; it is an error if it does not. Without
    /// one, `./breakscope.toml` is used when present, otherwise defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let local = Path::new(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Render the configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize configuration")
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP listener and result-store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP listener.
    pub bind: String,
    /// Largest accepted upload body, in bytes.
    pub max_upload_bytes: usize,
    /// Allow cross-origin requests from any origin (browser front-end).
    pub cors_allow_any_origin: bool,
    /// Number of session result sets kept before the oldest is evicted.
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            cors_allow_any_origin: true,
            max_sessions: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Feature engineering
// ---------------------------------------------------------------------------

/// What to do with rows whose lag/rolling history is incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// Treat missing statistics as zero and keep every row.
    FillZero,
    /// Drop rows lacking a full window before anything is filled.
    DropInsufficient,
}

/// What to do when the training partition holds one class only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleClassPolicy {
    /// Predict the only class present for every row.
    Majority,
    /// Fail the submission with `InsufficientLabelDiversity`.
    Fail,
}

/// Rolling-window and labeling rule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Trailing window size (current observation included).
    pub window: usize,
    /// Deviation multiplier `k` in `|x - mean| > k * std`.
    pub deviation_multiplier: f64,
    pub history_policy: HistoryPolicy,
    pub single_class: SingleClassPolicy,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window: 3,
            deviation_multiplier: 2.0,
            history_policy: HistoryPolicy::FillZero,
            single_class: SingleClassPolicy::Majority,
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Gradient-boosted tree hyperparameters and split settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of boosting rounds.
    pub n_estimators: usize,
    pub max_depth: usize,
    /// Shrinkage applied to every leaf weight.
    pub learning_rate: f64,
    /// L2 regularisation on leaf weights.
    pub lambda: f64,
    /// Minimum loss reduction required to split.
    pub gamma: f64,
    /// Minimum hessian sum per child.
    pub min_child_weight: f64,
    /// Fraction of rows held out for evaluation.
    pub test_fraction: f64,
    pub seed: u64,
    /// Probability above which a row is predicted anomalous.
    pub decision_threshold: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.3,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            test_fraction: 0.2,
            seed: 42,
            decision_threshold: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
