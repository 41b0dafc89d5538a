//! Monitor configuration: thresholds, retry policy, runner timing, and
//! channel settings. Loaded from TOML with an env-var path override and
//! built-in defaults; secrets come from the environment, never the file.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::detector::DetectorConfig;

const ENV_PATH: &str = "MONITOR_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/monitor.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    pub detector: DetectorConfig,
    pub dispatch: DispatchConfig,
    pub runner: RunnerConfig,
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Max send attempts per channel on transient failure.
    pub retry_attempts: u32,
    /// First backoff delay; doubles per attempt (1s, 2s, 4s by default).
    pub backoff_base_ms: u64,
    /// Per-attempt send timeout.
    pub send_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            backoff_base_ms: 1_000,
            send_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Poll-loop tick.
    pub tick_secs: u64,
    /// Bounded timeout for one handler execution.
    pub handler_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs before marking them
    /// `Cancelled`.
    pub shutdown_grace_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 5,
            handler_timeout_secs: 300,
            shutdown_grace_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChannelsConfig {
    pub email: EmailConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from: String,
    pub recipients: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            from: String::new(),
            recipients: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    /// Falls back to $WEBHOOK_URL when empty.
    pub url: String,
    pub bot_name: String,
    pub bot_emoji: String,
}

impl MonitorConfig {
    /// Load from an explicit TOML path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading monitor config from {}", path.display()))?;
        let cfg: MonitorConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using the usual fallback chain:
    /// 1) $MONITOR_CONFIG_PATH
    /// 2) config/monitor.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::from_path(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::from_path(&default);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.detector.sentiment_threshold <= 0.0 || self.detector.trend_threshold <= 0.0 {
            return Err(anyhow!("detector thresholds must be positive"));
        }
        if self.dispatch.retry_attempts == 0 {
            return Err(anyhow!("dispatch.retry_attempts must be at least 1"));
        }
        if self.runner.tick_secs == 0 {
            return Err(anyhow!("runner.tick_secs must be greater than zero"));
        }
        if self.channels.email.enabled && self.channels.email.recipients.is_empty() {
            return Err(anyhow!("email channel enabled but no recipients configured"));
        }
        Ok(())
    }
}
