// src/lib.rs
// Scheduled sentiment/trend monitoring with threshold alerts.
// Library-first: any host (dashboard, CLI, service) embeds the runner and
// wires its own snapshot source and exporter.

pub mod alert;
pub mod clock;
pub mod config;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod metrics;
pub mod monitor;
pub mod registry;
pub mod runner;
pub mod schedule;
pub mod snapshot;
pub mod state;

// Notification channels
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::alert::{Alert, AlertKind, ChannelResult, DeliveryRecord, Severity};
pub use crate::clock::{Clock, SystemClock};
pub use crate::config::MonitorConfig;
pub use crate::detector::{AnomalyDetector, Comparison, DetectorConfig};
pub use crate::dispatch::AlertDispatcher;
pub use crate::error::{ChannelError, ConfigurationError, DataUnavailable, RunnerError};
pub use crate::history::{RunHistory, RunRecord};
pub use crate::monitor::MonitorJob;
pub use crate::notify::{Channel, EmailChannel, WebhookChannel};
pub use crate::registry::{JobHandle, JobHandler, JobRegistry, JobStatus, RunSummary};
pub use crate::runner::{RunResult, TriggerRunner};
pub use crate::schedule::ScheduleSpec;
pub use crate::snapshot::{MetricSnapshot, MetricSnapshotSource, Window};
pub use crate::state::{SchedulerState, StateStore};

use std::sync::Arc;

/// Build the enabled channel set from config. A channel with bad or missing
/// credentials is rejected here and never activated; the error names the
/// channel so operators can fix it at startup.
pub fn build_channels(
    cfg: &MonitorConfig,
) -> Result<Vec<Arc<dyn Channel>>, ConfigurationError> {
    let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
    if cfg.channels.email.enabled {
        channels.push(Arc::new(EmailChannel::new(&cfg.channels.email)?));
    }
    if cfg.channels.webhook.enabled {
        channels.push(Arc::new(WebhookChannel::new(&cfg.channels.webhook)?));
    }
    Ok(channels)
}
