//! Metric snapshot contract. The source of snapshots (review aggregation,
//! warehouse query, fixture) lives outside this crate; we only consume it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataUnavailable;

/// Which time slice a snapshot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Current,
    Baseline,
}

/// Aggregated metrics for one category over one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub category: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub mention_count: u64,
    pub sample_size: u64,
}

/// External collaborator: produces fresh snapshots per detection run.
/// `DataUnavailable` skips the category for the run; it never fails the job.
#[async_trait]
pub trait MetricSnapshotSource: Send + Sync {
    async fn get_snapshot(
        &self,
        category: &str,
        window: Window,
    ) -> Result<MetricSnapshot, DataUnavailable>;
}
