//! Alert model: a closed set of alert kinds with a fixed payload shape,
//! plus the per-channel delivery record the dispatcher fills in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every alert the system can emit. Adding a kind is a code change on
/// purpose: dispatch formatting and tests cover the set exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    SentimentSpikePositive,
    SentimentSpikeNegative,
    TrendShiftUp,
    TrendShiftDown,
    DataIngestionSuccess,
    DataIngestionFailure,
    PipelineError,
    IncompleteData,
}

impl AlertKind {
    /// Fixed human titles, used as email subjects and webhook headlines.
    pub fn title(&self) -> &'static str {
        match self {
            AlertKind::SentimentSpikePositive => "Positive Sentiment Spike Detected",
            AlertKind::SentimentSpikeNegative => "Negative Sentiment Spike Detected",
            AlertKind::TrendShiftUp => "Trending Up - Category Demand Increase",
            AlertKind::TrendShiftDown => "Trending Down - Category Demand Decrease",
            AlertKind::DataIngestionSuccess => "Data Successfully Fetched",
            AlertKind::DataIngestionFailure => "Data Fetch Failed",
            AlertKind::PipelineError => "Pipeline Processing Error",
            AlertKind::IncompleteData => "Incomplete Data Warning",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::DataIngestionFailure | AlertKind::PipelineError => Severity::Critical,
            AlertKind::IncompleteData
            | AlertKind::SentimentSpikeNegative
            | AlertKind::TrendShiftDown => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::SentimentSpikePositive => "SENTIMENT_SPIKE_POSITIVE",
            AlertKind::SentimentSpikeNegative => "SENTIMENT_SPIKE_NEGATIVE",
            AlertKind::TrendShiftUp => "TREND_SHIFT_UP",
            AlertKind::TrendShiftDown => "TREND_SHIFT_DOWN",
            AlertKind::DataIngestionSuccess => "DATA_INGESTION_SUCCESS",
            AlertKind::DataIngestionFailure => "DATA_INGESTION_FAILURE",
            AlertKind::PipelineError => "PIPELINE_ERROR",
            AlertKind::IncompleteData => "INCOMPLETE_DATA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One alert, ready for dispatch. `category` is empty for run-level alerts
/// (ingestion, pipeline errors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub category: String,
    pub message: String,
    pub severity: Severity,
    pub ts: DateTime<Utc>,
}

impl Alert {
    pub fn new(kind: AlertKind, category: impl Into<String>, message: String, ts: DateTime<Utc>) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            category: category.into(),
            message,
            ts,
        }
    }

    pub fn sentiment_spike(
        category: &str,
        old_ratio: f64,
        new_ratio: f64,
        ts: DateTime<Utc>,
    ) -> Self {
        let delta = new_ratio - old_ratio;
        let kind = if delta > 0.0 {
            AlertKind::SentimentSpikePositive
        } else {
            AlertKind::SentimentSpikeNegative
        };
        let message = format!(
            "Sentiment Spike Detected in {category}!\n\n\
             Direction: {}\n\
             Previous Sentiment Score: {:.1}%\n\
             Current Sentiment Score: {:.1}%\n\
             Change: {:+.1}%\n\n\
             This requires immediate attention from the market intelligence team.",
            if delta > 0.0 { "POSITIVE" } else { "NEGATIVE" },
            old_ratio * 100.0,
            new_ratio * 100.0,
            delta * 100.0,
        );
        Self::new(kind, category, message, ts)
    }

    pub fn trend_shift(
        category: &str,
        old_count: u64,
        new_count: u64,
        pct_change: f64,
        ts: DateTime<Utc>,
    ) -> Self {
        let kind = if pct_change > 0.0 {
            AlertKind::TrendShiftUp
        } else {
            AlertKind::TrendShiftDown
        };
        let message = format!(
            "Trend Shift Detected in {category}!\n\n\
             Direction: {}\n\
             Previous Mentions: {old_count}\n\
             Current Mentions: {new_count}\n\
             Change: {:+.1}%\n\n\
             Consumer interest is shifting. Review category strategy.",
            if pct_change > 0.0 { "UP" } else { "DOWN" },
            pct_change * 100.0,
        );
        Self::new(kind, category, message, ts)
    }

    pub fn ingestion_success(record_count: u64, ts: DateTime<Utc>) -> Self {
        let message = format!(
            "Data Successfully Fetched\n\n\
             Records Fetched: {record_count}\n\
             Status: SUCCESS\n\n\
             Data ingestion completed successfully."
        );
        Self::new(AlertKind::DataIngestionSuccess, "", message, ts)
    }

    pub fn ingestion_failure(categories: &[String], ts: DateTime<Utc>) -> Self {
        let message = format!(
            "Data Fetch Failed!\n\n\
             Status: FAILED\n\
             Unavailable categories: {}\n\n\
             Please check data source connection and credentials.",
            categories.join(", "),
        );
        Self::new(AlertKind::DataIngestionFailure, "", message, ts)
    }

    pub fn incomplete_data(categories: &[String], min_sample_size: u64, ts: DateTime<Utc>) -> Self {
        let message = format!(
            "Incomplete Data Warning\n\n\
             Categories below the minimum sample size ({min_sample_size}): {}\n\n\
             Classification was skipped for these categories this run.",
            categories.join(", "),
        );
        Self::new(AlertKind::IncompleteData, "", message, ts)
    }

    pub fn pipeline_error(pipeline_name: &str, error: &str, ts: DateTime<Utc>) -> Self {
        let message = format!(
            "Pipeline Processing Error!\n\n\
             Pipeline: {pipeline_name}\n\
             Error: {error}\n\n\
             Immediate technical investigation required.",
        );
        Self::new(AlertKind::PipelineError, "", message, ts)
    }
}

/// Outcome of one channel's delivery attempt(s) for one alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelResult {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
    pub attempts: u32,
    pub ts: DateTime<Utc>,
}

/// Aggregate delivery outcome across all configured channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub alert: Alert,
    pub results: Vec<ChannelResult>,
}

impl DeliveryRecord {
    /// At least one channel got it through.
    pub fn delivered(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }
}
