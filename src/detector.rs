//! Anomaly detection: compares a current window against a baseline window
//! per category and classifies deviations. Pure logic, no I/O, so the
//! thresholds are trivially testable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::Alert;
use crate::snapshot::MetricSnapshot;

/// Guard for ratio denominators when a baseline is exactly zero.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Absolute change in positive ratio that counts as a spike.
    pub sentiment_threshold: f64,
    /// Relative change in mention count that counts as a trend shift.
    pub trend_threshold: f64,
    /// Windows with fewer records than this are not classified.
    pub min_sample_size: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sentiment_threshold: 0.15,
            trend_threshold: 0.20,
            min_sample_size: 10,
        }
    }
}

/// One (category, metric) comparison, kept for run summaries and audits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub category: String,
    pub metric: &'static str,
    pub baseline: f64,
    pub current: f64,
    pub percent_change: f64,
}

/// Result of evaluating one category.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub comparisons: Vec<Comparison>,
    pub alerts: Vec<Alert>,
    /// True when either window was below `min_sample_size` and
    /// classification was suppressed entirely.
    pub thin_sample: bool,
}

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    cfg: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }

    /// Classify one category. Sentiment and trend alerts are independent;
    /// both may fire for the same category in the same run.
    pub fn evaluate(
        &self,
        current: &MetricSnapshot,
        baseline: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> Detection {
        let mut out = Detection::default();

        if current.sample_size < self.cfg.min_sample_size
            || baseline.sample_size < self.cfg.min_sample_size
        {
            tracing::debug!(
                target: "detector",
                category = %current.category,
                current_n = current.sample_size,
                baseline_n = baseline.sample_size,
                "sample below minimum, skipping classification"
            );
            out.thin_sample = true;
            return out;
        }

        // Sentiment spike: absolute shift in positive ratio.
        let delta_positive = current.positive_ratio - baseline.positive_ratio;
        out.comparisons.push(Comparison {
            category: current.category.clone(),
            metric: "positive_ratio",
            baseline: baseline.positive_ratio,
            current: current.positive_ratio,
            percent_change: percent_change(baseline.positive_ratio, current.positive_ratio),
        });
        if delta_positive.abs() >= self.cfg.sentiment_threshold {
            out.alerts.push(Alert::sentiment_spike(
                &current.category,
                baseline.positive_ratio,
                current.positive_ratio,
                now,
            ));
        }

        // Trend shift: relative change in mention volume.
        let mention_change = (current.mention_count as f64 - baseline.mention_count as f64)
            / (baseline.mention_count.max(1) as f64);
        out.comparisons.push(Comparison {
            category: current.category.clone(),
            metric: "mention_count",
            baseline: baseline.mention_count as f64,
            current: current.mention_count as f64,
            percent_change: mention_change * 100.0,
        });
        if mention_change.abs() >= self.cfg.trend_threshold {
            out.alerts.push(Alert::trend_shift(
                &current.category,
                baseline.mention_count,
                current.mention_count,
                mention_change,
                now,
            ));
        }

        out
    }
}

/// Relative change in percent with a guarded denominator.
fn percent_change(baseline: f64, current: f64) -> f64 {
    (current - baseline) / baseline.abs().max(EPSILON) * 100.0
}
