//! The monitoring job: fetch snapshots per category, classify deviations,
//! dispatch alerts, and summarize the run. This is the handler the weekly
//! schedule fires; hosts can also trigger it manually.

use std::sync::Arc;

use async_trait::async_trait;

use crate::alert::Alert;
use crate::clock::Clock;
use crate::detector::AnomalyDetector;
use crate::dispatch::AlertDispatcher;
use crate::registry::{JobHandler, RunSummary};
use crate::snapshot::{MetricSnapshotSource, Window};

pub struct MonitorJob {
    source: Arc<dyn MetricSnapshotSource>,
    detector: AnomalyDetector,
    dispatcher: AlertDispatcher,
    categories: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl MonitorJob {
    pub fn new(
        source: Arc<dyn MetricSnapshotSource>,
        detector: AnomalyDetector,
        dispatcher: AlertDispatcher,
        categories: Vec<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            detector,
            dispatcher,
            categories,
            clock,
        }
    }

    async fn dispatch_and_tally(&self, alert: Alert, summary: &mut RunSummary) {
        summary.alerts_emitted += 1;
        let record = self.dispatcher.dispatch(alert).await;
        if record.delivered() {
            summary.alerts_delivered += 1;
        } else {
            summary.alerts_undelivered += 1;
        }
    }
}

#[async_trait]
impl JobHandler for MonitorJob {
    async fn run(&self) -> anyhow::Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut classification_alerts = Vec::new();
        let mut records_fetched: u64 = 0;

        for category in &self.categories {
            let current = match self.source.get_snapshot(category, Window::Current).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(target: "monitor", category = %category, error = %e, "current window unavailable");
                    summary.categories_unavailable.push(category.clone());
                    continue;
                }
            };
            let baseline = match self.source.get_snapshot(category, Window::Baseline).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(target: "monitor", category = %category, error = %e, "baseline window unavailable");
                    summary.categories_unavailable.push(category.clone());
                    continue;
                }
            };
            records_fetched += current.sample_size;

            let detection = self.detector.evaluate(&current, &baseline, self.clock.now());
            if detection.thin_sample {
                summary.categories_thin.push(category.clone());
                continue;
            }
            summary.categories_checked += 1;
            classification_alerts.extend(detection.alerts);
        }

        // Run-level data alerts, then the per-category classifications.
        let now = self.clock.now();
        if summary.categories_unavailable.is_empty() {
            self.dispatch_and_tally(Alert::ingestion_success(records_fetched, now), &mut summary)
                .await;
        } else {
            let unavailable = summary.categories_unavailable.clone();
            self.dispatch_and_tally(Alert::ingestion_failure(&unavailable, now), &mut summary)
                .await;
        }
        if !summary.categories_thin.is_empty() {
            let thin = summary.categories_thin.clone();
            self.dispatch_and_tally(
                Alert::incomplete_data(&thin, self.detector.config().min_sample_size, now),
                &mut summary,
            )
            .await;
        }
        for alert in classification_alerts {
            self.dispatch_and_tally(alert, &mut summary).await;
        }

        tracing::info!(target: "monitor", summary = %summary.brief(), "monitoring run complete");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertKind;
    use crate::clock::ManualClock;
    use crate::config::DispatchConfig;
    use crate::detector::DetectorConfig;
    use crate::error::{ChannelError, DataUnavailable};
    use crate::notify::Channel;
    use crate::snapshot::MetricSnapshot;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap()
    }

    struct FixtureSource {
        snaps: HashMap<(String, Window), MetricSnapshot>,
    }

    impl FixtureSource {
        fn new() -> Self {
            Self {
                snaps: HashMap::new(),
            }
        }

        fn with(mut self, category: &str, window: Window, positive: f64, mentions: u64, sample: u64) -> Self {
            self.snaps.insert(
                (category.to_string(), window),
                MetricSnapshot {
                    category: category.to_string(),
                    window_start: ts() - chrono::Duration::days(7),
                    window_end: ts(),
                    positive_ratio: positive,
                    negative_ratio: 1.0 - positive,
                    mention_count: mentions,
                    sample_size: sample,
                },
            );
            self
        }
    }

    #[async_trait]
    impl MetricSnapshotSource for FixtureSource {
        async fn get_snapshot(
            &self,
            category: &str,
            window: Window,
        ) -> Result<MetricSnapshot, DataUnavailable> {
            self.snaps
                .get(&(category.to_string(), window))
                .cloned()
                .ok_or_else(|| DataUnavailable {
                    category: category.to_string(),
                    reason: "no fixture".into(),
                })
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<AlertKind>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(alert.kind);
            Ok(())
        }
    }

    fn job(source: FixtureSource, categories: &[&str], channel: Arc<RecordingChannel>) -> MonitorJob {
        let clock = Arc::new(ManualClock::new(ts()));
        MonitorJob::new(
            Arc::new(source),
            AnomalyDetector::new(DetectorConfig::default()),
            AlertDispatcher::new(
                vec![channel],
                DispatchConfig {
                    backoff_base_ms: 1,
                    send_timeout_secs: 1,
                    ..Default::default()
                },
            ),
            categories.iter().map(|s| s.to_string()).collect(),
            clock,
        )
    }

    #[tokio::test]
    async fn quiet_run_emits_only_ingestion_success() {
        let source = FixtureSource::new()
            .with("Electronics", Window::Current, 0.55, 100, 40)
            .with("Electronics", Window::Baseline, 0.50, 95, 40);
        let channel = Arc::new(RecordingChannel::default());
        let summary = job(source, &["Electronics"], channel.clone()).run().await.unwrap();

        assert_eq!(summary.categories_checked, 1);
        assert_eq!(summary.alerts_emitted, 1);
        assert_eq!(summary.alerts_delivered, 1);
        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![AlertKind::DataIngestionSuccess]);
    }

    #[tokio::test]
    async fn spike_and_trend_alerts_flow_through() {
        let source = FixtureSource::new()
            .with("Gaming", Window::Current, 0.68, 300, 45)
            .with("Gaming", Window::Baseline, 0.50, 200, 40);
        let channel = Arc::new(RecordingChannel::default());
        let summary = job(source, &["Gaming"], channel.clone()).run().await.unwrap();

        assert_eq!(summary.alerts_emitted, 3);
        let sent = channel.sent.lock().unwrap().clone();
        assert!(sent.contains(&AlertKind::SentimentSpikePositive));
        assert!(sent.contains(&AlertKind::TrendShiftUp));
        assert!(sent.contains(&AlertKind::DataIngestionSuccess));
    }

    #[tokio::test]
    async fn unavailable_category_skipped_not_fatal() {
        let source = FixtureSource::new()
            .with("Electronics", Window::Current, 0.55, 100, 40)
            .with("Electronics", Window::Baseline, 0.50, 95, 40);
        // "Phantom" has no fixtures at all.
        let channel = Arc::new(RecordingChannel::default());
        let summary = job(source, &["Electronics", "Phantom"], channel.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.categories_checked, 1);
        assert_eq!(summary.categories_unavailable, vec!["Phantom".to_string()]);
        let sent = channel.sent.lock().unwrap().clone();
        assert!(sent.contains(&AlertKind::DataIngestionFailure));
        assert!(!sent.contains(&AlertKind::DataIngestionSuccess));
    }

    #[tokio::test]
    async fn thin_sample_reports_incomplete_data_only() {
        let source = FixtureSource::new()
            .with("Niche", Window::Current, 0.90, 500, 5)
            .with("Niche", Window::Baseline, 0.10, 50, 40);
        let channel = Arc::new(RecordingChannel::default());
        let summary = job(source, &["Niche"], channel.clone()).run().await.unwrap();

        assert_eq!(summary.categories_checked, 0);
        assert_eq!(summary.categories_thin, vec!["Niche".to_string()]);
        let sent = channel.sent.lock().unwrap().clone();
        // Huge swing, but no classification alert below the sample floor.
        assert!(!sent.contains(&AlertKind::SentimentSpikePositive));
        assert!(sent.contains(&AlertKind::IncompleteData));
    }
}
