//! Alert dispatcher: fans one alert out to every enabled channel
//! concurrently, retries transient failures with exponential backoff, and
//! aggregates per-channel results. Delivery failure never fails the job
//! that produced the alert.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio::task::JoinSet;

use crate::alert::{Alert, ChannelResult, DeliveryRecord};
use crate::config::DispatchConfig;
use crate::error::ChannelError;
use crate::notify::Channel;

#[derive(Clone)]
pub struct AlertDispatcher {
    channels: Vec<Arc<dyn Channel>>,
    cfg: DispatchConfig,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Arc<dyn Channel>>, cfg: DispatchConfig) -> Self {
        Self { channels, cfg }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver one alert to all channels, joining every send (success or
    /// exhausted retries) before returning the aggregate record.
    pub async fn dispatch(&self, alert: Alert) -> DeliveryRecord {
        crate::metrics::ensure_described();
        counter!("alerts_emitted_total", "kind" => alert.kind.as_str()).increment(1);

        let mut set = JoinSet::new();
        for ch in &self.channels {
            let ch = Arc::clone(ch);
            let alert = alert.clone();
            let cfg = self.cfg;
            set.spawn(async move { send_with_retry(ch.as_ref(), &alert, &cfg).await });
        }

        let mut results = Vec::with_capacity(self.channels.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(res) => results.push(res),
                Err(e) => {
                    // A panicking adapter counts as a failed channel, not a
                    // failed dispatch.
                    tracing::error!(target: "dispatch", error = %e, "channel task panicked");
                }
            }
        }

        let record = DeliveryRecord { alert, results };
        if record.delivered() {
            tracing::info!(
                target: "dispatch",
                kind = record.alert.kind.as_str(),
                category = %record.alert.category,
                channels_ok = record.results.iter().filter(|r| r.success).count(),
                channels_failed = record.results.iter().filter(|r| !r.success).count(),
                "alert delivered"
            );
        } else {
            counter!("alerts_undelivered_total").increment(1);
            tracing::warn!(
                target: "dispatch",
                kind = record.alert.kind.as_str(),
                category = %record.alert.category,
                "alert undelivered on all channels"
            );
        }
        record
    }
}

async fn send_with_retry(ch: &dyn Channel, alert: &Alert, cfg: &DispatchConfig) -> ChannelResult {
    let timeout = Duration::from_secs(cfg.send_timeout_secs);
    let mut attempt: u32 = 0;
    let mut last_err: Option<String> = None;

    while attempt < cfg.retry_attempts {
        attempt += 1;
        let outcome = match tokio::time::timeout(timeout, ch.send(alert)).await {
            Ok(res) => res,
            Err(_) => Err(ChannelError::Transient(format!(
                "send timed out after {}s",
                cfg.send_timeout_secs
            ))),
        };

        match outcome {
            Ok(()) => {
                return ChannelResult {
                    channel: ch.name().to_string(),
                    success: true,
                    error: None,
                    attempts: attempt,
                    ts: Utc::now(),
                };
            }
            Err(e) => {
                counter!("channel_send_failures_total", "channel" => ch.name().to_string())
                    .increment(1);
                let transient = e.is_transient();
                last_err = Some(e.to_string());
                if !transient {
                    tracing::warn!(
                        target: "dispatch",
                        channel = ch.name(),
                        error = %last_err.as_deref().unwrap_or_default(),
                        "permanent failure, not retrying"
                    );
                    break;
                }
                if attempt < cfg.retry_attempts {
                    let delay = Duration::from_millis(cfg.backoff_base_ms << (attempt - 1));
                    tracing::debug!(
                        target: "dispatch",
                        channel = ch.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    ChannelResult {
        channel: ch.name().to_string(),
        success: false,
        error: last_err,
        attempts: attempt,
        ts: Utc::now(),
    }
}
