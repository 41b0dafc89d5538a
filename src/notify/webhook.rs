//! Webhook channel: posts a Slack-compatible JSON payload to a configured
//! URL. Any chat service that accepts incoming webhooks works.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::Channel;
use crate::alert::{Alert, Severity};
use crate::config::WebhookConfig;
use crate::error::{ChannelError, ConfigurationError};

pub struct WebhookChannel {
    url: String,
    bot_name: String,
    bot_emoji: String,
    client: Client,
}

#[derive(Serialize)]
struct WebhookPayload {
    text: String,
    username: String,
    icon_emoji: String,
    attachments: Vec<WebhookAttachment>,
}

#[derive(Serialize)]
struct WebhookAttachment {
    color: &'static str,
    text: String,
    footer: &'static str,
    ts: i64,
}

impl WebhookChannel {
    /// Config URL wins; $WEBHOOK_URL is the fallback. No URL at all means
    /// the channel cannot be activated.
    pub fn new(cfg: &WebhookConfig) -> Result<Self, ConfigurationError> {
        let url = if !cfg.url.is_empty() {
            cfg.url.clone()
        } else {
            std::env::var("WEBHOOK_URL")
                .map_err(|_| ConfigurationError("webhook url missing (config or $WEBHOOK_URL)".into()))?
        };
        Ok(Self {
            url,
            bot_name: if cfg.bot_name.is_empty() {
                "MarketIntelligenceBot".to_string()
            } else {
                cfg.bot_name.clone()
            },
            bot_emoji: if cfg.bot_emoji.is_empty() {
                ":chart_with_upwards_trend:".to_string()
            } else {
                cfg.bot_emoji.clone()
            },
            client: Client::new(),
        })
    }

    #[cfg(test)]
    pub fn with_url(url: String) -> Self {
        Self {
            url,
            bot_name: "MarketIntelligenceBot".to_string(),
            bot_emoji: ":chart_with_upwards_trend:".to_string(),
            client: Client::new(),
        }
    }

    fn payload(&self, alert: &Alert) -> WebhookPayload {
        let color = match alert.severity {
            Severity::Critical => "danger",
            Severity::Warning => "warning",
            Severity::Info => "good",
        };
        WebhookPayload {
            text: format!("*{}*", alert.kind.title()),
            username: self.bot_name.clone(),
            icon_emoji: self.bot_emoji.clone(),
            attachments: vec![WebhookAttachment {
                color,
                text: alert.message.clone(),
                footer: "Market Intelligence System",
                ts: alert.ts.timestamp(),
            }],
        }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let rsp = self
            .client
            .post(&self.url)
            .json(&self.payload(alert))
            .send()
            .await
            .map_err(|e| ChannelError::Transient(format!("webhook post: {e}")))?;

        let status = rsp.status();
        if status.is_success() {
            return Ok(());
        }
        // 4xx means the request itself is wrong (bad URL, revoked token);
        // retrying the same payload cannot succeed.
        if status.is_client_error() {
            Err(ChannelError::Permanent(format!("webhook rejected: {status}")))
        } else {
            Err(ChannelError::Transient(format!("webhook non-2xx: {status}")))
        }
    }
}
