//! SMTP channel via lettre. Credentials come from the environment
//! (SMTP_USER / SMTP_PASS); endpoint and recipients from config.

use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::AsyncSmtpTransport;
use lettre::{AsyncTransport, Tokio1Executor};

use super::Channel;
use crate::alert::Alert;
use crate::config::EmailConfig;
use crate::error::{ChannelError, ConfigurationError};

pub struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailChannel {
    /// Build from config + env credentials. A bad address or missing
    /// credential deactivates the channel at startup rather than failing
    /// at send time.
    pub fn new(cfg: &EmailConfig) -> Result<Self, ConfigurationError> {
        let user = std::env::var("SMTP_USER")
            .map_err(|_| ConfigurationError("SMTP_USER missing".into()))?;
        let pass = std::env::var("SMTP_PASS")
            .map_err(|_| ConfigurationError("SMTP_PASS missing".into()))?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
            .map_err(|e| ConfigurationError(format!("invalid smtp_host: {e}")))?
            .port(cfg.smtp_port)
            .credentials(Credentials::new(user, pass))
            .build();

        let from: Mailbox = cfg
            .from
            .parse()
            .map_err(|_| ConfigurationError(format!("invalid from address: {:?}", cfg.from)))?;
        if cfg.recipients.is_empty() {
            return Err(ConfigurationError("no email recipients configured".into()));
        }
        let to = cfg
            .recipients
            .iter()
            .map(|r| {
                r.parse()
                    .map_err(|_| ConfigurationError(format!("invalid recipient: {r:?}")))
            })
            .collect::<Result<Vec<Mailbox>, _>>()?;

        Ok(Self { mailer, from, to })
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let subject = format!("[{}] {}", alert.kind.as_str(), alert.kind.title());
        let body = format!(
            "{}\n\n---\nAlert Type: {}\nSeverity: {:?}\nTimestamp: {}\n",
            alert.message,
            alert.kind.as_str(),
            alert.severity,
            alert.ts.to_rfc3339(),
        );

        let mut builder = Message::builder().from(self.from.clone());
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        let msg = builder
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| ChannelError::Permanent(format!("build email: {e}")))?;

        self.mailer.send(msg).await.map_err(|e| {
            // Auth rejections won't heal on retry; connection trouble might.
            if e.is_permanent() {
                ChannelError::Permanent(format!("smtp rejected: {e}"))
            } else {
                ChannelError::Transient(format!("smtp send: {e}"))
            }
        })?;
        Ok(())
    }
}
