//! Notification channels. One trait, one module per delivery mechanism;
//! the dispatcher treats all of them uniformly.

pub mod email;
pub mod webhook;

use async_trait::async_trait;

use crate::alert::Alert;
use crate::error::ChannelError;

/// A single delivery mechanism. Stateless from the dispatcher's point of
/// view; retries and aggregation happen above this trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable identifier used in `ChannelResult` and logs.
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError>;
}

pub use email::EmailChannel;
pub use webhook::WebhookChannel;
