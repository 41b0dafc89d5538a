//! Public error taxonomy. Callers match on these; everything internal that
//! does not cross the API boundary stays `anyhow`.

use thiserror::Error;

/// Rejected at registration/startup. The affected job or channel is never
/// activated.
#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

/// A snapshot fetch failed or produced no usable data. Non-fatal: the
/// category is skipped for the current run.
#[derive(Debug, Error)]
#[error("data unavailable for {category}: {reason}")]
pub struct DataUnavailable {
    pub category: String,
    pub reason: String,
}

/// Delivery failure for a single channel send attempt.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Network-level or timeout failure; worth retrying.
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// Rejected by the remote end (auth, bad request); retrying won't help.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl ChannelError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Transient(_))
    }
}

/// Errors surfaced by the runner's manual-trigger and status API.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("job {0} is already running")]
    AlreadyRunning(String),
    #[error("unknown job: {0}")]
    UnknownJob(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ChannelError::Transient("timeout".into()).is_transient());
        assert!(!ChannelError::Permanent("401".into()).is_transient());
    }
}
