//! Durable scheduler state: last completed run per job, persisted as JSON
//! so a restart neither skips a missed occurrence nor replays a finished
//! one. Persistence failures are logged and tolerated; the scheduler keeps
//! working from memory.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerState {
    pub last_runs: HashMap<String, DateTime<Utc>>,
}

pub struct StateStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Missing or corrupt state reads as empty; a fresh deployment and a
    /// damaged file behave the same way.
    pub async fn load(&self) -> SchedulerState {
        match fs::read_to_string(&self.path).await {
            Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
            Err(_) => SchedulerState::default(),
        }
    }

    pub async fn record(&self, job_id: &str, last_run: DateTime<Utc>) {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await;
        state.last_runs.insert(job_id.to_string(), last_run);
        if let Some(dir) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(dir).await {
                tracing::warn!(target: "runner", "state dir: {e:#}");
            }
        }
        let bytes = serde_json::to_vec_pretty(&state).unwrap_or_default();
        if let Err(e) = fs::write(&self.path, bytes).await {
            tracing::warn!(target: "runner", "write state: {e:#}");
        }
    }
}
