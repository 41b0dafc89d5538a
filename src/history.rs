//! Run history: capped per-job log of outcomes for status reporting.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::JobStatus;

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub job_id: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub outcome: JobStatus,
    pub summary: String,
}

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<HashMap<String, Vec<RunRecord>>>,
    cap: usize,
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            cap: cap.clamp(1, 10_000),
        }
    }

    pub fn push(&self, record: RunRecord) {
        let mut map = self.inner.lock().expect("history mutex poisoned");
        let v = map.entry(record.job_id.clone()).or_default();
        v.push(record);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    /// Most recent outcome for a job, if it has ever run.
    pub fn last(&self, job_id: &str) -> Option<RunRecord> {
        let map = self.inner.lock().expect("history mutex poisoned");
        map.get(job_id).and_then(|v| v.last().cloned())
    }

    pub fn snapshot_last_n(&self, job_id: &str, n: usize) -> Vec<RunRecord> {
        let map = self.inner.lock().expect("history mutex poisoned");
        match map.get(job_id) {
            Some(v) => {
                let start = v.len().saturating_sub(n);
                v[start..].to_vec()
            }
            None => Vec::new(),
        }
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::with_capacity(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(job: &str, minute: u32, outcome: JobStatus) -> RunRecord {
        let t = Utc.with_ymd_and_hms(2026, 3, 2, 0, minute, 0).unwrap();
        RunRecord {
            job_id: job.to_string(),
            started: t,
            finished: t,
            outcome,
            summary: format!("run at minute {minute}"),
        }
    }

    #[test]
    fn last_and_window() {
        let h = RunHistory::with_capacity(10);
        h.push(rec("a", 1, JobStatus::Succeeded));
        h.push(rec("a", 2, JobStatus::Failed));
        h.push(rec("b", 3, JobStatus::Succeeded));

        assert_eq!(h.last("a").unwrap().outcome, JobStatus::Failed);
        assert_eq!(h.snapshot_last_n("a", 5).len(), 2);
        assert_eq!(h.snapshot_last_n("b", 1).len(), 1);
        assert!(h.last("c").is_none());
    }

    #[test]
    fn cap_drops_oldest() {
        let h = RunHistory::with_capacity(2);
        for m in 0..5 {
            h.push(rec("a", m, JobStatus::Succeeded));
        }
        let recent = h.snapshot_last_n("a", 10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].summary, "run at minute 3");
    }
}
