//! Job registry: owns job definitions, computes due times, and enforces
//! single-flight per job id. Mutated only through the runner (single
//! writer); status queries observe a consistent snapshot under the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::{ConfigurationError, RunnerError};
use crate::schedule::ScheduleSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Scheduled,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// What a job actually does when it fires. Implemented by the monitoring
/// pipeline; hosts can register their own handlers too.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self) -> anyhow::Result<RunSummary>;
}

/// Short outcome summary recorded per run and returned to manual callers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub categories_checked: u32,
    pub categories_unavailable: Vec<String>,
    pub categories_thin: Vec<String>,
    pub alerts_emitted: u32,
    pub alerts_delivered: u32,
    pub alerts_undelivered: u32,
    pub notes: Vec<String>,
}

impl RunSummary {
    pub fn brief(&self) -> String {
        format!(
            "checked={} unavailable={} thin={} alerts={} delivered={} undelivered={}",
            self.categories_checked,
            self.categories_unavailable.len(),
            self.categories_thin.len(),
            self.alerts_emitted,
            self.alerts_delivered,
            self.alerts_undelivered,
        )
    }
}

#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
    pub id: String,
    pub status: JobStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

struct Job {
    spec: ScheduleSpec,
    handler: Arc<dyn JobHandler>,
    status: JobStatus,
    next_run_time: Option<DateTime<Utc>>,
    last_run_time: Option<DateTime<Utc>>,
}

/// A job selected for execution this tick.
pub struct DueJob {
    pub id: String,
    pub handler: Arc<dyn JobHandler>,
}

pub struct JobRegistry {
    clock: Arc<dyn Clock>,
    jobs: Mutex<HashMap<String, Job>>,
}

impl JobRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Register a job. Fails on a malformed spec or a duplicate id; a
    /// rejected job is never activated.
    pub fn register(
        &self,
        id: &str,
        spec: ScheduleSpec,
        handler: Arc<dyn JobHandler>,
    ) -> Result<JobHandle, ConfigurationError> {
        spec.validate()?;
        if id.trim().is_empty() {
            return Err(ConfigurationError("job id must not be empty".into()));
        }
        let now = self.clock.now();
        let mut jobs = self.jobs.lock().expect("registry mutex poisoned");
        if jobs.contains_key(id) {
            return Err(ConfigurationError(format!("duplicate job id: {id:?}")));
        }
        let next = spec.next_after(now);
        jobs.insert(
            id.to_string(),
            Job {
                spec,
                handler,
                status: JobStatus::Scheduled,
                next_run_time: Some(next),
                last_run_time: None,
            },
        );
        tracing::info!(target: "registry", job = id, next_run = %next, "job registered");
        Ok(JobHandle { id: id.to_string() })
    }

    /// Re-apply persisted last-run times after a restart. A job whose next
    /// occurrence after its recorded run is already in the past comes due
    /// immediately on the first poll; one catch-up run, never a burst.
    pub fn restore(&self, state: &crate::state::SchedulerState) {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock().expect("registry mutex poisoned");
        for (id, job) in jobs.iter_mut() {
            let Some(&last_run) = state.last_runs.get(id) else {
                continue;
            };
            job.last_run_time = Some(last_run);
            let occurrence = job.spec.next_after(last_run);
            if occurrence <= now {
                job.next_run_time = Some(occurrence);
                tracing::info!(
                    target: "registry",
                    job = %id,
                    missed = %occurrence,
                    "missed occurrence detected, due immediately"
                );
            }
        }
    }

    /// Every job whose `next_run_time <= now` and which is not currently
    /// running. `next_run_time` advances here, before execution starts, so
    /// a slow handler never comes due twice.
    pub fn due_jobs(&self, now: DateTime<Utc>) -> Vec<DueJob> {
        let mut jobs = self.jobs.lock().expect("registry mutex poisoned");
        let mut due = Vec::new();
        for (id, job) in jobs.iter_mut() {
            let is_due = matches!(job.next_run_time, Some(t) if t <= now);
            if is_due && job.status != JobStatus::Running {
                job.next_run_time = Some(job.spec.next_after(now));
                due.push(DueJob {
                    id: id.clone(),
                    handler: Arc::clone(&job.handler),
                });
            }
        }
        due
    }

    /// Atomically move a job to `Running`. The single-flight gate: a second
    /// caller gets `AlreadyRunning` while the first holds the slot.
    pub fn begin_run(&self, id: &str, now: DateTime<Utc>) -> Result<(), RunnerError> {
        let mut jobs = self.jobs.lock().expect("registry mutex poisoned");
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RunnerError::UnknownJob(id.to_string()))?;
        if job.status == JobStatus::Running {
            return Err(RunnerError::AlreadyRunning(id.to_string()));
        }
        job.status = JobStatus::Running;
        job.last_run_time = Some(now);
        Ok(())
    }

    /// Release the running slot with a final status. Safe to call for
    /// cancellation: the slot is force-released regardless of outcome.
    pub fn finish_run(&self, id: &str, status: JobStatus) {
        let mut jobs = self.jobs.lock().expect("registry mutex poisoned");
        if let Some(job) = jobs.get_mut(id) {
            job.status = status;
        }
    }

    pub fn handler(&self, id: &str) -> Result<Arc<dyn JobHandler>, RunnerError> {
        let jobs = self.jobs.lock().expect("registry mutex poisoned");
        jobs.get(id)
            .map(|j| Arc::clone(&j.handler))
            .ok_or_else(|| RunnerError::UnknownJob(id.to_string()))
    }

    pub fn status(&self, id: &str) -> Result<JobStatusReport, RunnerError> {
        let jobs = self.jobs.lock().expect("registry mutex poisoned");
        jobs.get(id)
            .map(|j| JobStatusReport {
                id: id.to_string(),
                status: j.status,
                last_run: j.last_run_time,
                next_run: j.next_run_time,
            })
            .ok_or_else(|| RunnerError::UnknownJob(id.to_string()))
    }

    pub fn job_ids(&self) -> Vec<String> {
        let jobs = self.jobs.lock().expect("registry mutex poisoned");
        jobs.keys().cloned().collect()
    }
}
