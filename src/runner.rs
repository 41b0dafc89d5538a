//! Trigger runner: background poll loop that executes due jobs on worker
//! tasks, plus the manual-trigger surface. Owns the write side of the
//! registry and run history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use crate::alert::Alert;
use crate::clock::Clock;
use crate::config::RunnerConfig;
use crate::dispatch::AlertDispatcher;
use crate::error::RunnerError;
use crate::history::{RunHistory, RunRecord};
use crate::registry::{JobHandler, JobRegistry, JobStatus, RunSummary};
use crate::state::StateStore;

/// Structured outcome returned to manual callers. Partial failures are
/// reported in `summary`/`errors`, never silently dropped.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub job_id: String,
    pub status: JobStatus,
    pub summary: Option<RunSummary>,
    pub errors: Vec<String>,
}

struct RunningEntry {
    abort: AbortHandle,
    cancelled: Arc<AtomicBool>,
}

pub struct TriggerRunner {
    registry: Arc<JobRegistry>,
    history: Arc<RunHistory>,
    dispatcher: AlertDispatcher,
    clock: Arc<dyn Clock>,
    cfg: RunnerConfig,
    running: Mutex<HashMap<String, RunningEntry>>,
    state: Mutex<Option<Arc<StateStore>>>,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TriggerRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        history: Arc<RunHistory>,
        dispatcher: AlertDispatcher,
        clock: Arc<dyn Clock>,
        cfg: RunnerConfig,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            registry,
            history,
            dispatcher,
            clock,
            cfg,
            running: Mutex::new(HashMap::new()),
            state: Mutex::new(None),
            shutdown_tx,
            loop_handle: Mutex::new(None),
        })
    }

    /// Attach a durable state store: completed runs are recorded so a
    /// restart can recover missed occurrences via `JobRegistry::restore`.
    pub fn set_state_store(&self, store: Arc<StateStore>) {
        *self.state.lock().expect("runner mutex poisoned") = Some(store);
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn history(&self) -> &Arc<RunHistory> {
        &self.history
    }

    /// Spawn the poll loop. Idempotent: a second call is a no-op while the
    /// loop is alive.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.loop_handle.lock().expect("runner mutex poisoned");
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let me = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { me.poll_loop().await }));
    }

    async fn poll_loop(self: Arc<Self>) {
        crate::metrics::ensure_described();
        let mut ticker = tokio::time::interval(Duration::from_secs(self.cfg.tick_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tracing::info!(
            target: "runner",
            tick_secs = self.cfg.tick_secs,
            jobs = self.registry.job_ids().len(),
            "trigger runner started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = self.clock.now();
                    for due in self.registry.due_jobs(now) {
                        let me = Arc::clone(&self);
                        // Worker task per job so one slow handler never
                        // stalls due-detection for the others.
                        tokio::spawn(async move {
                            let _ = me.execute(&due.id, due.handler).await;
                        });
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }

        self.drain().await;
        tracing::info!(target: "runner", "trigger runner stopped");
    }

    /// Stop picking up new due jobs, wait for in-flight runs up to the
    /// grace period, then force-cancel whatever is left.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.loop_handle.lock().expect("runner mutex poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        } else {
            // Never started; nothing in flight from the loop, but manual
            // runs may exist.
            self.drain().await;
        }
    }

    async fn drain(&self) {
        let grace = Duration::from_secs(self.cfg.shutdown_grace_secs);
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if self.running.lock().expect("runner mutex poisoned").is_empty() {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        // Grace elapsed: mark and abort the stragglers. The worker task
        // observes the cancelled flag and records the final state.
        {
            let running = self.running.lock().expect("runner mutex poisoned");
            for (id, entry) in running.iter() {
                tracing::warn!(target: "runner", job = %id, "grace period elapsed, cancelling");
                entry.cancelled.store(true, Ordering::SeqCst);
                entry.abort.abort();
            }
        }
        // Workers unwind promptly after abort; give them a moment.
        let cleanup_deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while !self.running.lock().expect("runner mutex poisoned").is_empty()
            && tokio::time::Instant::now() < cleanup_deadline
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Manual trigger. Fails fast with `AlreadyRunning` when the job's
    /// single-flight slot is held; never queues.
    pub async fn run_now(&self, job_id: &str) -> Result<RunResult, RunnerError> {
        let handler = self.registry.handler(job_id)?;
        self.execute(job_id, handler).await
    }

    async fn execute(
        &self,
        job_id: &str,
        handler: Arc<dyn JobHandler>,
    ) -> Result<RunResult, RunnerError> {
        let started = self.clock.now();
        self.registry.begin_run(job_id, started)?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(async move { handler.run().await });
        self.running.lock().expect("runner mutex poisoned").insert(
            job_id.to_string(),
            RunningEntry {
                abort: task.abort_handle(),
                cancelled: Arc::clone(&cancelled),
            },
        );

        let timeout = Duration::from_secs(self.cfg.handler_timeout_secs);
        let outcome = tokio::time::timeout(timeout, task).await;
        let entry = self
            .running
            .lock()
            .expect("runner mutex poisoned")
            .remove(job_id);

        let (status, summary, errors) = match outcome {
            Ok(Ok(Ok(summary))) => (JobStatus::Succeeded, Some(summary), Vec::new()),
            Ok(Ok(Err(e))) => (JobStatus::Failed, None, vec![format!("{e:#}")]),
            Ok(Err(join_err)) => {
                if join_err.is_cancelled() && cancelled.load(Ordering::SeqCst) {
                    (JobStatus::Cancelled, None, vec!["cancelled during shutdown".into()])
                } else {
                    (JobStatus::Failed, None, vec![format!("handler panicked: {join_err}")])
                }
            }
            Err(_elapsed) => {
                // Abort the handler task so it cannot outlive the run it
                // belongs to.
                if let Some(entry) = &entry {
                    entry.abort.abort();
                }
                (
                    JobStatus::Failed,
                    None,
                    vec![format!("timed out after {}s", self.cfg.handler_timeout_secs)],
                )
            }
        };

        self.registry.finish_run(job_id, status);
        let finished = self.clock.now();
        let summary_text = summary
            .as_ref()
            .map(|s| s.brief())
            .unwrap_or_else(|| errors.join("; "));
        self.history.push(RunRecord {
            job_id: job_id.to_string(),
            started,
            finished,
            outcome: status,
            summary: summary_text,
        });

        counter!("monitor_runs_total").increment(1);
        gauge!("monitor_last_run_ts").set(finished.timestamp() as f64);

        if status == JobStatus::Succeeded {
            let store = self.state.lock().expect("runner mutex poisoned").clone();
            if let Some(store) = store {
                store.record(job_id, started).await;
            }
        }

        match status {
            JobStatus::Succeeded => {
                tracing::info!(target: "runner", job = job_id, "run succeeded");
            }
            JobStatus::Cancelled => {
                tracing::warn!(target: "runner", job = job_id, "run cancelled");
            }
            _ => {
                counter!("monitor_run_failures_total").increment(1);
                let detail = errors.join("; ");
                tracing::error!(target: "runner", job = job_id, error = %detail, "run failed");
                // The failure itself is alertable; delivery problems are
                // the dispatcher's to log, not ours to propagate.
                let alert = Alert::pipeline_error(job_id, &detail, finished);
                let _ = self.dispatcher.dispatch(alert).await;
            }
        }

        Ok(RunResult {
            job_id: job_id.to_string(),
            status,
            summary,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertKind;
    use crate::clock::ManualClock;
    use crate::config::DispatchConfig;
    use crate::error::ChannelError;
    use crate::notify::Channel;
    use crate::schedule::ScheduleSpec;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::AtomicU32;

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

    struct CountingHandler {
        runs: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn run(&self) -> anyhow::Result<RunSummary> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("synthetic handler failure");
            }
            Ok(RunSummary {
                categories_checked: 2,
                ..Default::default()
            })
        }
    }

    struct BlockingHandler {
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl JobHandler for BlockingHandler {
        async fn run(&self) -> anyhow::Result<RunSummary> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(RunSummary::default())
        }
    }

    fn harness(
        runner_cfg: RunnerConfig,
    ) -> (Arc<ManualClock>, Arc<TriggerRunner>, Arc<RecordingChannel>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap(),
        ));
        let channel = Arc::new(RecordingChannel::default());
        let dispatcher = AlertDispatcher::new(
            vec![channel.clone()],
            DispatchConfig {
                backoff_base_ms: 1,
                send_timeout_secs: 1,
                ..Default::default()
            },
        );
        let registry = Arc::new(JobRegistry::new(clock.clone()));
        let runner = TriggerRunner::new(
            registry,
            Arc::new(RunHistory::default()),
            dispatcher,
            clock.clone(),
            runner_cfg,
        );
        (clock, runner, channel)
    }

    #[tokio::test]
    async fn run_now_succeeds_and_records_history() {
        let (_, runner, _) = harness(RunnerConfig::default());
        let runs = Arc::new(AtomicU32::new(0));
        runner
            .registry()
            .register(
                "job",
                ScheduleSpec::every_secs(3600).unwrap(),
                Arc::new(CountingHandler {
                    runs: runs.clone(),
                    fail: false,
                }),
            )
            .unwrap();

        let result = runner.run_now("job").await.unwrap();
        assert_eq!(result.status, JobStatus::Succeeded);
        assert_eq!(result.summary.as_ref().unwrap().categories_checked, 2);
        assert!(result.errors.is_empty());

        let last = runner.history().last("job").unwrap();
        assert_eq!(last.outcome, JobStatus::Succeeded);
        assert_eq!(
            runner.registry().status("job").unwrap().status,
            JobStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn successful_run_is_recorded_in_state_store() {
        let (clock, runner, _) = harness(RunnerConfig::default());
        let path = std::env::temp_dir().join(format!(
            "mtm-runner-state-{}.json",
            std::process::id()
        ));
        let store = Arc::new(crate::state::StateStore::new(&path));
        runner.set_state_store(store.clone());
        runner
            .registry()
            .register(
                "job",
                ScheduleSpec::every_secs(3600).unwrap(),
                Arc::new(CountingHandler {
                    runs: Arc::new(AtomicU32::new(0)),
                    fail: false,
                }),
            )
            .unwrap();

        runner.run_now("job").await.unwrap();
        let state = store.load().await;
        assert_eq!(state.last_runs.get("job"), Some(&clock.now()));
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn run_now_unknown_job() {
        let (_, runner, _) = harness(RunnerConfig::default());
        assert!(matches!(
            runner.run_now("ghost").await,
            Err(RunnerError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_manual_trigger_fails_fast() {
        let (_, runner, _) = harness(RunnerConfig::default());
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        runner
            .registry()
            .register(
                "slow",
                ScheduleSpec::every_secs(3600).unwrap(),
                Arc::new(BlockingHandler {
                    entered: entered.clone(),
                    release: release.clone(),
                }),
            )
            .unwrap();

        let r1 = Arc::clone(&runner);
        let first = tokio::spawn(async move { r1.run_now("slow").await });
        entered.notified().await;

        match runner.run_now("slow").await {
            Err(RunnerError::AlreadyRunning(id)) => assert_eq!(id, "slow"),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }

        release.notify_one();
        let result = first.await.unwrap().unwrap();
        assert_eq!(result.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn handler_failure_emits_pipeline_alert_and_keeps_ticking() {
        let (clock, runner, channel) = harness(RunnerConfig {
            tick_secs: 1,
            ..Default::default()
        });
        let runs = Arc::new(AtomicU32::new(0));
        runner
            .registry()
            .register(
                "flaky",
                ScheduleSpec::every_secs(60).unwrap(),
                Arc::new(CountingHandler {
                    runs: runs.clone(),
                    fail: true,
                }),
            )
            .unwrap();
        clock.advance(chrono::Duration::seconds(61));

        runner.start();
        // First due execution fails.
        wait_until(|| runs.load(Ordering::SeqCst) >= 1).await;
        wait_until(|| runner.registry().status("flaky").unwrap().status == JobStatus::Failed).await;
        wait_until(|| {
            channel
                .sent
                .lock()
                .unwrap()
                .contains(&AlertKind::PipelineError)
        })
        .await;

        // The scheduler is unaffected: the next due time still fires.
        clock.advance(chrono::Duration::seconds(61));
        wait_until(|| runs.load(Ordering::SeqCst) >= 2).await;

        runner.shutdown().await;
    }

    #[tokio::test]
    async fn handler_timeout_marks_failed() {
        let (_, runner, channel) = harness(RunnerConfig {
            handler_timeout_secs: 1,
            ..Default::default()
        });
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        runner
            .registry()
            .register(
                "stuck",
                ScheduleSpec::every_secs(3600).unwrap(),
                Arc::new(BlockingHandler { entered, release }),
            )
            .unwrap();

        let result = runner.run_now("stuck").await.unwrap();
        assert_eq!(result.status, JobStatus::Failed);
        assert!(result.errors[0].contains("timed out"));
        assert!(channel
            .sent
            .lock()
            .unwrap()
            .contains(&AlertKind::PipelineError));

        // Lock was released with the failure.
        assert_ne!(
            runner.registry().status("stuck").unwrap().status,
            JobStatus::Running
        );
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_after_grace() {
        let (clock, runner, _) = harness(RunnerConfig {
            tick_secs: 1,
            shutdown_grace_secs: 1,
            ..Default::default()
        });
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        runner
            .registry()
            .register(
                "hung",
                ScheduleSpec::every_secs(3600).unwrap(),
                Arc::new(BlockingHandler {
                    entered: entered.clone(),
                    release: release.clone(),
                }),
            )
            .unwrap();
        runner.start();

        let r1 = Arc::clone(&runner);
        let manual = tokio::spawn(async move { r1.run_now("hung").await });
        entered.notified().await;

        runner.shutdown().await;

        let result = manual.await.unwrap().unwrap();
        assert_eq!(result.status, JobStatus::Cancelled);
        assert_eq!(
            runner.registry().status("hung").unwrap().status,
            JobStatus::Cancelled
        );
        assert_eq!(runner.history().last("hung").unwrap().outcome, JobStatus::Cancelled);

        // Slot was force-released: a fresh trigger can take it again.
        assert!(runner.registry().begin_run("hung", clock.now()).is_ok());
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..2_000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }
}
