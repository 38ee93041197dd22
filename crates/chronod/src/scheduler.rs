//! The single serialization point for schedule state: a task that owns the
//! live [`Schedule`] exclusively, ticks once per minute to dispatch
//! executions, and services control-plane requests between ticks.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, Timelike, Utc};
use tokio::sync::mpsc;

use crate::control::{ControlReceiver, ControlReply, ControlRequest};
use crate::executor;
use crate::schedule::Schedule;
use crate::tracker::{RunToken, RunningJob, RunningJobTracker};

/// Truncate to the minute, discarding seconds and sub-second precision.
fn current_minute() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.date().and_hms_opt(now.hour(), now.minute(), 0).unwrap()
}

pub struct SchedulerLoop {
    schedule: Schedule,
    tracker: Arc<RunningJobTracker>,
    logs_root: PathBuf,
    job_config_path: PathBuf,
    control_rx: ControlReceiver,
    last_tick: NaiveDateTime,
}

impl SchedulerLoop {
    pub fn new(
        schedule: Schedule,
        logs_root: PathBuf,
        job_config_path: PathBuf,
        control_rx: ControlReceiver,
    ) -> Self {
        Self {
            schedule,
            tracker: Arc::new(RunningJobTracker::new()),
            logs_root,
            job_config_path,
            control_rx,
            // Matches the minute the loop started in, so the first tick is
            // spent servicing the control channel rather than dispatching
            // mid-minute.
            last_tick: current_minute(),
        }
    }

    #[cfg(test)]
    pub fn tracker(&self) -> Arc<RunningJobTracker> {
        self.tracker.clone()
    }

    /// Run forever until a `shutdown` request is received.
    pub async fn run(mut self) {
        loop {
            let current = current_minute();
            // `!=` rather than `>`, in either direction: a backward clock
            // jump is treated as a new minute and re-dispatches once, the
            // simpler of the two choices the design notes sanction.
            if current != self.last_tick {
                self.dispatch(current).await;
                self.last_tick = current;
            }

            if !self.service_until_next_minute().await {
                tracing::info!("scheduler loop shutting down");
                return;
            }
        }
    }

    async fn dispatch(&self, current: NaiveDateTime) {
        tracing::debug!(minute = %current, "running dispatch");
        for job in self.schedule.jobs() {
            if !job.matches(&current) {
                continue;
            }

            if job.locking && self.tracker.any_with_label(&job.label).await {
                tracing::info!(label = %job.label, "currently running and locked; skipping");
                continue;
            }

            let token = RunToken::new();
            let (control_tx, control_rx) = mpsc::channel(4);
            let entry = RunningJob {
                token,
                job: job.clone(),
                started_at: Utc::now(),
                control_tx,
            };
            tracing::debug!(label = %job.label, %token, "adding job to tracker");
            self.tracker.insert(entry).await;

            let job_snapshot = job.clone();
            let logs_root = self.logs_root.clone();
            let tracker = self.tracker.clone();
            tokio::spawn(async move {
                executor::run(job_snapshot, token, logs_root, control_rx).await;
                tracker.remove(token).await;
            });
        }
    }

    /// Stay within the current minute, answering control requests as they
    /// arrive, until the next minute boundary. Returns `false` if a
    /// `shutdown` request was handled.
    async fn service_until_next_minute(&mut self) -> bool {
        loop {
            let now = Utc::now().naive_utc();
            let next_boundary = self.last_tick + chrono::Duration::minutes(1);
            let timeout = (next_boundary - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_millis(0));

            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    return true;
                }
                message = self.control_rx.recv() => {
                    match message {
                        Some((request, reply_tx)) => {
                            if !self.handle_request(request, reply_tx).await {
                                return false;
                            }
                        }
                        None => {
                            // No more senders; nothing left to service, but
                            // the ticker keeps running.
                            return true;
                        }
                    }
                }
            }
        }
    }

    /// Handle one request as a single atomic turn. Returns `false` if the
    /// loop should exit after this turn (shutdown).
    async fn handle_request(
        &mut self,
        request: ControlRequest,
        reply_tx: tokio::sync::oneshot::Sender<ControlReply>,
    ) -> bool {
        match request {
            ControlRequest::GetSchedule => {
                let _ = reply_tx.send(ControlReply::Schedule(self.schedule.clone()));
                true
            }
            ControlRequest::GetRunningJobs => {
                let snapshot = self.tracker.snapshot().await;
                let _ = reply_tx.send(ControlReply::RunningJobs(snapshot));
                true
            }
            ControlRequest::ReplaceSchedule(mut proposed) => {
                match proposed.validate() {
                    Ok(()) => {
                        if let Err(err) = proposed.persist(&self.job_config_path) {
                            tracing::warn!(error = %err, "failed to persist replaced schedule");
                        }
                        self.schedule = proposed;
                        tracing::debug!("schedule refreshed");
                        let _ = reply_tx.send(ControlReply::ReplaceAck);
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "rejected schedule replacement");
                        let _ = reply_tx.send(ControlReply::Error(err));
                    }
                }
                true
            }
            ControlRequest::Shutdown => {
                tracing::info!("received shutdown command, goodbye");
                let _ = reply_tx.send(ControlReply::ShutdownAck);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control;
    use crate::schedule::JobDefinition;

    fn job(label: &str, schedule: &str, locking: bool) -> JobDefinition {
        let mut j = JobDefinition::new(label, "/bin/sleep 2", schedule);
        j.locking = locking;
        j
    }

    #[tokio::test]
    async fn dispatch_runs_matching_jobs_and_tracker_clears_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        let schedule = Schedule::new(vec![JobDefinition::new("alpha", "/bin/true", "* * * * *")]).unwrap();
        let (_handle, rx) = control::channel(4);
        let loop_ = SchedulerLoop::new(schedule, dir.path().to_path_buf(), dir.path().join("jobs.toml"), rx);
        let tracker = loop_.tracker();

        let current = current_minute();
        loop_.dispatch(current).await;

        // Give the spawned executor a moment to finish and clean up.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(tracker.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn locking_job_skips_dispatch_while_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let schedule =
            Schedule::new(vec![job("alpha", "* * * * *", true)]).unwrap();
        let (_handle, rx) = control::channel(4);
        let loop_ = SchedulerLoop::new(schedule, dir.path().to_path_buf(), dir.path().join("jobs.toml"), rx);
        let tracker = loop_.tracker();

        let current = current_minute();
        loop_.dispatch(current).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(tracker.snapshot().await.len(), 1);

        // Second dispatch for the same minute should skip: still exactly one.
        loop_.dispatch(current).await;
        assert_eq!(tracker.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn non_locking_job_allows_concurrent_entries() {
        let dir = tempfile::tempdir().unwrap();
        let schedule =
            Schedule::new(vec![job("alpha", "* * * * *", false)]).unwrap();
        let (_handle, rx) = control::channel(4);
        let loop_ = SchedulerLoop::new(schedule, dir.path().to_path_buf(), dir.path().join("jobs.toml"), rx);
        let tracker = loop_.tracker();

        let current = current_minute();
        loop_.dispatch(current).await;
        loop_.dispatch(current).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(tracker.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn control_channel_get_schedule_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let schedule = Schedule::new(vec![JobDefinition::new("alpha", "/bin/true", "* * * * *")]).unwrap();
        let (handle, rx) = control::channel(4);
        let loop_ = SchedulerLoop::new(schedule, dir.path().to_path_buf(), dir.path().join("jobs.toml"), rx);
        let join = tokio::spawn(loop_.run());

        let reply = handle.send(ControlRequest::GetSchedule).await.unwrap();
        match reply {
            ControlReply::Schedule(s) => assert_eq!(s.len(), 1),
            other => panic!("unexpected reply: {other:?}"),
        }

        let reply = handle.send(ControlRequest::Shutdown).await.unwrap();
        assert!(matches!(reply, ControlReply::ShutdownAck));
        tokio::time::timeout(std::time::Duration::from_secs(5), join)
            .await
            .expect("loop should exit after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn replace_with_malformed_expression_is_rejected_and_old_schedule_stands() {
        let dir = tempfile::tempdir().unwrap();
        let job_config_path = dir.path().join("jobs.toml");
        let schedule = Schedule::new(vec![JobDefinition::new("alpha", "/bin/true", "* * * * *")]).unwrap();
        let (handle, rx) = control::channel(4);
        let loop_ = SchedulerLoop::new(schedule, dir.path().to_path_buf(), job_config_path.clone(), rx);
        let join = tokio::spawn(loop_.run());

        // A schedule as it would arrive over HTTP: unvalidated, built from a
        // job whose expression string does not compile.
        let bad_job = JobDefinition::new("beta", "/bin/true", "bogus");
        let proposed = Schedule::unvalidated(vec![bad_job]);

        let reply = handle
            .send(ControlRequest::ReplaceSchedule(proposed))
            .await
            .unwrap();
        assert!(matches!(reply, ControlReply::Error(chronod_domain::Error::MalformedExpression { .. })));

        assert!(!job_config_path.exists());

        let reply = handle.send(ControlRequest::GetSchedule).await.unwrap();
        match reply {
            ControlReply::Schedule(s) => {
                assert_eq!(s.len(), 1);
                assert_eq!(s.jobs()[0].label, "alpha");
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        handle.send(ControlRequest::Shutdown).await.unwrap();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), join).await;
    }
}
