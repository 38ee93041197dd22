//! The concurrent map of currently-executing jobs.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::executor::ExecutorCommand;
use crate::schedule::JobDefinition;

/// A fresh, collision-free, >=64-bit-entropy identifier minted per
/// execution attempt. Wraps a v4 UUID (122 bits of randomness) rather than
/// hand-rolling a `rand`+`hex` pair, since the rest of this workspace's
/// lineage already mints every other opaque id the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunToken(Uuid);

impl RunToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `.simple()` renders 32 lowercase hex characters, no dashes.
        write!(f, "{}", self.0.as_simple())
    }
}

/// A live execution record. The process handle and log sinks themselves are
/// owned by the executor task that created this entry (a `Child` is not
/// `Clone`, and `Snapshot()` needs to hand out independent copies); this
/// record carries everything an external observer or the dispatcher's
/// locking check needs: who is running, since when, and how to signal it.
#[derive(Debug, Clone)]
pub struct RunningJob {
    pub token: RunToken,
    pub job: JobDefinition,
    pub started_at: DateTime<Utc>,
    pub control_tx: mpsc::Sender<ExecutorCommand>,
}

/// `token -> RunningJob`, protected by a reader/writer discipline: readers
/// (locking check, API listing) run concurrently; writers (insert on
/// dispatch, remove on completion) are exclusive.
#[derive(Debug, Default)]
pub struct RunningJobTracker {
    inner: RwLock<HashMap<RunToken, RunningJob>>,
}

impl RunningJobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive. Tokens are freshly minted, so a collision is not a
    /// meaningful case to handle specially; it would simply overwrite.
    pub async fn insert(&self, entry: RunningJob) {
        self.inner.write().await.insert(entry.token, entry);
    }

    /// Exclusive. Logs a warning if the token was already absent.
    pub async fn remove(&self, token: RunToken) {
        if self.inner.write().await.remove(&token).is_none() {
            tracing::warn!(%token, "attempted to remove a run token that was not tracked");
        }
    }

    /// Shared. A point-in-time list of running jobs, for external listing.
    pub async fn snapshot(&self) -> Vec<RunningJob> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Shared. Used by the dispatcher when a job has `locking=true`.
    pub async fn any_with_label(&self, label: &str) -> bool {
        self.inner.read().await.values().any(|r| r.job.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str) -> (RunningJob, mpsc::Receiver<ExecutorCommand>) {
        let (tx, rx) = mpsc::channel(1);
        (
            RunningJob {
                token: RunToken::new(),
                job: JobDefinition::new(label, "/bin/true", "* * * * *"),
                started_at: Utc::now(),
                control_tx: tx,
            },
            rx,
        )
    }

    #[test]
    fn run_token_renders_as_32_hex_chars() {
        let token = RunToken::new();
        let rendered = token.to_string();
        assert_eq!(rendered.len(), 32);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn run_tokens_are_unique() {
        let a = RunToken::new();
        let b = RunToken::new();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn insert_then_snapshot_sees_the_entry() {
        let tracker = RunningJobTracker::new();
        let (job, _rx) = entry("alpha");
        let token = job.token;
        tracker.insert(job).await;

        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].token, token);
    }

    #[tokio::test]
    async fn remove_clears_the_entry() {
        let tracker = RunningJobTracker::new();
        let (job, _rx) = entry("alpha");
        let token = job.token;
        tracker.insert(job).await;
        tracker.remove(token).await;
        assert!(tracker.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn remove_of_unknown_token_is_a_harmless_no_op() {
        let tracker = RunningJobTracker::new();
        tracker.remove(RunToken::new()).await;
        assert!(tracker.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn any_with_label_reflects_current_entries() {
        let tracker = RunningJobTracker::new();
        assert!(!tracker.any_with_label("alpha").await);

        let (job, _rx) = entry("alpha");
        let token = job.token;
        tracker.insert(job).await;
        assert!(tracker.any_with_label("alpha").await);
        assert!(!tracker.any_with_label("beta").await);

        tracker.remove(token).await;
        assert!(!tracker.any_with_label("alpha").await);
    }

    #[tokio::test]
    async fn locking_false_allows_unbounded_concurrent_entries_for_same_label() {
        // Pins the spec's open question: locking=false is not rate-limited.
        let tracker = RunningJobTracker::new();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (job, rx) = entry("alpha");
            receivers.push(rx);
            tracker.insert(job).await;
        }
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.len(), 5);
        assert!(snapshot.iter().all(|r| r.job.label == "alpha"));
    }
}
