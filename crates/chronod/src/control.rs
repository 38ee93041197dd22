//! The request/reply contract between the HTTP handlers and the scheduler
//! loop, which is the sole owner of the live [`Schedule`](crate::schedule::Schedule).
//!
//! Rather than one bidirectional channel where a sender posts and then
//! reads its answer off the same channel (requiring strict alternation),
//! each request carries its own one-shot reply channel — the typed
//! alternative the design notes call out as functionally identical and
//! easier to get right.

use chronod_domain::Error;
use tokio::sync::{mpsc, oneshot};

use crate::schedule::Schedule;
use crate::tracker::RunningJob;

/// A request sent from an HTTP handler (or any other observer) to the
/// scheduler loop.
#[derive(Debug)]
pub enum ControlRequest {
    /// `scheduleGetList` — read-only.
    GetSchedule,
    /// `runningjobGetList` — read-only.
    GetRunningJobs,
    /// `replaceRunningSchedule` — validated and, on success, persisted.
    ReplaceSchedule(Schedule),
    /// `shutdown` — the loop exits after replying.
    Shutdown,
}

/// The loop's answer to a [`ControlRequest`].
#[derive(Debug)]
pub enum ControlReply {
    Schedule(Schedule),
    RunningJobs(Vec<RunningJob>),
    ReplaceAck,
    ShutdownAck,
    Error(Error),
}

/// A cheaply cloneable handle HTTP handlers use to talk to the scheduler
/// loop. Sending a request and awaiting the reply is one atomic turn from
/// the caller's perspective.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<(ControlRequest, oneshot::Sender<ControlReply>)>,
}

impl ControlHandle {
    pub fn new(tx: mpsc::Sender<(ControlRequest, oneshot::Sender<ControlReply>)>) -> Self {
        Self { tx }
    }

    /// Send a request and wait for its reply. Fails only if the scheduler
    /// loop has already exited (channel closed).
    pub async fn send(&self, request: ControlRequest) -> Result<ControlReply, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .await
            .map_err(|_| Error::ConfigInvalid("scheduler loop is no longer running".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::ConfigInvalid("scheduler loop dropped the reply channel".to_string()))
    }
}

/// The loop side of the channel created alongside a [`ControlHandle`].
pub type ControlReceiver = mpsc::Receiver<(ControlRequest, oneshot::Sender<ControlReply>)>;

/// Construct a linked `(ControlHandle, ControlReceiver)` pair.
pub fn channel(buffer: usize) -> (ControlHandle, ControlReceiver) {
    let (tx, rx) = mpsc::channel(buffer);
    (ControlHandle::new(tx), rx)
}
