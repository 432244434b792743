//! Message types for actor communication.

use dispatch_core::{ConfigError, Job, QueueStats, SubmitError};
use ractor::RpcReplyPort;
use tokio::sync::oneshot;

/// Messages for the QueueActor.
///
/// `Submit` and `Take` reply over plain oneshot senders rather than
/// `RpcReplyPort` so the queue can see when a parked caller has gone away
/// and get an undelivered job back.
#[derive(Debug)]
pub enum QueueMessage {
    /// Admit a job, or park the caller until there is room.
    Submit {
        job: Box<Job>,
        reply: oneshot::Sender<Result<(), SubmitError>>,
    },

    /// Hand the next job to a worker, or park it until one arrives.
    /// `None` means the queue is closed and empty.
    Take {
        worker_id: String,
        reply: oneshot::Sender<Option<Job>>,
    },

    /// Stop admitting jobs. Idempotent.
    Close,

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Stop the actor. Parked callers see the queue as closed.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Take the next job from the queue and run it.
    Next,
}

/// Fatal errors for the dispatcher itself. Per-job failures never show up here.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn {what}: {reason}")]
    Spawn { what: String, reason: String },

    #[error("worker {worker_id} crashed: {reason}")]
    WorkerCrashed { worker_id: String, reason: String },

    #[error("pool drained with {pending} jobs still queued")]
    Undrained { pending: usize },
}

impl DispatchError {
    pub(crate) fn spawn(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        DispatchError::Spawn {
            what: what.into(),
            reason: err.to_string(),
        }
    }
}
