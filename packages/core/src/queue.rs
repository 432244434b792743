//! Queue-facing types shared by producers, workers and the controller.

use serde::{Deserialize, Serialize};

/// What `submit` does when the queue has no free slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Suspend the producer until a slot frees up or the queue closes.
    #[default]
    Block,
    /// Fail immediately with [`SubmitError::QueueFull`].
    Reject,
}

impl AdmissionPolicy {
    /// Parse a policy name as used in configuration.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Some(Self::Block),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmissionPolicy::Block => write!(f, "block"),
            AdmissionPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Why a job was not admitted to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum SubmitError {
    /// The queue is at capacity and the policy is `reject`. Retryable.
    #[error("queue is full")]
    QueueFull,
    /// The queue has been closed. Sources must stop submitting.
    #[error("queue is closed")]
    QueueClosed,
}

impl SubmitError {
    /// Whether a source may try the same submission again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::QueueFull)
    }
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    /// Capacity fixed at startup.
    pub capacity: usize,
    /// Jobs buffered and waiting for a worker.
    pub pending: usize,
    /// Workers parked in `take`.
    pub waiting_takers: usize,
    /// Producers parked in `submit`.
    pub waiting_submitters: usize,
    /// Jobs admitted since start.
    pub submitted: u64,
    /// Jobs handed to a worker since start.
    pub delivered: u64,
    /// Submissions refused with `QueueFull` or `QueueClosed`.
    pub rejected: u64,
    /// Whether `close` has been called.
    pub closed: bool,
}

impl QueueStats {
    /// Admitted jobs that have not reached a worker yet.
    pub fn in_queue(&self) -> u64 {
        self.submitted.saturating_sub(self.delivered)
    }

    /// True once the queue is closed and nothing is left to deliver.
    pub fn is_drained(&self) -> bool {
        self.closed && self.pending == 0 && self.waiting_submitters == 0
    }
}
