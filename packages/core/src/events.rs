//! Observation events emitted while the dispatcher runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobError, JobId, StepStatus};

/// Events emitted by the dispatch core.
///
/// Events for one job arrive in execution order; events for different jobs
/// are interleaved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    // Queue events
    /// A job was admitted to the queue. With capacity 0 admission is the
    /// handoff itself, so this can trail the worker's `JobStarted`.
    JobEnqueued {
        job_id: JobId,
        name: String,
        timestamp: DateTime<Utc>,
    },
    /// The queue stopped accepting jobs.
    QueueClosed {
        pending: usize,
        timestamp: DateTime<Utc>,
    },

    // Job events
    /// A worker took a job and started executing it.
    JobStarted {
        job_id: JobId,
        worker_id: String,
        workflow: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A workflow step started.
    StepStarted {
        job_id: JobId,
        index: usize,
        step: String,
        timestamp: DateTime<Utc>,
    },
    /// A workflow step finished.
    StepFinished {
        job_id: JobId,
        index: usize,
        status: StepStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// Every step of the job ran successfully.
    JobCompleted {
        job_id: JobId,
        worker_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// The job stopped at a failing step, a fault, or a parse error.
    JobFailed {
        job_id: JobId,
        worker_id: String,
        error: JobError,
        timestamp: DateTime<Utc>,
    },

    // Worker events
    /// A worker started its loop.
    WorkerStarted {
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A worker observed a closed, empty queue and exited.
    WorkerExited {
        worker_id: String,
        jobs_processed: u64,
        timestamp: DateTime<Utc>,
    },
}

impl DispatchEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DispatchEvent::JobEnqueued { timestamp, .. } => *timestamp,
            DispatchEvent::QueueClosed { timestamp, .. } => *timestamp,
            DispatchEvent::JobStarted { timestamp, .. } => *timestamp,
            DispatchEvent::StepStarted { timestamp, .. } => *timestamp,
            DispatchEvent::StepFinished { timestamp, .. } => *timestamp,
            DispatchEvent::JobCompleted { timestamp, .. } => *timestamp,
            DispatchEvent::JobFailed { timestamp, .. } => *timestamp,
            DispatchEvent::WorkerStarted { timestamp, .. } => *timestamp,
            DispatchEvent::WorkerExited { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            DispatchEvent::JobEnqueued { job_id, .. } => Some(*job_id),
            DispatchEvent::JobStarted { job_id, .. } => Some(*job_id),
            DispatchEvent::StepStarted { job_id, .. } => Some(*job_id),
            DispatchEvent::StepFinished { job_id, .. } => Some(*job_id),
            DispatchEvent::JobCompleted { job_id, .. } => Some(*job_id),
            DispatchEvent::JobFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get the worker ID associated with this event, if any.
    pub fn worker_id(&self) -> Option<&str> {
        match self {
            DispatchEvent::JobStarted { worker_id, .. }
            | DispatchEvent::JobCompleted { worker_id, .. }
            | DispatchEvent::JobFailed { worker_id, .. }
            | DispatchEvent::WorkerStarted { worker_id, .. }
            | DispatchEvent::WorkerExited { worker_id, .. } => Some(worker_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            DispatchEvent::JobEnqueued { job_id, name, .. } => {
                format!("Job {} ({}) enqueued", job_id, name)
            }
            DispatchEvent::QueueClosed { pending, .. } => {
                format!("Queue closed with {} pending", pending)
            }
            DispatchEvent::JobStarted {
                job_id, worker_id, ..
            } => format!("Job {} started by {}", job_id, worker_id),
            DispatchEvent::StepStarted {
                job_id, index, step, ..
            } => format!("Job {} step {}: {}", job_id, index, step),
            DispatchEvent::StepFinished {
                job_id,
                index,
                status,
                ..
            } => {
                let result = if status.is_success() { "ok" } else { "failed" };
                format!("Job {} step {} {}", job_id, index, result)
            }
            DispatchEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            DispatchEvent::JobFailed { job_id, error, .. } => {
                format!("Job {} failed: {}", job_id, error)
            }
            DispatchEvent::WorkerStarted { worker_id, .. } => {
                format!("Worker {} started", worker_id)
            }
            DispatchEvent::WorkerExited {
                worker_id,
                jobs_processed,
                ..
            } => format!("Worker {} exited after {} jobs", worker_id, jobs_processed),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn serializes_with_event_tag() -> Result<(), serde_json::Error> {
        let job_id = JobId::new();
        let event = DispatchEvent::JobFailed {
            job_id,
            worker_id: "worker-2".to_string(),
            error: JobError::StepTimeout {
                index: 0,
                timeout_ms: 250,
            },
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&event)?;
        assert_eq!(value["event"], "job_failed");
        assert_eq!(value["worker_id"], "worker-2");

        let back: DispatchEvent = serde_json::from_value(value)?;
        assert_eq!(back.job_id(), Some(job_id));
        assert_eq!(back.worker_id(), Some("worker-2"));
        Ok(())
    }

    #[test]
    fn queue_events_carry_no_job() {
        let event = DispatchEvent::QueueClosed {
            pending: 4,
            timestamp: Utc::now(),
        };
        assert_eq!(event.job_id(), None);
        assert_eq!(event.description(), "Queue closed with 4 pending");
    }
}
