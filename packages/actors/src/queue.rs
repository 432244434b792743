//! Cloneable handle to the queue actor.

use dispatch_core::{AdmissionPolicy, DispatchEvent, Job, QueueStats, SubmitError};
use ractor::{Actor, ActorRef};
use tokio::sync::{broadcast, oneshot};

use crate::messages::{DispatchError, QueueMessage};
use crate::queue_actor::{QueueActor, QueueActorState};

/// The bounded job queue shared by sources, workers and the dispatcher.
///
/// Cloning the handle is cheap; every clone talks to the same queue actor.
#[derive(Clone)]
pub struct JobQueue {
    actor: ActorRef<QueueMessage>,
    capacity: usize,
    policy: AdmissionPolicy,
}

impl JobQueue {
    /// Spawn a queue actor and return a handle to it along with the actor's
    /// join handle.
    pub async fn start(
        capacity: usize,
        policy: AdmissionPolicy,
        event_tx: Option<broadcast::Sender<DispatchEvent>>,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), DispatchError> {
        let mut state = QueueActorState::new(capacity, policy);
        if let Some(tx) = event_tx {
            state = state.with_event_tx(tx);
        }

        let (actor, handle) = Actor::spawn(None, QueueActor, state)
            .await
            .map_err(|e| DispatchError::spawn("queue", e))?;

        Ok((
            Self {
                actor,
                capacity,
                policy,
            },
            handle,
        ))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Offer a job to the queue.
    ///
    /// Under the blocking policy this waits for a free slot; under the reject
    /// policy a full queue fails at once with [`SubmitError::QueueFull`].
    /// Once the queue is closed every call fails with
    /// [`SubmitError::QueueClosed`].
    pub async fn submit(&self, job: Job) -> Result<(), SubmitError> {
        let (tx, rx) = oneshot::channel();
        self.actor
            .send_message(QueueMessage::Submit {
                job: Box::new(job),
                reply: tx,
            })
            .map_err(|_| SubmitError::QueueClosed)?;

        rx.await.unwrap_or(Err(SubmitError::QueueClosed))
    }

    /// Wait for the next job. `None` means the queue is closed and empty,
    /// and the caller should stop taking.
    pub async fn take(&self, worker_id: &str) -> Option<Job> {
        let (tx, rx) = oneshot::channel();
        self.actor
            .send_message(QueueMessage::Take {
                worker_id: worker_id.to_string(),
                reply: tx,
            })
            .ok()?;

        rx.await.ok().flatten()
    }

    /// Stop admitting jobs. Already-queued jobs are still delivered.
    pub fn close(&self) {
        if self.actor.send_message(QueueMessage::Close).is_err() {
            tracing::debug!("Queue actor already stopped");
        }
    }

    /// Current queue stats, or `None` if the actor has stopped.
    pub async fn stats(&self) -> Option<QueueStats> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(QueueMessage::GetStats { reply: tx.into() })
            .ok()?;
        rx.await.ok()
    }

    /// Stop the queue actor. Callers still parked see the queue as closed.
    pub fn shutdown(&self) {
        let _ = self.actor.send_message(QueueMessage::Shutdown);
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("actor", &self.actor.get_id())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .finish()
    }
}
