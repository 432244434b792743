//! Queue actor owning the bounded job buffer.
//!
//! All queue state lives in this actor, so the mailbox is the only lock:
//! every submit, take and close is applied one at a time, and each job is
//! handed to exactly one taker. Callers that cannot proceed are parked as
//! reply channels and woken by whichever message changes the state they
//! are waiting on.

use std::collections::VecDeque;

use chrono::Utc;
use dispatch_core::{AdmissionPolicy, DispatchEvent, Job, JobId, QueueStats, SubmitError};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::{broadcast, oneshot};

use crate::messages::QueueMessage;

/// A worker parked in `take`.
struct Taker {
    worker_id: String,
    reply: oneshot::Sender<Option<Job>>,
}

/// A producer parked in `submit` under the blocking policy.
struct Submitter {
    job: Job,
    reply: oneshot::Sender<Result<(), SubmitError>>,
}

/// State for the queue actor.
pub struct QueueActorState {
    capacity: usize,
    policy: AdmissionPolicy,
    closed: bool,
    buffer: VecDeque<Job>,
    takers: VecDeque<Taker>,
    submitters: VecDeque<Submitter>,
    submitted: u64,
    delivered: u64,
    rejected: u64,
    event_tx: Option<broadcast::Sender<DispatchEvent>>,
}

impl QueueActorState {
    /// Create a new queue actor state.
    pub fn new(capacity: usize, policy: AdmissionPolicy) -> Self {
        Self {
            capacity,
            policy,
            closed: false,
            buffer: VecDeque::with_capacity(capacity),
            takers: VecDeque::new(),
            submitters: VecDeque::new(),
            submitted: 0,
            delivered: 0,
            rejected: 0,
            event_tx: None,
        }
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<DispatchEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn broadcast(&self, event: DispatchEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            capacity: self.capacity,
            pending: self.buffer.len(),
            waiting_takers: self.takers.len(),
            waiting_submitters: self.submitters.len(),
            submitted: self.submitted,
            delivered: self.delivered,
            rejected: self.rejected,
            closed: self.closed,
        }
    }

    /// Count a job as admitted and announce it. Only called once admission
    /// can no longer be undone.
    fn record_admitted(&mut self, job_id: JobId, name: String) {
        self.submitted += 1;
        self.broadcast(DispatchEvent::JobEnqueued {
            job_id,
            name,
            timestamp: Utc::now(),
        });
    }

    /// Give `job` to the longest-waiting taker. Returns the job if nobody
    /// is waiting. Unless `admitted` is already set, the job is recorded
    /// once a taker holds it.
    fn hand_to_taker(&mut self, mut job: Job, admitted: bool) -> Option<Job> {
        while let Some(taker) = self.takers.pop_front() {
            let (job_id, name) = (job.id, job.name.clone());
            match taker.reply.send(Some(job)) {
                Ok(()) => {
                    if !admitted {
                        self.record_admitted(job_id, name);
                    }
                    self.delivered += 1;
                    tracing::debug!("Handed job directly to {}", taker.worker_id);
                    return None;
                }
                Err(returned) => match returned {
                    Some(returned) => job = returned,
                    None => return None,
                },
            }
        }
        Some(job)
    }

    /// Next parked submitter whose caller is still waiting.
    fn next_submitter(&mut self) -> Option<Submitter> {
        while let Some(submitter) = self.submitters.pop_front() {
            if submitter.reply.is_closed() {
                tracing::debug!("Dropping abandoned submission of job {}", submitter.job.id);
                continue;
            }
            return Some(submitter);
        }
        None
    }

    /// Move parked submitters into free buffer slots.
    fn refill(&mut self) {
        while self.buffer.len() < self.capacity {
            let Some(submitter) = self.next_submitter() else {
                break;
            };
            self.record_admitted(submitter.job.id, submitter.job.name.clone());
            self.buffer.push_back(submitter.job);
            let _ = submitter.reply.send(Ok(()));
        }
    }

    fn submit(&mut self, job: Job, reply: oneshot::Sender<Result<(), SubmitError>>) {
        if self.closed {
            self.rejected += 1;
            let _ = reply.send(Err(SubmitError::QueueClosed));
            return;
        }

        self.takers.retain(|taker| !taker.reply.is_closed());
        let has_room = !self.takers.is_empty() || self.buffer.len() < self.capacity;

        // Parked submitters are ahead of this one.
        if !has_room || !self.submitters.is_empty() {
            return self.overflow(job, reply);
        }

        if self.buffer.len() < self.capacity {
            // A free slot backs the handoff, so the job is admitted either way.
            self.record_admitted(job.id, job.name.clone());
            if let Some(job) = self.hand_to_taker(job, true) {
                self.buffer.push_back(job);
            }
        } else if let Some(job) = self.hand_to_taker(job, false) {
            // Capacity 0 and every taker went away meanwhile.
            return self.overflow(job, reply);
        }
        let _ = reply.send(Ok(()));
    }

    fn overflow(&mut self, job: Job, reply: oneshot::Sender<Result<(), SubmitError>>) {
        match self.policy {
            AdmissionPolicy::Reject => {
                self.rejected += 1;
                let _ = reply.send(Err(SubmitError::QueueFull));
            }
            AdmissionPolicy::Block => {
                tracing::debug!("Queue full, parking submission of job {}", job.id);
                self.submitters.push_back(Submitter { job, reply });
            }
        }
    }

    fn take(&mut self, worker_id: String, reply: oneshot::Sender<Option<Job>>) {
        if let Some(job) = self.buffer.pop_front() {
            match reply.send(Some(job)) {
                Ok(()) => {
                    self.delivered += 1;
                    self.refill();
                }
                Err(Some(job)) => self.buffer.push_front(job),
                Err(None) => {}
            }
            return;
        }

        // Synchronous handoff: nothing buffered but a producer is parked.
        if let Some(submitter) = self.next_submitter() {
            let (job_id, name) = (submitter.job.id, submitter.job.name.clone());
            match reply.send(Some(submitter.job)) {
                Ok(()) => {
                    self.record_admitted(job_id, name);
                    self.delivered += 1;
                    let _ = submitter.reply.send(Ok(()));
                }
                Err(returned) => {
                    if let Some(job) = returned {
                        self.submitters.push_front(Submitter {
                            job,
                            reply: submitter.reply,
                        });
                    }
                }
            }
            return;
        }

        if self.closed {
            let _ = reply.send(None);
            return;
        }

        self.takers.push_back(Taker { worker_id, reply });
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        while let Some(submitter) = self.submitters.pop_front() {
            self.rejected += 1;
            let _ = submitter.reply.send(Err(SubmitError::QueueClosed));
        }

        // Takers only park on an empty buffer, so they can be released now.
        while let Some(taker) = self.takers.pop_front() {
            let _ = taker.reply.send(None);
        }

        tracing::info!("Queue closed with {} jobs pending", self.buffer.len());
        self.broadcast(DispatchEvent::QueueClosed {
            pending: self.buffer.len(),
            timestamp: Utc::now(),
        });
    }
}

/// Queue actor that owns the job buffer.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueActorState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting queue actor: capacity={} policy={}",
            args.capacity,
            args.policy
        );
        Ok(args)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Submit { job, reply } => state.submit(*job, reply),

            QueueMessage::Take { worker_id, reply } => state.take(worker_id, reply),

            QueueMessage::Close => state.close(),

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue actor");
                myself.stop(None);
            }
        }

        Ok(())
    }
}
