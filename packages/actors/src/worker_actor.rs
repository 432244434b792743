//! Worker actor for executing jobs.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use dispatch_core::{DispatchEvent, Job, JobError, JobRecord, Outcome};
use futures_util::FutureExt;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::{broadcast, mpsc};

use crate::executor::{WorkflowExecutor, panic_message};
use crate::messages::WorkerMessage;
use crate::queue::JobQueue;
use crate::resolver::WorkflowResolver;

/// Everything a worker needs, shared by every worker in a pool.
#[derive(Clone)]
pub struct WorkerContext {
    pub queue: JobQueue,
    pub executor: Arc<WorkflowExecutor>,
    pub resolver: Arc<dyn WorkflowResolver>,
    /// Where finished jobs are recorded.
    pub records: mpsc::UnboundedSender<JobRecord>,
    pub event_tx: Option<broadcast::Sender<DispatchEvent>>,
}

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    context: WorkerContext,
    /// Jobs this worker has finished, successfully or not.
    pub jobs_processed: u64,
}

impl WorkerActorState {
    /// Create a new worker actor state.
    pub fn new(worker_id: impl Into<String>, context: WorkerContext) -> Self {
        Self {
            worker_id: worker_id.into(),
            context,
            jobs_processed: 0,
        }
    }

    fn broadcast(&self, event: DispatchEvent) {
        if let Some(ref tx) = self.context.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Run one job and produce its ledger entry. Never fails: every error,
    /// including a panic anywhere below, becomes the job's outcome.
    async fn run_job(&self, job: Job) -> JobRecord {
        let started_at = Utc::now();

        let outcome = match AssertUnwindSafe(self.execute(&job)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Outcome::failed(JobError::ExecutionFault {
                index: None,
                cause: panic_message(&*panic),
            }),
        };

        let finished_at = Utc::now();
        match &outcome {
            Outcome::Completed => {
                let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
                tracing::info!("Worker {} finished job {}", self.worker_id, job.id);
                self.broadcast(DispatchEvent::JobCompleted {
                    job_id: job.id,
                    worker_id: self.worker_id.clone(),
                    duration_ms,
                    timestamp: finished_at,
                });
            }
            Outcome::Failed { error } => {
                tracing::warn!(
                    "Worker {} job {} failed ({}): {}",
                    self.worker_id,
                    job.id,
                    error.as_str(),
                    error
                );
                self.broadcast(DispatchEvent::JobFailed {
                    job_id: job.id,
                    worker_id: self.worker_id.clone(),
                    error: error.clone(),
                    timestamp: finished_at,
                });
            }
        }

        JobRecord {
            job_id: job.id,
            job_name: job.name,
            worker_id: self.worker_id.clone(),
            outcome,
            started_at,
            finished_at,
        }
    }

    async fn execute(&self, job: &Job) -> Outcome {
        tracing::info!("Worker {} starting job {}: {}", self.worker_id, job.id, job.name);

        // A panicking resolver still gets its `JobStarted` before the failure.
        let resolved =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.context.resolver.resolve(job)));
        let workflow_name = match &resolved {
            Ok(Ok(workflow)) => Some(workflow.name.clone()),
            _ => None,
        };
        self.broadcast(DispatchEvent::JobStarted {
            job_id: job.id,
            worker_id: self.worker_id.clone(),
            workflow: workflow_name,
            timestamp: Utc::now(),
        });

        match resolved {
            Ok(Ok(workflow)) => self.context.executor.execute(&workflow, job).await.outcome,
            Ok(Err(e)) => {
                tracing::warn!("Error parsing workflow for job {}: {}", job.id, e);
                Outcome::failed(JobError::Parse {
                    cause: e.to_string(),
                })
            }
            Err(panic) => Outcome::failed(JobError::ExecutionFault {
                index: None,
                cause: panic_message(&*panic),
            }),
        }
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub context: WorkerContext,
}

/// Worker actor that drains the queue one job at a time.
///
/// The actor drives itself with `Next` messages: each one takes a job, runs
/// it, records it, and queues the following `Next`. When the queue reports
/// closed-and-empty the actor stops.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        let state = WorkerActorState::new(args.worker_id, args.context);
        state.broadcast(DispatchEvent::WorkerStarted {
            worker_id: state.worker_id.clone(),
            timestamp: Utc::now(),
        });

        // Start the work loop
        myself.send_message(WorkerMessage::Next)?;

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Next => match state.context.queue.take(&state.worker_id).await {
                Some(job) => {
                    let record = state.run_job(job).await;
                    state.jobs_processed += 1;
                    if state.context.records.send(record).is_err() {
                        tracing::warn!("Worker {} has no ledger to report to", state.worker_id);
                    }
                    myself.send_message(WorkerMessage::Next)?;
                }
                None => {
                    tracing::info!(
                        "Worker {} exiting after {} jobs",
                        state.worker_id,
                        state.jobs_processed
                    );
                    state.broadcast(DispatchEvent::WorkerExited {
                        worker_id: state.worker_id.clone(),
                        jobs_processed: state.jobs_processed,
                        timestamp: Utc::now(),
                    });
                    myself.stop(Some("queue drained".to_string()));
                }
            },
        }

        Ok(())
    }
}
