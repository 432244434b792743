//! Sequential workflow executor.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dispatch_core::{
    DispatchEvent, ExecutionMachine, ExecutionState, InvalidTransition, Job, JobError, Outcome,
    Step, StepStatus, Transition, Workflow,
};
use futures_util::FutureExt;
use tokio::sync::broadcast;

use crate::step::StepRunner;

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub index: usize,
    pub step: Step,
    pub status: StepStatus,
    pub duration_ms: u64,
}

/// Full record of one workflow execution.
#[derive(Debug, Clone)]
pub struct Execution {
    pub outcome: Outcome,
    /// Every state the machine passed through, starting with `Pending`.
    pub history: Vec<ExecutionState>,
    /// Steps that actually ran, in order.
    pub steps: Vec<StepReport>,
}

impl Execution {
    pub fn final_state(&self) -> Option<ExecutionState> {
        self.history.last().copied()
    }
}

/// Runs a workflow's steps one after another and stops at the first failure.
///
/// The executor holds no per-job state and is shared by every worker.
pub struct WorkflowExecutor {
    runner: Arc<dyn StepRunner>,
    step_timeout: Option<Duration>,
    event_tx: Option<broadcast::Sender<DispatchEvent>>,
}

impl WorkflowExecutor {
    pub fn new(runner: Arc<dyn StepRunner>) -> Self {
        Self {
            runner,
            step_timeout: None,
            event_tx: None,
        }
    }

    /// Bound each step's run time. `None` means unbounded.
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
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

    pub async fn execute(&self, workflow: &Workflow, job: &Job) -> Execution {
        let mut machine = ExecutionMachine::new(workflow.len());
        let mut steps = Vec::with_capacity(workflow.len());
        let mut failure = None;

        tracing::info!("Executing workflow '{}' for job {}", workflow.name, job.id);

        if let Err(e) = machine.apply(Transition::Start) {
            return invalid(machine, steps, e);
        }

        while let Some(index) = machine.current_step() {
            let Some(step) = workflow.steps.get(index) else {
                let error = JobError::ExecutionFault {
                    index: Some(index),
                    cause: format!("workflow has no step {}", index),
                };
                return finish(machine, steps, Outcome::failed(error));
            };

            tracing::info!("Job {} step {}: {}", job.id, index, step);
            self.broadcast(DispatchEvent::StepStarted {
                job_id: job.id,
                index,
                step: step.command().to_string(),
                timestamp: Utc::now(),
            });

            let started = Instant::now();
            let status = self.run_step(step, job).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match &status {
                StepStatus::Succeeded { output } => {
                    tracing::debug!("Job {} step {} ok: {}", job.id, index, output.summary)
                }
                other => tracing::warn!("Job {} step {} did not succeed: {:?}", job.id, index, other),
            }
            self.broadcast(DispatchEvent::StepFinished {
                job_id: job.id,
                index,
                status: status.clone(),
                duration_ms,
                timestamp: Utc::now(),
            });

            let transition = if status.is_success() {
                Transition::StepSucceeded
            } else {
                failure = Some(step_error(index, &status));
                Transition::StepFailed
            };

            steps.push(StepReport {
                index,
                step: step.clone(),
                status,
                duration_ms,
            });

            if let Err(e) = machine.apply(transition) {
                return invalid(machine, steps, e);
            }
        }

        let outcome = match (machine.state(), failure) {
            (ExecutionState::Completed, _) => Outcome::Completed,
            (ExecutionState::Failed(_), Some(error)) => Outcome::failed(error),
            (state, _) => Outcome::failed(JobError::ExecutionFault {
                index: machine.current_step(),
                cause: format!("execution stopped in state {}", state),
            }),
        };
        finish(machine, steps, outcome)
    }

    async fn run_step(&self, step: &Step, job: &Job) -> StepStatus {
        let run = AssertUnwindSafe(self.runner.run(step, job)).catch_unwind();

        let result = match self.step_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(result) => result,
                Err(_) => {
                    return StepStatus::TimedOut {
                        timeout_ms: timeout.as_millis() as u64,
                    };
                }
            },
            None => run.await,
        };

        match result {
            Ok(Ok(output)) => StepStatus::Succeeded { output },
            Ok(Err(cause)) => StepStatus::Failed { cause },
            Err(panic) => StepStatus::Faulted {
                cause: panic_message(&*panic),
            },
        }
    }
}

fn step_error(index: usize, status: &StepStatus) -> JobError {
    match status {
        StepStatus::TimedOut { timeout_ms } => JobError::StepTimeout {
            index,
            timeout_ms: *timeout_ms,
        },
        StepStatus::Faulted { cause } => JobError::ExecutionFault {
            index: Some(index),
            cause: cause.clone(),
        },
        StepStatus::Failed { cause } => JobError::StepFailure {
            index,
            cause: cause.clone(),
        },
        StepStatus::Succeeded { .. } => JobError::StepFailure {
            index,
            cause: "step reported success".to_string(),
        },
    }
}

fn finish(machine: ExecutionMachine, steps: Vec<StepReport>, outcome: Outcome) -> Execution {
    Execution {
        outcome,
        history: machine.history().to_vec(),
        steps,
    }
}

fn invalid(machine: ExecutionMachine, steps: Vec<StepReport>, err: InvalidTransition) -> Execution {
    let error = JobError::ExecutionFault {
        index: machine.current_step(),
        cause: err.to_string(),
    };
    finish(machine, steps, Outcome::failed(error))
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
