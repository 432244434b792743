//! Terminal results of executing a job.

use serde::{Deserialize, Serialize};

/// Why a job did not complete.
///
/// Every variant is terminal for its job only; none of them stops a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobError {
    /// A step ran and reported failure.
    #[error("step {index} failed: {cause}")]
    StepFailure { index: usize, cause: String },

    /// A step exceeded the configured per-step timeout.
    #[error("step {index} timed out after {timeout_ms}ms")]
    StepTimeout { index: usize, timeout_ms: u64 },

    /// Something panicked while the job was executing. `index` is the step
    /// that was running, when the fault happened inside a step.
    #[error("execution fault: {cause}")]
    ExecutionFault { index: Option<usize>, cause: String },

    /// The job's workflow definition could not be parsed. No step ran.
    #[error("invalid workflow: {cause}")]
    Parse { cause: String },
}

impl JobError {
    /// 0-based index of the step at which execution stopped, if a step was involved.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            JobError::StepFailure { index, .. } | JobError::StepTimeout { index, .. } => {
                Some(*index)
            }
            JobError::ExecutionFault { index, .. } => *index,
            JobError::Parse { .. } => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobError::StepFailure { .. } => "step_failure",
            JobError::StepTimeout { .. } => "step_timeout",
            JobError::ExecutionFault { .. } => "execution_fault",
            JobError::Parse { .. } => "parse_error",
        }
    }
}

/// Result of running one job's workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Every step ran without error.
    Completed,
    /// Execution stopped; see the error for the step and cause.
    Failed { error: JobError },
}

impl Outcome {
    pub fn failed(error: JobError) -> Self {
        Outcome::Failed { error }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    pub fn error(&self) -> Option<&JobError> {
        match self {
            Outcome::Completed => None,
            Outcome::Failed { error } => Some(error),
        }
    }

    /// The step index a failed outcome stopped at.
    pub fn failed_step(&self) -> Option<usize> {
        self.error().and_then(JobError::step_index)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Completed => write!(f, "completed"),
            Outcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Output captured from a successful step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutput {
    /// Short human-readable summary (e.g. the last line of stdout).
    pub summary: String,
}

impl StepOutput {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

/// Result of a single step, as surfaced to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded { output: StepOutput },
    Failed { cause: String },
    TimedOut { timeout_ms: u64 },
    Faulted { cause: String },
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Succeeded { .. })
    }
}
