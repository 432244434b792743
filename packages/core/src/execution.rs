//! Explicit state machine for running one workflow.
//!
//! ```text
//! Pending --start--> Running(0) --step ok--> Running(1) ... --step ok--> Completed
//!                        |                       |
//!                        +------step failed------+----> Failed(i)
//! ```
//!
//! The machine records every state it passes through so callers can check
//! afterwards exactly which steps ran.

use serde::{Deserialize, Serialize};

/// Where an execution currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Running(usize),
    Completed,
    Failed(usize),
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Completed | ExecutionState::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Running(_) => "running",
            ExecutionState::Completed => "completed",
            ExecutionState::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Running(i) => write!(f, "running({})", i),
            ExecutionState::Failed(i) => write!(f, "failed({})", i),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Inputs that move the machine forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    StepSucceeded,
    StepFailed,
}

/// A transition that is not allowed from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {transition:?} in state {state}")]
pub struct InvalidTransition {
    pub state: ExecutionState,
    pub transition: Transition,
}

/// State machine over a workflow with a fixed number of steps.
#[derive(Debug, Clone)]
pub struct ExecutionMachine {
    step_count: usize,
    state: ExecutionState,
    history: Vec<ExecutionState>,
}

impl ExecutionMachine {
    pub fn new(step_count: usize) -> Self {
        Self {
            step_count,
            state: ExecutionState::Pending,
            history: vec![ExecutionState::Pending],
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Every state visited so far, starting with `Pending`.
    pub fn history(&self) -> &[ExecutionState] {
        &self.history
    }

    /// Index of the step that should run now, if any.
    pub fn current_step(&self) -> Option<usize> {
        match self.state {
            ExecutionState::Running(i) => Some(i),
            _ => None,
        }
    }

    /// Number of steps that finished successfully.
    pub fn steps_succeeded(&self) -> usize {
        match self.state {
            ExecutionState::Pending => 0,
            ExecutionState::Running(i) | ExecutionState::Failed(i) => i,
            ExecutionState::Completed => self.step_count,
        }
    }

    pub fn apply(&mut self, transition: Transition) -> Result<ExecutionState, InvalidTransition> {
        let next = match (self.state, transition) {
            (ExecutionState::Pending, Transition::Start) if self.step_count == 0 => {
                ExecutionState::Completed
            }
            (ExecutionState::Pending, Transition::Start) => ExecutionState::Running(0),
            (ExecutionState::Running(i), Transition::StepSucceeded) if i + 1 < self.step_count => {
                ExecutionState::Running(i + 1)
            }
            (ExecutionState::Running(_), Transition::StepSucceeded) => ExecutionState::Completed,
            (ExecutionState::Running(i), Transition::StepFailed) => ExecutionState::Failed(i),
            (state, transition) => return Err(InvalidTransition { state, transition }),
        };
        self.state = next;
        self.history.push(next);
        Ok(next)
    }
}
