//! Core domain types for the job dispatch system.
//!
//! This crate contains the runtime-free types shared by every package:
//! - Job and JobId for units of work
//! - Workflow and Step, plus the JSON definition parser
//! - ExecutionMachine, the explicit per-job state machine
//! - Outcome and JobError for per-job results
//! - DispatchEvent for the observation stream
//! - DispatchConfig, AdmissionPolicy and SubmitError for the queue contract

mod config;
mod events;
mod execution;
mod job;
mod outcome;
mod queue;
mod report;
mod workflow;

pub use config::{ConfigError, DispatchConfig};
pub use events::DispatchEvent;
pub use execution::{ExecutionMachine, ExecutionState, InvalidTransition, Transition};
pub use job::{Job, JobId};
pub use outcome::{JobError, Outcome, StepOutput, StepStatus};
pub use queue::{AdmissionPolicy, QueueStats, SubmitError};
pub use report::{JobRecord, RunReport};
pub use workflow::{ParseError, Step, Workflow};
