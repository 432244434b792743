//! Actor runtime for the job dispatcher.
//!
//! This crate provides the Ractor-based pieces that move jobs from sources
//! through a bounded queue to a fixed pool of workers.
//!
//! # Architecture
//!
//! - `QueueActor` - Owns the bounded queue, parked takers and parked submitters
//! - `WorkerActor` - Takes jobs one at a time and runs their workflow
//! - `WorkflowExecutor` - Runs a workflow's steps in order through a `StepRunner`
//! - `Dispatcher` - Starts everything, runs sources, and drains on shutdown
//!
//! # Usage
//!
//! ```ignore
//! use dispatch_actors::{BatchSource, Dispatcher, SharedWorkflow, ShellRunner};
//!
//! let resolver = SharedWorkflow::parse(definition)?;
//! let mut dispatcher = Dispatcher::builder(config, Arc::new(ShellRunner::new()), Arc::new(resolver))
//!     .start()
//!     .await?;
//! dispatcher.add_source(BatchSource::new("batch", jobs));
//! let summary = dispatcher.run_until(shutdown_signal()).await?;
//! ```

mod dispatcher;
mod executor;
mod messages;
mod pool;
mod queue;
mod queue_actor;
mod resolver;
mod source;
mod step;
mod worker_actor;

pub use dispatcher::{DEFAULT_SOURCE_GRACE, Dispatcher, DispatcherBuilder, RunSummary};
pub use executor::{Execution, StepReport, WorkflowExecutor};
pub use messages::{DispatchError, QueueMessage, WorkerMessage};
pub use pool::WorkerPool;
pub use queue::JobQueue;
pub use queue_actor::{QueueActor, QueueActorState};
pub use resolver::{
    DefinitionWorkflow, PAYLOAD_WORKFLOW_KEY, PayloadWorkflow, SharedWorkflow, WorkflowResolver,
};
pub use source::{
    BatchSource, DEFAULT_ERROR_BACKOFF, DEFAULT_POLL_INTERVAL, FetchFuture, FetchResult,
    JobFetcher, JobSource, PollingSource, SourceContext, SourceExit, SourceFuture, SourceReport,
};
pub use step::{FnRunner, ShellRunner, StepFuture, StepResult, StepRunner};
pub use worker_actor::{WorkerActor, WorkerArgs, WorkerContext};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
