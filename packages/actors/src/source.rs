//! Job sources: producers that push jobs into the queue.
//!
//! A source only ever talks to the core through [`SourceContext`]: it
//! submits jobs and watches for the shutdown signal.
//! How it finds jobs, how often it looks, and what it does when the queue
//! is full are its own business.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use dispatch_core::{Job, SubmitError};
use tokio::sync::watch;

use crate::queue::JobQueue;

/// Future returned by [`JobSource::run`].
pub type SourceFuture = Pin<Box<dyn Future<Output = SourceReport> + Send>>;

/// A producer of jobs.
pub trait JobSource: Send + 'static {
    fn name(&self) -> &str;

    /// Produce jobs until done, shut down, or the queue closes.
    fn run(self: Box<Self>, ctx: SourceContext) -> SourceFuture;
}

/// Why a source stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceExit {
    /// Nothing left to submit.
    Exhausted,
    /// The dispatcher asked sources to stop.
    Shutdown,
    /// A submission came back with `QueueClosed`.
    QueueClosed,
    /// The source task panicked or was aborted.
    Aborted,
}

/// Summary of one source's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub name: String,
    pub submitted: u64,
    pub rejected: u64,
    pub exit: SourceExit,
}

impl SourceReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            submitted: 0,
            rejected: 0,
            exit: SourceExit::Exhausted,
        }
    }

    fn exit(mut self, exit: SourceExit) -> Self {
        self.exit = exit;
        self
    }
}

/// A source's view of the dispatcher: the queue and the shutdown signal.
#[derive(Clone)]
pub struct SourceContext {
    queue: JobQueue,
    shutdown: watch::Receiver<bool>,
}

impl SourceContext {
    pub fn new(queue: JobQueue, shutdown: watch::Receiver<bool>) -> Self {
        Self { queue, shutdown }
    }

    pub async fn submit(&self, job: Job) -> Result<(), SubmitError> {
        self.queue.submit(job).await
    }

    /// Submit `job` unless shutdown is requested first. `None` means the
    /// source was told to stop and the job was not submitted.
    ///
    /// A submit still parked on a full queue when shutdown arrives is
    /// abandoned, and the queue skips it.
    pub async fn submit_until_shutdown(&mut self, job: Job) -> Option<Result<(), SubmitError>> {
        if self.is_shutdown() {
            return None;
        }
        let queue = self.queue.clone();
        tokio::select! {
            biased;
            result = queue.submit(job) => Some(result),
            _ = self.shutdown_requested() => None,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown is requested or the dispatcher is gone.
    pub async fn shutdown_requested(&mut self) {
        while !*self.shutdown.borrow_and_update() {
            if self.shutdown.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `duration` unless shutdown comes first. Returns `false`
    /// if the sleep was cut short.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.shutdown_requested() => false,
        }
    }
}

/// Submits a fixed list of jobs, optionally spaced out, then finishes.
///
/// A `QueueFull` rejection is retried after `retry_delay`; `QueueClosed`
/// ends the batch.
pub struct BatchSource {
    name: String,
    jobs: VecDeque<Job>,
    interval: Option<Duration>,
    retry_delay: Duration,
}

impl BatchSource {
    pub fn new(name: impl Into<String>, jobs: impl IntoIterator<Item = Job>) -> Self {
        Self {
            name: name.into(),
            jobs: jobs.into_iter().collect(),
            interval: None,
            retry_delay: Duration::from_millis(500),
        }
    }

    /// Wait this long between consecutive submissions.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn produce(mut self, mut ctx: SourceContext) -> SourceReport {
        let mut report = SourceReport::new(&self.name);
        tracing::info!("Source '{}' submitting {} jobs", self.name, self.jobs.len());

        while let Some(job) = self.jobs.pop_front() {
            loop {
                let Some(result) = ctx.submit_until_shutdown(job.clone()).await else {
                    return report.exit(SourceExit::Shutdown);
                };
                match result {
                    Ok(()) => {
                        report.submitted += 1;
                        break;
                    }
                    Err(SubmitError::QueueFull) => {
                        report.rejected += 1;
                        tracing::debug!("Source '{}': queue full, retrying job {}", self.name, job.id);
                        if !ctx.sleep(self.retry_delay).await {
                            return report.exit(SourceExit::Shutdown);
                        }
                    }
                    Err(SubmitError::QueueClosed) => {
                        report.rejected += 1;
                        return report.exit(SourceExit::QueueClosed);
                    }
                }
            }

            if let Some(interval) = self.interval
                && !self.jobs.is_empty()
                && !ctx.sleep(interval).await
            {
                return report.exit(SourceExit::Shutdown);
            }
        }

        report.exit(SourceExit::Exhausted)
    }
}

impl JobSource for BatchSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>, ctx: SourceContext) -> SourceFuture {
        Box::pin((*self).produce(ctx))
    }
}

/// Result type for a single poll.
pub type FetchResult = Result<Vec<Job>, String>;

/// Future type for async fetchers.
pub type FetchFuture = Pin<Box<dyn Future<Output = FetchResult> + Send>>;

/// Fetches whatever jobs a remote system currently has for us.
pub trait JobFetcher: Send + Sync + 'static {
    fn fetch(&self) -> FetchFuture;
}

impl<F> JobFetcher for F
where
    F: Fn() -> FetchFuture + Send + Sync + 'static,
{
    fn fetch(&self) -> FetchFuture {
        self()
    }
}

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default wait after a failed poll.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// Polls a [`JobFetcher`] on a fixed cadence and submits what it returns.
///
/// Runs until shutdown, until the queue closes, or for `max_polls` polls
/// if set. Jobs rejected with `QueueFull` are dropped; the remote side is
/// expected to hand them out again on a later poll.
pub struct PollingSource<F: JobFetcher> {
    name: String,
    fetcher: F,
    interval: Duration,
    error_backoff: Duration,
    max_polls: Option<u64>,
}

impl<F: JobFetcher> PollingSource<F> {
    pub fn new(name: impl Into<String>, fetcher: F) -> Self {
        Self {
            name: name.into(),
            fetcher,
            interval: DEFAULT_POLL_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            max_polls: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Stop after this many polls, successful or not.
    pub fn with_max_polls(mut self, max_polls: u64) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    async fn produce(self, mut ctx: SourceContext) -> SourceReport {
        let mut report = SourceReport::new(&self.name);
        let mut polls = 0u64;

        loop {
            if ctx.is_shutdown() {
                return report.exit(SourceExit::Shutdown);
            }

            tracing::info!("Source '{}' polling for new jobs", self.name);
            let fetched = self.fetcher.fetch().await;
            polls += 1;

            let pause = match fetched {
                Ok(jobs) => {
                    tracing::debug!("Source '{}' fetched {} jobs", self.name, jobs.len());
                    for job in jobs {
                        let job_id = job.id;
                        let Some(result) = ctx.submit_until_shutdown(job).await else {
                            tracing::info!(
                                "Source '{}' stopping with unsubmitted jobs from the last poll",
                                self.name
                            );
                            return report.exit(SourceExit::Shutdown);
                        };
                        match result {
                            Ok(()) => report.submitted += 1,
                            Err(SubmitError::QueueFull) => {
                                report.rejected += 1;
                                tracing::warn!("Source '{}': queue full, dropped job {}", self.name, job_id);
                            }
                            Err(SubmitError::QueueClosed) => {
                                report.rejected += 1;
                                return report.exit(SourceExit::QueueClosed);
                            }
                        }
                    }
                    self.interval
                }
                Err(e) => {
                    tracing::warn!("Source '{}': error polling jobs: {}", self.name, e);
                    self.error_backoff
                }
            };

            if self.max_polls.is_some_and(|max| polls >= max) {
                return report.exit(SourceExit::Exhausted);
            }
            if !ctx.sleep(pause).await {
                return report.exit(SourceExit::Shutdown);
            }
        }
    }
}

impl<F: JobFetcher> JobSource for PollingSource<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>, ctx: SourceContext) -> SourceFuture {
        Box::pin((*self).produce(ctx))
    }
}
