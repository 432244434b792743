//! Lifecycle controller owning the queue, the worker pool and the sources.
//!
//! Shutdown always runs in the same order:
//! 1. signal sources to stop and wait for them, up to a grace period,
//! 2. close the queue (sources still running after that are aborted),
//! 3. wait for every worker to drain it and exit,
//! 4. stop the queue actor and collect the ledger.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dispatch_core::{DispatchConfig, DispatchEvent, JobRecord, RunReport};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;

use crate::executor::WorkflowExecutor;
use crate::messages::DispatchError;
use crate::pool::WorkerPool;
use crate::queue::JobQueue;
use crate::resolver::WorkflowResolver;
use crate::source::{JobSource, SourceContext, SourceExit, SourceReport};
use crate::step::StepRunner;
use crate::worker_actor::WorkerContext;

/// Capacity of the observation channel. Slow subscribers lag, they never
/// hold up the core.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long shutdown waits for sources at each stage before moving on.
pub const DEFAULT_SOURCE_GRACE: Duration = Duration::from_secs(5);

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: RunReport,
    pub sources: Vec<SourceReport>,
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    config: DispatchConfig,
    runner: Arc<dyn StepRunner>,
    resolver: Arc<dyn WorkflowResolver>,
    event_tx: Option<broadcast::Sender<DispatchEvent>>,
    source_grace: Duration,
}

impl DispatcherBuilder {
    /// Use an existing event channel, so subscribers see the startup events.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<DispatchEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Bound how long shutdown waits for sources that ignore the signal.
    pub fn with_source_grace(mut self, grace: Duration) -> Self {
        self.source_grace = grace;
        self
    }

    /// Validate the config, then spawn the queue and the worker pool.
    pub async fn start(self) -> Result<Dispatcher, DispatchError> {
        self.config.validate()?;
        let config = self.config;
        let event_tx = self
            .event_tx
            .unwrap_or_else(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0);

        tracing::info!(
            "Starting dispatcher: {} workers, capacity {}, {} policy",
            config.worker_count,
            config.queue_capacity,
            config.admission_policy
        );

        let (queue, queue_handle) = JobQueue::start(
            config.queue_capacity,
            config.admission_policy,
            Some(event_tx.clone()),
        )
        .await?;
        tracing::debug!(
            "Queue ready: capacity {}, {} policy",
            queue.capacity(),
            queue.policy()
        );

        let executor = WorkflowExecutor::new(self.runner)
            .with_step_timeout(config.step_timeout)
            .with_event_tx(event_tx.clone());

        let (records_tx, records_rx) = mpsc::unbounded_channel();
        let context = WorkerContext {
            queue: queue.clone(),
            executor: Arc::new(executor),
            resolver: self.resolver,
            records: records_tx,
            event_tx: Some(event_tx.clone()),
        };

        let pool = match WorkerPool::start(config.worker_count, context).await {
            Ok(pool) => pool,
            Err(e) => {
                queue.shutdown();
                return Err(e);
            }
        };

        tracing::debug!("Workers: {}", pool.worker_ids().join(", "));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Dispatcher {
            config,
            queue,
            queue_handle,
            pool,
            sources: JoinSet::new(),
            source_reports: Vec::new(),
            shutdown_tx,
            source_grace: self.source_grace,
            records_rx,
            event_tx,
        })
    }
}

/// Owns one run: a queue, a fixed worker pool, and any number of sources.
pub struct Dispatcher {
    config: DispatchConfig,
    queue: JobQueue,
    queue_handle: tokio::task::JoinHandle<()>,
    pool: WorkerPool,
    sources: JoinSet<SourceReport>,
    source_reports: Vec<SourceReport>,
    shutdown_tx: watch::Sender<bool>,
    source_grace: Duration,
    records_rx: mpsc::UnboundedReceiver<JobRecord>,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl Dispatcher {
    pub fn builder(
        config: DispatchConfig,
        runner: Arc<dyn StepRunner>,
        resolver: Arc<dyn WorkflowResolver>,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            config,
            runner,
            resolver,
            event_tx: None,
            source_grace: DEFAULT_SOURCE_GRACE,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Handle for submitting jobs directly, outside any source.
    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    /// Subscribe to the observation stream.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.size()
    }

    /// Start a source on its own task.
    pub fn add_source<S: JobSource>(&mut self, source: S) {
        let name = source.name().to_string();
        let ctx = SourceContext::new(self.queue.clone(), self.shutdown_tx.subscribe());
        tracing::info!("Starting source '{}'", name);
        self.sources.spawn(Box::new(source).run(ctx));
    }

    /// Wait for every running source to finish on its own.
    ///
    /// Cancel-safe: reports of sources that already finished are kept.
    pub async fn wait_sources(&mut self) {
        while let Some(joined) = self.sources.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!("Source task failed: {}", e);
                    SourceReport {
                        exit: SourceExit::Aborted,
                        ..SourceReport::new("unknown")
                    }
                }
            };
            tracing::info!(
                "Source '{}' finished ({:?}): {} submitted, {} rejected",
                report.name,
                report.exit,
                report.submitted,
                report.rejected
            );
            self.source_reports.push(report);
        }
    }

    /// Run until every source has finished or `signal` fires, whichever is
    /// first, then shut down.
    pub async fn run_until<F>(mut self, signal: F) -> Result<RunSummary, DispatchError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.wait_sources() => tracing::info!("All sources finished"),
            _ = signal => tracing::info!("Shutdown signal received"),
        }
        self.shutdown().await
    }

    /// Stop sources, close the queue, and wait for the pool to drain.
    pub async fn shutdown(mut self) -> Result<RunSummary, DispatchError> {
        tracing::info!("Stopping sources");
        let _ = self.shutdown_tx.send(true);
        let grace = self.source_grace;
        if tokio::time::timeout(grace, self.wait_sources()).await.is_err() {
            // Sources blocked in submit are released with `QueueClosed`.
            tracing::warn!("Sources still running after {:?}, closing the queue", grace);
            self.queue.close();
            if tokio::time::timeout(grace, self.wait_sources()).await.is_err() {
                tracing::warn!("Aborting {} sources that ignore shutdown", self.sources.len());
                self.sources.abort_all();
                self.wait_sources().await;
            }
        }

        tracing::info!("Closing queue and waiting for workers to drain");
        self.queue.close();
        self.pool.wait_drained().await?;

        let leftover = self.queue.stats().await.map_or(0, |s| s.pending);
        self.queue.shutdown();
        if let Err(e) = self.queue_handle.await {
            tracing::warn!("Queue actor task failed: {}", e);
        }

        // Every worker has exited, so every record is already in the channel.
        let mut report = RunReport::default();
        while let Ok(record) = self.records_rx.try_recv() {
            report.push(record);
        }

        if leftover > 0 {
            return Err(DispatchError::Undrained { pending: leftover });
        }

        tracing::info!(
            "Run complete: {} jobs, {} completed, {} failed",
            report.executed(),
            report.completed(),
            report.failed()
        );

        Ok(RunSummary {
            report,
            sources: self.source_reports,
        })
    }
}
