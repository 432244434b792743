//! Shared helpers for the actor integration tests.

#![allow(clippy::disallowed_methods, dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dispatch_actors::{JobQueue, StepFuture, StepRunner};
use dispatch_core::{Job, JobId, QueueStats, Step, StepOutput};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// One step invocation seen by [`ScriptRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCall {
    pub job_id: JobId,
    pub command: String,
}

/// Step runner whose behavior is spelled out in the step text:
///
/// - `fail` returns an error
/// - `panic` panics
/// - `sleep <ms>` waits, then succeeds
/// - anything else succeeds at once
///
/// Every call is logged before it runs.
#[derive(Clone, Default)]
pub struct ScriptRunner {
    calls: Arc<Mutex<Vec<StepCall>>>,
}

impl ScriptRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<StepCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, job_id: JobId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.job_id == job_id)
            .map(|c| c.command)
            .collect()
    }

    pub fn shared(&self) -> Arc<dyn StepRunner> {
        Arc::new(self.clone())
    }
}

impl StepRunner for ScriptRunner {
    fn run<'a>(&'a self, step: &'a Step, job: &'a Job) -> StepFuture<'a> {
        Box::pin(async move {
            let command = step.command().to_string();
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(StepCall {
                    job_id: job.id,
                    command: command.clone(),
                });
            }

            if command == "fail" {
                return Err("step failed on purpose".to_string());
            }
            if command == "panic" {
                panic!("step panicked on purpose");
            }
            if let Some(ms) = command.strip_prefix("sleep ") {
                let ms: u64 = ms.trim().parse().map_err(|_| "bad sleep".to_string())?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            Ok(StepOutput::new(command))
        })
    }
}

/// `n` jobs named `<prefix>-0` .. `<prefix>-{n-1}`.
pub fn jobs(prefix: &str, n: usize) -> Vec<Job> {
    (0..n).map(|i| Job::new(format!("{}-{}", prefix, i))).collect()
}

/// Poll queue stats until `pred` holds. Panics after two seconds.
pub async fn wait_for_stats<F>(queue: &JobQueue, pred: F) -> QueueStats
where
    F: Fn(&QueueStats) -> bool,
{
    let poll = async {
        loop {
            if let Some(stats) = queue.stats().await
                && pred(&stats)
            {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    match tokio::time::timeout(Duration::from_secs(2), poll).await {
        Ok(stats) => stats,
        Err(_) => panic!("queue never reached the expected state"),
    }
}

/// Small deterministic generator so randomized runs are reproducible.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform-ish value in `lo..=hi`.
    pub fn range(&mut self, lo: u64, hi: u64) -> u64 {
        lo + self.next_u64() % (hi - lo + 1)
    }
}
