//! Per-job ledger produced by a dispatcher run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, Outcome};

/// What happened to one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub job_name: String,
    pub worker_id: String,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

/// The success/failure ledger for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub records: Vec<JobRecord>,
}

impl RunReport {
    pub fn push(&mut self, record: JobRecord) {
        self.records.push(record);
    }

    /// Total jobs executed.
    pub fn executed(&self) -> usize {
        self.records.len()
    }

    pub fn completed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome.is_completed())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.executed() - self.completed()
    }

    pub fn get(&self, job_id: JobId) -> Option<&JobRecord> {
        self.records.iter().find(|r| r.job_id == job_id)
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.executed();
        if total == 0 {
            None
        } else {
            Some((self.completed() as f64 / total as f64) * 100.0)
        }
    }
}
