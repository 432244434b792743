//! Job domain types for units of work flowing through the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl std::str::FromStr for JobId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A job is one unit of work handed from a source to exactly one worker.
///
/// Jobs are immutable once submitted: the queue moves them, it never edits them.
/// The payload is opaque to the core; workflow resolvers decide what it means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Display name used in logs and the run ledger.
    pub name: String,
    /// Collaborator-defined payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// When the job was created by its source.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job with an empty payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            payload: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Attach a payload to this job.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn job_ids_round_trip_through_text() -> Result<(), ulid::DecodeError> {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse()?;
        assert_eq!(parsed, id);
        assert!("not-a-ulid".parse::<JobId>().is_err());
        Ok(())
    }

    #[test]
    fn payload_defaults_to_null() -> Result<(), serde_json::Error> {
        let job: Job = serde_json::from_value(serde_json::json!({
            "id": JobId::new(),
            "name": "bare",
            "created_at": Utc::now(),
        }))?;
        assert!(job.payload.is_null());
        Ok(())
    }
}
