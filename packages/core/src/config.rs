//! Dispatcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::AdmissionPolicy;

pub const ENV_WORKERS: &str = "DISPATCH_WORKERS";
pub const ENV_QUEUE_CAPACITY: &str = "DISPATCH_QUEUE_CAPACITY";
pub const ENV_ADMISSION: &str = "DISPATCH_ADMISSION";
pub const ENV_STEP_TIMEOUT_SECS: &str = "DISPATCH_STEP_TIMEOUT_SECS";

/// Configuration for the queue and worker pool, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of parallel workers. Must be at least 1.
    pub worker_count: usize,
    /// Queue capacity. 0 means synchronous handoff.
    pub queue_capacity: usize,
    /// What `submit` does on a full queue.
    pub admission_policy: AdmissionPolicy,
    /// Per-step timeout. `None` lets steps run as long as they need.
    #[serde(with = "optional_secs", skip_serializing_if = "Option::is_none")]
    pub step_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            queue_capacity: 10,
            admission_policy: AdmissionPolicy::Block,
            step_timeout: None,
        }
    }
}

impl DispatchConfig {
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_policy(mut self, admission_policy: AdmissionPolicy) -> Self {
        self.admission_policy = admission_policy;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    /// Defaults overlaid with `DISPATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = read(ENV_WORKERS) {
            config.worker_count = parse_number(ENV_WORKERS, &value)?;
        }
        if let Some(value) = read(ENV_QUEUE_CAPACITY) {
            config.queue_capacity = parse_number(ENV_QUEUE_CAPACITY, &value)?;
        }
        if let Some(value) = read(ENV_ADMISSION) {
            config.admission_policy =
                AdmissionPolicy::parse(&value).ok_or_else(|| ConfigError::Invalid {
                    key: ENV_ADMISSION,
                    value: value.clone(),
                })?;
        }
        if let Some(value) = read(ENV_STEP_TIMEOUT_SECS) {
            let secs: u64 = parse_number(ENV_STEP_TIMEOUT_SECS, &value)?;
            config.step_timeout = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("worker_count must be at least 1")]
    NoWorkers,

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        secs.map(Duration::try_from_secs_f64)
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
