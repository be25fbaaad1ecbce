//! Configuration management.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cursor::{DeprecationHandler, EnforcementMode, SerializabilityPolicy};
use crate::enumerator::{EnumeratorBuilder, DEFAULT_BATCH_SIZE};
use crate::error::{ErrorCode, ResumableError, Result};
use crate::jobs::{IterationRunner, WorkerConfig};
use crate::telemetry::LoggingConfig;

/// Environment variable prefix, e.g. `RESUMABLE__RUNNER__BATCH_SIZE=500`.
pub const ENV_PREFIX: &str = "RESUMABLE";

/// Main engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cursor serializability enforcement
    #[serde(default)]
    pub enforcement: EnforcementConfig,

    /// Slice limits and paging
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Worker loop
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementConfig {
    /// `warn` before the horizon, `strict` after it
    #[serde(default)]
    pub mode: EnforcementMode,

    /// Label naming the point where warnings become failures
    #[serde(default = "default_horizon")]
    pub horizon: String,

    /// Source identifier attached to deprecation notices
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            mode: EnforcementMode::default(),
            horizon: default_horizon(),
            source: default_source(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Wall-clock budget of one slice
    #[serde(default = "default_max_slice_runtime", with = "humantime_serde")]
    pub max_slice_runtime: Duration,

    /// Optional cap on items per slice
    #[serde(default)]
    pub max_iterations_per_slice: Option<u64>,

    /// Page size for paged sources
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_slice_runtime: default_max_slice_runtime(),
            max_iterations_per_slice: None,
            batch_size: default_batch_size(),
        }
    }
}

// Default value functions
fn default_horizon() -> String { "next major release".to_string() }
fn default_source() -> String { "resumable".to_string() }
fn default_max_slice_runtime() -> Duration { Duration::from_secs(300) }
fn default_batch_size() -> usize { DEFAULT_BATCH_SIZE }

impl EngineConfig {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: EngineConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: EngineConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings no slice could run under.
    pub fn validate(&self) -> Result<()> {
        if self.runner.batch_size == 0 {
            return Err(invalid("runner.batch_size must be greater than zero"));
        }
        if self.runner.max_slice_runtime.is_zero() {
            return Err(invalid("runner.max_slice_runtime must be greater than zero"));
        }
        if self.runner.max_iterations_per_slice == Some(0) {
            return Err(invalid("runner.max_iterations_per_slice must be greater than zero"));
        }
        if self.worker.poll_interval.is_zero() {
            return Err(invalid("worker.poll_interval must be greater than zero"));
        }
        Ok(())
    }

    /// Policy configured by the `enforcement` section, with the default handler.
    pub fn policy(&self) -> SerializabilityPolicy {
        SerializabilityPolicy::new(self.enforcement.mode)
            .with_horizon(self.enforcement.horizon.clone())
            .with_source(self.enforcement.source.clone())
    }

    /// Same as [`policy`](Self::policy), routing notices to `handler`.
    pub fn policy_with_handler(&self, handler: Arc<dyn DeprecationHandler>) -> SerializabilityPolicy {
        self.policy().with_handler(handler)
    }

    pub fn runner(&self) -> IterationRunner {
        IterationRunner::new(self.policy())
    }

    pub fn enumerator_builder(&self) -> EnumeratorBuilder {
        EnumeratorBuilder::new().with_batch_size(self.runner.batch_size)
    }
}

fn invalid(message: &'static str) -> ResumableError {
    ResumableError::new(ErrorCode::InvalidConfiguration, message)
}
