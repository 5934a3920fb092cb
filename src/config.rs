//! Configuration management for lakequery.
//!
//! Handles loading configuration from TOML files and environment variables,
//! and turning it into runner and client settings.

use crate::engine::HttpEngineConfig;
use crate::error::{QueryError, Result};
use crate::poll::{
    PollPolicy, DEFAULT_MAX_RESUBMISSIONS, DEFAULT_NO_PROGRESS_THRESHOLD,
};
use crate::runner::{RunnerConfig, DEFAULT_DATABASE};
use crate::storage::S3StoreConfig;
use crate::submit::{SubmitPolicy, DEFAULT_SUBMIT_MAX_ATTEMPTS, TRANSIENT_RETRY_DELAY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for lakequery.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Query engine connection settings.
    #[serde(default)]
    pub engine: EndpointConfig,

    /// Object storage connection settings.
    #[serde(default)]
    pub storage: EndpointConfig,

    /// Query behavior.
    #[serde(default)]
    pub query: QueryConfig,
}

/// Connection settings for a remote HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL.
    pub endpoint: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Query behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Where the engine writes results (`s3://bucket/prefix/`).
    pub output_location: Option<String>,

    /// Database used when a query does not name one (`default` if unset).
    pub database: Option<String>,

    /// Wait between status checks, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Decode results into records instead of raw lines.
    #[serde(default = "default_true")]
    pub format_json: bool,

    /// Attach scanned-data statistics and a cost estimate.
    #[serde(default)]
    pub get_stats: bool,

    /// Consecutive in-progress checks before an execution counts as stuck.
    #[serde(default = "default_no_progress_threshold")]
    pub no_progress_threshold: u32,

    /// Stuck executions resubmitted per run before giving up.
    #[serde(default = "default_max_resubmissions")]
    pub max_resubmissions: u32,

    /// Submission attempts on transient errors; 0 retries forever.
    #[serde(default = "default_submit_max_attempts")]
    pub submit_max_attempts: u32,

    /// Deadline for a whole run, in seconds.
    pub timeout_secs: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

fn default_no_progress_threshold() -> u32 {
    DEFAULT_NO_PROGRESS_THRESHOLD
}

fn default_max_resubmissions() -> u32 {
    DEFAULT_MAX_RESUBMISSIONS
}

fn default_submit_max_attempts() -> u32 {
    DEFAULT_SUBMIT_MAX_ATTEMPTS
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            output_location: None,
            database: None,
            poll_interval_ms: default_poll_interval_ms(),
            format_json: true,
            get_stats: false,
            no_progress_threshold: default_no_progress_threshold(),
            max_resubmissions: default_max_resubmissions(),
            submit_max_attempts: default_submit_max_attempts(),
            timeout_secs: None,
        }
    }
}

impl QueryConfig {
    /// Builds the runner configuration. Requires an output location.
    pub fn to_runner_config(&self) -> Result<RunnerConfig> {
        let output_location = self.output_location.as_deref().ok_or_else(|| {
            QueryError::config(
                "No output location configured. Set query.output_location or LAKEQUERY_OUTPUT_LOCATION",
            )
        })?;

        let submit = SubmitPolicy {
            retry_delay: TRANSIENT_RETRY_DELAY,
            max_attempts: (self.submit_max_attempts > 0).then_some(self.submit_max_attempts),
        };
        let poll = PollPolicy {
            base_interval: Duration::from_millis(self.poll_interval_ms),
            no_progress_threshold: self.no_progress_threshold,
            max_resubmissions: self.max_resubmissions,
            ..PollPolicy::default()
        };

        let mut config = RunnerConfig::new(output_location)
            .with_database(self.database.as_deref().unwrap_or(DEFAULT_DATABASE))
            .with_format_json(self.format_json)
            .with_stats(self.get_stats)
            .with_submit_policy(submit)
            .with_poll_policy(poll);
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lakequery")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| QueryError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            QueryError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies environment variables as defaults for unset values.
    pub fn apply_env_defaults(&mut self) {
        if self.engine.endpoint.is_none() {
            self.engine.endpoint = std::env::var("LAKEQUERY_ENGINE_URL").ok();
        }
        if self.storage.endpoint.is_none() {
            self.storage.endpoint = std::env::var("LAKEQUERY_STORAGE_URL").ok();
        }
        if self.query.output_location.is_none() {
            self.query.output_location = std::env::var("LAKEQUERY_OUTPUT_LOCATION").ok();
        }
        if self.query.database.is_none() {
            self.query.database = std::env::var("LAKEQUERY_DATABASE").ok();
        }
    }

    /// Returns the engine client configuration.
    pub fn engine_config(&self) -> Result<HttpEngineConfig> {
        let endpoint = self.engine.endpoint.as_deref().ok_or_else(|| {
            QueryError::config(
                "No query engine endpoint configured. Set engine.endpoint or LAKEQUERY_ENGINE_URL",
            )
        })?;
        Ok(HttpEngineConfig::new(endpoint).with_timeout(self.engine.timeout_secs))
    }

    /// Returns the object store client configuration.
    pub fn storage_config(&self) -> Result<S3StoreConfig> {
        let endpoint = self.storage.endpoint.as_deref().ok_or_else(|| {
            QueryError::config(
                "No storage endpoint configured. Set storage.endpoint or LAKEQUERY_STORAGE_URL",
            )
        })?;
        Ok(S3StoreConfig::new(endpoint).with_timeout(self.storage.timeout_secs))
    }
}
