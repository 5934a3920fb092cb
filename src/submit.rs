//! Query submission with transient-error retry.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::{ExecutionHandle, QueryEngine, QueryRequest, StartExecution};
use crate::error::{QueryError, Result};

/// Fixed delay before retrying after a transient error.
pub const TRANSIENT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Default cap on submission attempts.
pub const DEFAULT_SUBMIT_MAX_ATTEMPTS: u32 = 30;

/// Retry policy for query submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitPolicy {
    /// Wait between attempts after a transient error.
    pub retry_delay: Duration,
    /// Total attempts allowed; `None` retries transient errors forever.
    pub max_attempts: Option<u32>,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            retry_delay: TRANSIENT_RETRY_DELAY,
            max_attempts: Some(DEFAULT_SUBMIT_MAX_ATTEMPTS),
        }
    }
}

/// Starts executions on the engine.
pub struct ExecutionSubmitter<'a> {
    engine: &'a dyn QueryEngine,
    output_location: &'a str,
    default_database: &'a str,
    policy: &'a SubmitPolicy,
}

impl<'a> ExecutionSubmitter<'a> {
    /// Creates a new submitter.
    pub fn new(
        engine: &'a dyn QueryEngine,
        output_location: &'a str,
        default_database: &'a str,
        policy: &'a SubmitPolicy,
    ) -> Self {
        Self {
            engine,
            output_location,
            default_database,
            policy,
        }
    }

    /// Builds the engine parameters for a request.
    pub fn params_for(&self, request: &QueryRequest) -> StartExecution {
        StartExecution {
            query: request.text.clone(),
            output_location: self.output_location.to_string(),
            database: request
                .database
                .clone()
                .unwrap_or_else(|| self.default_database.to_string()),
        }
    }

    /// Submits the request, retrying transient errors after a fixed delay.
    ///
    /// Fatal errors are returned on the attempt that produced them, without
    /// waiting.
    pub async fn submit(&self, request: &QueryRequest) -> Result<ExecutionHandle> {
        let params = self.params_for(request);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!("Query submission attempt {}", attempt);

            let error = match self.engine.start_execution(&params).await {
                Ok(handle) => {
                    info!(execution_id = %handle, database = %params.database, "Query submitted");
                    return Ok(handle);
                }
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(QueryError::Remote(e)),
            };

            if self.policy.max_attempts.is_some_and(|max| attempt >= max) {
                return Err(QueryError::SubmitRetriesExhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            warn!(
                "Query submission failed (attempt {}), retrying in {:?}: {}",
                attempt, self.policy.retry_delay, error
            );
            tokio::time::sleep(self.policy.retry_delay).await;
        }
    }
}
