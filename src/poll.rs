//! Completion polling with stuck-execution recovery.
//!
//! The poller checks an execution's status until it finishes. An execution
//! that stays non-terminal for more than `no_progress_threshold` consecutive
//! checks is treated as wedged: it is stopped and the original request is
//! resubmitted, at most `max_resubmissions` times per run.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::engine::{ExecutionHandle, ExecutionState, ExecutionStatus, QueryEngine, QueryRequest};
use crate::error::{QueryError, Result};
use crate::submit::{ExecutionSubmitter, TRANSIENT_RETRY_DELAY};

/// Default wait between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default number of consecutive non-terminal checks tolerated before recovery.
pub const DEFAULT_NO_PROGRESS_THRESHOLD: u32 = 3;

/// Default number of resubmissions allowed per run.
pub const DEFAULT_MAX_RESUBMISSIONS: u32 = 2;

/// Polling and recovery policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait between checks while the engine answers normally.
    pub base_interval: Duration,
    /// Wait after a transient error.
    pub transient_delay: Duration,
    /// Consecutive in-progress checks tolerated; one more marks the
    /// execution as stuck.
    pub no_progress_threshold: u32,
    /// Stuck executions replaced per run before giving up.
    pub max_resubmissions: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            base_interval: DEFAULT_POLL_INTERVAL,
            transient_delay: TRANSIENT_RETRY_DELAY,
            no_progress_threshold: DEFAULT_NO_PROGRESS_THRESHOLD,
            max_resubmissions: DEFAULT_MAX_RESUBMISSIONS,
        }
    }
}

/// Mutable state of one query run.
///
/// Owned by a single run and never shared; at most one handle is live at a
/// time.
#[derive(Debug)]
pub struct RunState {
    live: Option<ExecutionHandle>,
    no_progress: u32,
    resubmissions: u32,
    interval: Duration,
}

impl RunState {
    /// Creates an empty run state with no live execution.
    pub fn new(base_interval: Duration) -> Self {
        Self {
            live: None,
            no_progress: 0,
            resubmissions: 0,
            interval: base_interval,
        }
    }

    /// Returns the execution currently being polled, if any.
    pub fn live_handle(&self) -> Option<&ExecutionHandle> {
        self.live.as_ref()
    }

    pub fn no_progress(&self) -> u32 {
        self.no_progress
    }

    pub fn resubmissions(&self) -> u32 {
        self.resubmissions
    }

    /// Wait before the next status check.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Makes `handle` the live execution.
    pub fn activate(&mut self, handle: ExecutionHandle) {
        self.live = Some(handle);
        self.no_progress = 0;
    }

    /// Retires the live execution, returning it.
    pub fn retire(&mut self) -> Option<ExecutionHandle> {
        self.live.take()
    }
}

/// Polls an execution until it reaches a terminal state.
pub struct CompletionPoller<'a> {
    engine: &'a dyn QueryEngine,
    submitter: &'a ExecutionSubmitter<'a>,
    request: &'a QueryRequest,
    policy: &'a PollPolicy,
}

impl<'a> CompletionPoller<'a> {
    /// Creates a new poller. `request` is resubmitted during stuck recovery.
    pub fn new(
        engine: &'a dyn QueryEngine,
        submitter: &'a ExecutionSubmitter<'a>,
        request: &'a QueryRequest,
        policy: &'a PollPolicy,
    ) -> Self {
        Self {
            engine,
            submitter,
            request,
            policy,
        }
    }

    /// Polls the live execution in `state` until it succeeds or fails.
    ///
    /// On success the finished execution is retired from `state` and its
    /// status returned.
    pub async fn poll(&self, state: &mut RunState) -> Result<ExecutionStatus> {
        loop {
            let handle = state
                .live
                .clone()
                .ok_or_else(|| QueryError::internal("No live execution to poll"))?;

            match self.engine.get_execution(&handle).await {
                Ok(status) => {
                    state.interval = self.policy.base_interval;

                    match status.state {
                        ExecutionState::Succeeded => {
                            info!(execution_id = %handle, "Query succeeded");
                            state.retire();
                            return Ok(status);
                        }
                        ExecutionState::Failed => {
                            state.retire();
                            let reason = status
                                .state_change_reason
                                .unwrap_or_else(|| "no reason reported".to_string());
                            warn!(execution_id = %handle, "Query failed: {}", reason);
                            return Err(QueryError::ExecutionFailed(reason));
                        }
                        ExecutionState::Cancelled => {
                            state.retire();
                            let reason = status
                                .state_change_reason
                                .unwrap_or_else(|| "Query execution was cancelled".to_string());
                            warn!(execution_id = %handle, "Query cancelled: {}", reason);
                            return Err(QueryError::ExecutionFailed(reason));
                        }
                        ExecutionState::Queued | ExecutionState::Running | ExecutionState::Unknown => {
                            state.no_progress += 1;
                            debug!(
                                execution_id = %handle,
                                state = %status.state,
                                no_progress = state.no_progress,
                                "Query still in progress"
                            );

                            if state.no_progress > self.policy.no_progress_threshold {
                                self.recover(state).await?;
                            }
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        execution_id = %handle,
                        "Status check failed, retrying in {:?}: {}",
                        self.policy.transient_delay, e
                    );
                    state.interval = self.policy.transient_delay;
                }
                Err(e) => return Err(QueryError::Remote(e)),
            }

            tokio::time::sleep(state.interval).await;
        }
    }

    /// Replaces a stuck execution with a fresh submission, or gives up once
    /// the resubmission cap is reached.
    async fn recover(&self, state: &mut RunState) -> Result<()> {
        if state.resubmissions >= self.policy.max_resubmissions {
            warn!(
                resubmissions = state.resubmissions,
                "Execution still stuck after maximum resubmissions, giving up"
            );
            self.stop_live(state).await;
            return Err(QueryError::StuckExecutionExhausted {
                resubmissions: state.resubmissions,
            });
        }

        if let Some(handle) = state.live_handle() {
            warn!(
                execution_id = %handle,
                checks = state.no_progress,
                "Execution made no progress, stopping and resubmitting"
            );
        }
        self.stop_live(state).await;

        let handle = self.submitter.submit(self.request).await?;
        state.activate(handle);
        state.resubmissions += 1;
        Ok(())
    }

    /// Stops the live execution, then retires it.
    ///
    /// The handle stays live until the stop call returns. Failures are
    /// logged; the handle is retired either way.
    async fn stop_live(&self, state: &mut RunState) {
        let Some(handle) = state.live.clone() else {
            return;
        };
        if let Err(e) = self.engine.stop_execution(&handle).await {
            warn!(execution_id = %handle, "Failed to stop execution: {}", e);
        }
        state.retire();
    }
}
