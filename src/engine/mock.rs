//! Mock query engine for testing.
//!
//! Replays scripted status sequences and records every call, so retry and
//! recovery behavior can be checked without a real engine.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::engine::{
    ExecutionHandle, ExecutionState, ExecutionStatistics, ExecutionStatus, QueryEngine,
    StartExecution, StatementKind,
};
use crate::error::{RemoteError, RemoteResult};

/// One scripted response to a status check.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Report this state.
    State(ExecutionState),
    /// Report FAILED with the given reason.
    Failed(String),
    /// Fail the status call with this error.
    Error(RemoteError),
}

impl From<ExecutionState> for MockStep {
    fn from(state: ExecutionState) -> Self {
        Self::State(state)
    }
}

/// A mock query engine that replays scripted responses.
///
/// Status scripts are consumed per query text, across all handles started for
/// that query, so a script keeps going after a resubmission. Once a script is
/// exhausted every further check reports RUNNING.
pub struct MockQueryEngine {
    state: Mutex<MockState>,
    statement_kind: Option<StatementKind>,
    statistics: Option<ExecutionStatistics>,
    result_location: Option<String>,
    stop_delay: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    submit_errors: VecDeque<RemoteError>,
    default_script: VecDeque<MockStep>,
    query_scripts: HashMap<String, VecDeque<MockStep>>,
    stop_error: Option<RemoteError>,
    queries_by_handle: HashMap<ExecutionHandle, String>,
    next_id: u32,
    started: Vec<StartExecution>,
    submit_attempts: usize,
    polled: Vec<ExecutionHandle>,
    stopped: Vec<ExecutionHandle>,
}

impl MockQueryEngine {
    /// Creates a mock engine whose executions run forever.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            statement_kind: None,
            statistics: None,
            result_location: None,
            stop_delay: None,
        }
    }

    /// Sets the status script used by queries without their own script.
    pub fn with_statuses(self, steps: impl IntoIterator<Item = MockStep>) -> Self {
        self.lock().default_script = steps.into_iter().collect();
        self
    }

    /// Sets the status script for one query text.
    pub fn with_query_statuses(
        self,
        query: impl Into<String>,
        steps: impl IntoIterator<Item = MockStep>,
    ) -> Self {
        self.lock()
            .query_scripts
            .insert(query.into(), steps.into_iter().collect());
        self
    }

    /// Fails the next submissions with these errors, in order.
    pub fn with_submit_errors(self, errors: impl IntoIterator<Item = RemoteError>) -> Self {
        self.lock().submit_errors = errors.into_iter().collect();
        self
    }

    /// Fails every stop request with this error.
    pub fn with_stop_error(self, error: RemoteError) -> Self {
        self.lock().stop_error = Some(error);
        self
    }

    /// Makes every stop request take this long before it completes.
    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    /// Reports this statement kind on SUCCEEDED. Omitted by default.
    pub fn with_statement_kind(mut self, kind: StatementKind) -> Self {
        self.statement_kind = Some(kind);
        self
    }

    /// Reports these statistics on SUCCEEDED.
    pub fn with_statistics(mut self, statistics: ExecutionStatistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Reports this result location on SUCCEEDED instead of a per-handle one.
    pub fn with_result_location(mut self, location: impl Into<String>) -> Self {
        self.result_location = Some(location.into());
        self
    }

    /// Returns the result location reported for a handle.
    pub fn result_location_for(&self, handle: &ExecutionHandle) -> String {
        self.result_location
            .clone()
            .unwrap_or_else(|| format!("s3://mock-results/{}.csv", handle))
    }

    /// Returns the parameters of every successful submission.
    pub fn started(&self) -> Vec<StartExecution> {
        self.lock().started.clone()
    }

    /// Returns how many submission calls were made, including failed ones.
    pub fn submit_attempts(&self) -> usize {
        self.lock().submit_attempts
    }

    /// Returns every handle a status check was issued for, in order.
    pub fn polled(&self) -> Vec<ExecutionHandle> {
        self.lock().polled.clone()
    }

    /// Returns every handle a stop request completed for, in order.
    pub fn stopped(&self) -> Vec<ExecutionHandle> {
        self.lock().stopped.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn status_for(&self, handle: &ExecutionHandle, step: MockStep) -> RemoteResult<ExecutionStatus> {
        let mut status = ExecutionStatus::new(handle.clone(), ExecutionState::Running);
        match step {
            MockStep::State(ExecutionState::Succeeded) => {
                status.state = ExecutionState::Succeeded;
                status.result_location = Some(self.result_location_for(handle));
                status.statement_kind = self.statement_kind;
                status.statistics = self.statistics;
            }
            MockStep::State(state) => status.state = state,
            MockStep::Failed(reason) => {
                status.state = ExecutionState::Failed;
                status.state_change_reason = Some(reason);
            }
            MockStep::Error(error) => return Err(error),
        }
        Ok(status)
    }
}

impl Default for MockQueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryEngine for MockQueryEngine {
    async fn start_execution(&self, params: &StartExecution) -> RemoteResult<ExecutionHandle> {
        let mut state = self.lock();
        state.submit_attempts += 1;

        if let Some(error) = state.submit_errors.pop_front() {
            return Err(error);
        }

        state.next_id += 1;
        let handle = ExecutionHandle::new(format!("mock-execution-{}", state.next_id));
        state
            .queries_by_handle
            .insert(handle.clone(), params.query.clone());
        state.started.push(params.clone());
        Ok(handle)
    }

    async fn get_execution(&self, handle: &ExecutionHandle) -> RemoteResult<ExecutionStatus> {
        let step = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.polled.push(handle.clone());

            let query = state
                .queries_by_handle
                .get(handle)
                .cloned()
                .ok_or_else(|| {
                    RemoteError::new(
                        "InvalidRequestException",
                        format!("QueryExecution {} was not found", handle),
                    )
                })?;

            let script = match state.query_scripts.get_mut(&query) {
                Some(script) => script,
                None => &mut state.default_script,
            };
            script
                .pop_front()
                .unwrap_or(MockStep::State(ExecutionState::Running))
        };

        self.status_for(handle, step)
    }

    async fn stop_execution(&self, handle: &ExecutionHandle) -> RemoteResult<()> {
        if let Some(delay) = self.stop_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.stopped.push(handle.clone());
        match &state.stop_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
