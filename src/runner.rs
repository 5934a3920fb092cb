//! Query runner: the public entry point.
//!
//! A run submits the query, polls it to completion, fetches the result
//! object and decodes it. Each run owns its own [`RunState`]; runs started
//! concurrently from one runner share only the engine and store clients.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decode::{decode, DecodeMode, ResultItems};
use crate::engine::{ExecutionHandle, QueryEngine, QueryRequest, StatementKind};
use crate::error::{QueryError, Result};
use crate::poll::{CompletionPoller, PollPolicy, RunState};
use crate::stats::QueryStats;
use crate::storage::{ObjectLocation, ObjectStore};
use crate::submit::{ExecutionSubmitter, SubmitPolicy};

/// Default database when a request does not name one.
pub const DEFAULT_DATABASE: &str = "default";

/// Runner configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Where the engine writes result objects (`s3://bucket/prefix/`).
    pub output_location: String,
    pub database: String,
    /// Decode results into records; when false, return raw lines.
    pub format_json: bool,
    /// Attach scanned-data statistics and a cost estimate.
    pub get_stats: bool,
    pub submit: SubmitPolicy,
    pub poll: PollPolicy,
    /// Deadline for a whole run.
    pub timeout: Option<Duration>,
}

impl RunnerConfig {
    /// Creates a config writing results to `output_location`, with defaults otherwise.
    pub fn new(output_location: impl Into<String>) -> Self {
        Self {
            output_location: output_location.into(),
            database: DEFAULT_DATABASE.to_string(),
            format_json: true,
            get_stats: false,
            submit: SubmitPolicy::default(),
            poll: PollPolicy::default(),
            timeout: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_format_json(mut self, format_json: bool) -> Self {
        self.format_json = format_json;
        self
    }

    pub fn with_stats(mut self, get_stats: bool) -> Self {
        self.get_stats = get_stats;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_submit_policy(mut self, submit: SubmitPolicy) -> Self {
        self.submit = submit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Checks the settings a runner cannot work without.
    pub fn validate(&self) -> Result<()> {
        ObjectLocation::parse(&self.output_location).map_err(|e| {
            QueryError::config(format!(
                "Invalid output location '{}': {}",
                self.output_location, e
            ))
        })?;

        if self.database.trim().is_empty() {
            return Err(QueryError::config("Database name must not be empty"));
        }
        if self.poll.base_interval.is_zero() {
            return Err(QueryError::config("Poll interval must be greater than zero"));
        }
        if self.submit.max_attempts == Some(0) {
            return Err(QueryError::config("Submission attempts must be at least 1"));
        }

        Ok(())
    }
}

/// Output of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    /// Execution that produced the result.
    pub execution_id: ExecutionHandle,
    pub statement_kind: StatementKind,
    pub items: ResultItems,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueryStats>,
}

/// Runs queries against an engine and reads their results from storage.
#[derive(Clone)]
pub struct QueryRunner {
    engine: Arc<dyn QueryEngine>,
    store: Arc<dyn ObjectStore>,
    config: RunnerConfig,
}

impl QueryRunner {
    /// Creates a runner after validating `config`.
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        store: Arc<dyn ObjectStore>,
        config: RunnerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            store,
            config,
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs a query to completion.
    pub async fn run(&self, request: &QueryRequest) -> Result<QueryOutput> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Runs a query, aborting early when `cancel` fires or the configured
    /// timeout elapses. An aborted run stops its live execution.
    pub async fn run_with_cancel(
        &self,
        request: &QueryRequest,
        cancel: CancellationToken,
    ) -> Result<QueryOutput> {
        if request.text.trim().is_empty() {
            return Err(QueryError::invalid_request("SQL query is missing"));
        }

        let mut state = RunState::new(self.config.poll.base_interval);

        let outcome = {
            let work = with_deadline(self.config.timeout, self.execute(request, &mut state));
            tokio::select! {
                result = work => result,
                _ = cancel.cancelled() => Err(QueryError::Cancelled),
            }
        };

        if matches!(outcome, Err(QueryError::Timeout(_) | QueryError::Cancelled)) {
            if let Some(handle) = state.retire() {
                warn!(execution_id = %handle, "Run aborted, stopping execution");
                if let Err(e) = self.engine.stop_execution(&handle).await {
                    warn!(execution_id = %handle, "Failed to stop execution: {}", e);
                }
            }
        }

        outcome
    }

    /// Submit, poll, fetch and decode, in order.
    async fn execute(&self, request: &QueryRequest, state: &mut RunState) -> Result<QueryOutput> {
        let submitter = ExecutionSubmitter::new(
            self.engine.as_ref(),
            &self.config.output_location,
            &self.config.database,
            &self.config.submit,
        );

        state.activate(submitter.submit(request).await?);

        let poller =
            CompletionPoller::new(self.engine.as_ref(), &submitter, request, &self.config.poll);
        let status = poller.poll(state).await?;

        let result_location = status.result_location.as_deref().ok_or_else(|| {
            QueryError::internal(format!(
                "Execution {} succeeded without a result location",
                status.handle
            ))
        })?;
        let location = ObjectLocation::parse(result_location)?;
        let statement_kind = status.statement_kind.unwrap_or_default();

        let mode = if self.config.format_json {
            DecodeMode::for_statement(statement_kind)
        } else {
            DecodeMode::Raw
        };
        debug!(location = %location, ?mode, "Fetching query results");

        let reader = self
            .store
            .fetch_object(&location)
            .await
            .map_err(QueryError::Storage)?;
        let items = decode(reader, mode).await?;

        info!(
            execution_id = %status.handle,
            items = items.len(),
            "Query results decoded"
        );

        let stats = if self.config.get_stats {
            status
                .statistics
                .as_ref()
                .map(|s| QueryStats::from_statistics(s, items.len()))
        } else {
            None
        };

        Ok(QueryOutput {
            execution_id: status.handle,
            statement_kind,
            items,
            stats,
        })
    }
}

/// Bounds `work` by `timeout`, if one is set.
async fn with_deadline<F>(timeout: Option<Duration>, work: F) -> Result<QueryOutput>
where
    F: Future<Output = Result<QueryOutput>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .unwrap_or(Err(QueryError::Timeout(limit))),
        None => work.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Record;
    use crate::engine::{
        ExecutionState, ExecutionStatistics, MockQueryEngine, MockStep,
    };
    use crate::error::RemoteError;
    use crate::storage::InMemoryObjectStore;

    const RESULT_URI: &str = "s3://results/out.csv";

    fn runner(engine: Arc<MockQueryEngine>, store: InMemoryObjectStore, config: RunnerConfig) -> QueryRunner {
        QueryRunner::new(engine, Arc::new(store), config).unwrap()
    }

    fn store_with(contents: &str) -> InMemoryObjectStore {
        InMemoryObjectStore::new().with_object(ObjectLocation::parse(RESULT_URI).unwrap(), contents)
    }

    fn succeeding_engine() -> MockQueryEngine {
        MockQueryEngine::new()
            .with_statuses([MockStep::State(ExecutionState::Succeeded)])
            .with_result_location(RESULT_URI)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_decodes_dml_by_default() {
        let engine = Arc::new(succeeding_engine());
        let runner = runner(
            engine.clone(),
            store_with("\"id\",\"name\"\n\"1\",\"ada\"\n\"2\",\"\"\n"),
            RunnerConfig::new("s3://results/"),
        );

        let output = runner.run(&"SELECT id, name FROM people".into()).await.unwrap();

        assert_eq!(output.statement_kind, StatementKind::Dml);
        assert_eq!(output.execution_id.as_str(), "mock-execution-1");
        let records = output.items.as_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], [("id", "2")].into_iter().collect::<Record>());
        assert!(output.stats.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_decodes_non_dml_from_statement_kind() {
        let engine = Arc::new(succeeding_engine().with_statement_kind(StatementKind::Ddl));
        let runner = runner(
            engine,
            store_with("id                  \tint\nname                \tstring\n"),
            RunnerConfig::new("s3://results/"),
        );

        let output = runner.run(&"DESCRIBE people".into()).await.unwrap();

        assert_eq!(output.statement_kind, StatementKind::Ddl);
        let records = output.items.as_records().unwrap();
        assert_eq!(records[0].get("id"), Some("int"));
        assert_eq!(records[1].get("name"), Some("string"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_raw_mode() {
        let engine = Arc::new(succeeding_engine());
        let runner = runner(
            engine,
            store_with("\"a\"\n\"1\"\n"),
            RunnerConfig::new("s3://results/").with_format_json(false),
        );

        let output = runner.run(&"SELECT 1 AS a".into()).await.unwrap();
        assert_eq!(
            output.items.as_raw().unwrap(),
            &["\"a\"".to_string(), "\"1\"".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_attaches_stats_when_requested() {
        let engine = Arc::new(succeeding_engine().with_statistics(ExecutionStatistics {
            data_scanned_bytes: Some(30 * 1_048_576),
            engine_execution_time_ms: Some(420),
        }));
        let runner = runner(
            engine,
            store_with("\"a\"\n\"1\"\n\"2\"\n"),
            RunnerConfig::new("s3://results/").with_stats(true),
        );

        let output = runner.run(&"SELECT a FROM t".into()).await.unwrap();

        let stats = output.stats.unwrap();
        assert_eq!(stats.data_scanned_mb, 30);
        assert_eq!(stats.engine_execution_time_ms, Some(420));
        assert_eq!(stats.count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_rejects_empty_query() {
        let engine = Arc::new(succeeding_engine());
        let runner = runner(engine.clone(), store_with(""), RunnerConfig::new("s3://results/"));

        let err = runner.run(&"   ".into()).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidRequest(_)));
        assert_eq!(engine.submit_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_missing_result_object_is_storage_error() {
        let engine = Arc::new(succeeding_engine());
        let runner = runner(engine, InMemoryObjectStore::new(), RunnerConfig::new("s3://results/"));

        let err = runner.run(&"SELECT 1".into()).await.unwrap_err();
        match err {
            QueryError::Storage(e) => assert_eq!(e.code, "NoSuchKey"),
            other => panic!("Expected Storage error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_forwards_execution_failure() {
        let engine = Arc::new(
            MockQueryEngine::new().with_statuses([MockStep::Failed("Table not found".into())]),
        );
        let runner = runner(engine.clone(), store_with(""), RunnerConfig::new("s3://results/"));

        let err = runner.run(&"SELECT * FROM missing".into()).await.unwrap_err();
        assert!(matches!(err, QueryError::ExecutionFailed(ref r) if r == "Table not found"));
        assert_eq!(engine.submit_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_stops_live_execution() {
        let engine = Arc::new(MockQueryEngine::new());
        let runner = runner(
            engine.clone(),
            store_with(""),
            RunnerConfig::new("s3://results/").with_timeout(Duration::from_millis(500)),
        );

        let err = runner.run(&"SELECT 1".into()).await.unwrap_err();

        assert!(matches!(err, QueryError::Timeout(_)));
        assert_eq!(engine.stopped(), vec![ExecutionHandle::new("mock-execution-1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_live_execution() {
        let engine = Arc::new(MockQueryEngine::new());
        let runner = runner(engine.clone(), store_with(""), RunnerConfig::new("s3://results/"));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let err = runner
            .run_with_cancel(&"SELECT 1".into(), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::Cancelled));
        assert_eq!(engine.stopped(), vec![ExecutionHandle::new("mock-execution-1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_during_recovery_stop_still_stops_execution() {
        // Fourth RUNNING check at 600 ms starts a stop that needs 300 ms.
        let engine = Arc::new(MockQueryEngine::new().with_stop_delay(Duration::from_millis(300)));
        let runner = runner(
            engine.clone(),
            store_with(""),
            RunnerConfig::new("s3://results/").with_timeout(Duration::from_millis(700)),
        );

        let err = runner.run(&"SELECT 1".into()).await.unwrap_err();

        assert!(matches!(err, QueryError::Timeout(_)));
        assert_eq!(engine.started().len(), 1);
        assert_eq!(engine.stopped(), vec![ExecutionHandle::new("mock-execution-1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_during_submit_has_nothing_to_stop() {
        let engine = Arc::new(
            MockQueryEngine::new()
                .with_submit_errors(vec![RemoteError::new("ThrottlingException", ""); 10]),
        );
        let runner = runner(
            engine.clone(),
            store_with(""),
            RunnerConfig::new("s3://results/").with_timeout(Duration::from_secs(3)),
        );

        let err = runner.run(&"SELECT 1".into()).await.unwrap_err();
        assert!(matches!(err, QueryError::Timeout(_)));
        assert!(engine.stopped().is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(RunnerConfig::new("s3://results/").validate().is_ok());
        assert!(RunnerConfig::new("results/").validate().is_err());
        assert!(RunnerConfig::new("s3://results/")
            .with_database(" ")
            .validate()
            .is_err());

        let zero_interval = RunnerConfig::new("s3://results/").with_poll_policy(PollPolicy {
            base_interval: Duration::ZERO,
            ..PollPolicy::default()
        });
        assert!(zero_interval.validate().is_err());
    }
}
