//! Query runner integration tests.
//!
//! Drive full runs through the public API: submission retries, stuck
//! execution recovery, result decoding and concurrent runs.

use std::sync::Arc;
use std::time::Duration;

use lakequery::engine::{
    ExecutionHandle, ExecutionState, ExecutionStatistics, MockQueryEngine, MockStep,
    StatementKind,
};
use lakequery::error::RemoteError;
use lakequery::storage::{InMemoryObjectStore, ObjectLocation};
use lakequery::{QueryError, QueryRequest, QueryRunner, RunnerConfig};
use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const RESULT_URI: &str = "s3://results/out.csv";
const RUNNING: MockStep = MockStep::State(ExecutionState::Running);
const QUEUED: MockStep = MockStep::State(ExecutionState::Queued);
const SUCCEEDED: MockStep = MockStep::State(ExecutionState::Succeeded);

/// Builds a runner over `engine` whose result object holds `contents`.
fn runner_with(
    engine: Arc<MockQueryEngine>,
    contents: &str,
    config: RunnerConfig,
) -> QueryRunner {
    let store = InMemoryObjectStore::new()
        .with_object(ObjectLocation::parse(RESULT_URI).unwrap(), contents);
    QueryRunner::new(engine, Arc::new(store), config).unwrap()
}

fn config() -> RunnerConfig {
    RunnerConfig::new("s3://results/")
}

#[tokio::test(start_paused = true)]
async fn test_dml_query_end_to_end() {
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_statuses([QUEUED, RUNNING, SUCCEEDED])
            .with_result_location(RESULT_URI),
    );
    let runner = runner_with(
        engine.clone(),
        "\"id\",\"city\"\n\"1\",\"Oslo\"\n\"2\",\"\"\n",
        config().with_database("geo"),
    );

    let output = runner
        .run(&QueryRequest::new("SELECT id, city FROM places"))
        .await
        .unwrap();

    assert_eq!(output.statement_kind, StatementKind::Dml);
    let records = output.items.as_records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("id"), Some("1"));
    assert_eq!(records[0].get("city"), Some("Oslo"));
    assert!(!records[1].contains("city"));

    let started = engine.started();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].database, "geo");
    assert_eq!(started[0].output_location, "s3://results/");
}

#[tokio::test(start_paused = true)]
async fn test_request_database_overrides_default() {
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_statuses([SUCCEEDED])
            .with_result_location(RESULT_URI),
    );
    let runner = runner_with(engine.clone(), "\"n\"\n\"1\"\n", config());

    runner
        .run(&QueryRequest::new("SELECT 1 AS n").with_database("analytics"))
        .await
        .unwrap();

    assert_eq!(engine.started()[0].database, "analytics");
}

#[tokio::test(start_paused = true)]
async fn test_ddl_query_decodes_lines() {
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_statuses([SUCCEEDED])
            .with_statement_kind(StatementKind::Ddl)
            .with_result_location(RESULT_URI),
    );
    let runner = runner_with(engine, "events\npageviews\n", config());

    let output = runner.run(&"SHOW TABLES".into()).await.unwrap();

    let rows: Vec<_> = output
        .items
        .as_records()
        .unwrap()
        .iter()
        .map(|r| r.get("row").unwrap().to_string())
        .collect();
    assert_eq!(rows, vec!["events", "pageviews"]);
}

#[tokio::test(start_paused = true)]
async fn test_raw_mode_returns_lines_verbatim() {
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_statuses([SUCCEEDED])
            .with_result_location(RESULT_URI),
    );
    let runner = runner_with(
        engine,
        "\"a\",\"b\"\n\"1\",\"2\"\n",
        config().with_format_json(false),
    );

    let output = runner.run(&"SELECT a, b FROM t".into()).await.unwrap();

    assert_eq!(
        output.items.as_raw().unwrap(),
        &["\"a\",\"b\"".to_string(), "\"1\",\"2\"".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stats_report_billed_minimum() {
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_statuses([SUCCEEDED])
            .with_statistics(ExecutionStatistics {
                data_scanned_bytes: Some(1024),
                engine_execution_time_ms: Some(850),
            })
            .with_result_location(RESULT_URI),
    );
    let runner = runner_with(engine, "\"n\"\n\"1\"\n\"2\"\n", config().with_stats(true));

    let output = runner.run(&"SELECT n FROM t".into()).await.unwrap();

    let stats = output.stats.unwrap();
    assert_eq!(stats.count, 2);
    assert_eq!(stats.data_scanned_mb, 0);
    assert!((stats.query_cost_usd - 10.0 * 0.000004768).abs() < 1e-12);
    assert_eq!(stats.engine_execution_time_ms, Some(850));
}

#[tokio::test(start_paused = true)]
async fn test_transient_submit_errors_are_retried() {
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_submit_errors([
                RemoteError::new("ThrottlingException", "Rate exceeded"),
                RemoteError::new("TooManyRequestsException", "Slow down"),
            ])
            .with_statuses([SUCCEEDED])
            .with_result_location(RESULT_URI),
    );
    let runner = runner_with(engine.clone(), "\"n\"\n\"1\"\n", config());

    let start = Instant::now();
    let output = runner.run(&"SELECT 1 AS n".into()).await.unwrap();

    assert_eq!(output.items.len(), 1);
    assert_eq!(engine.submit_attempts(), 3);
    assert_eq!(engine.started().len(), 1);
    assert!(start.elapsed() >= Duration::from_millis(4000));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_submit_error_is_not_retried() {
    let engine = Arc::new(MockQueryEngine::new().with_submit_errors([RemoteError::new(
        "InvalidRequestException",
        "line 1:8: mismatched input",
    )]));
    let runner = runner_with(engine.clone(), "", config());

    let err = runner.run(&"SELEC 1".into()).await.unwrap_err();

    match err {
        QueryError::Remote(e) => assert_eq!(e.code, "InvalidRequestException"),
        other => panic!("Expected Remote error, got {:?}", other),
    }
    assert_eq!(engine.submit_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_execution_is_resubmitted_once() {
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_statuses([RUNNING, RUNNING, RUNNING, RUNNING, SUCCEEDED])
            .with_result_location(RESULT_URI),
    );
    let runner = runner_with(engine.clone(), "\"n\"\n\"1\"\n", config());

    let output = runner.run(&"SELECT 1 AS n".into()).await.unwrap();

    assert_eq!(output.execution_id, ExecutionHandle::new("mock-execution-2"));
    assert_eq!(engine.stopped(), vec![ExecutionHandle::new("mock-execution-1")]);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_execution_gives_up_after_two_resubmissions() {
    let engine = Arc::new(MockQueryEngine::new());
    let runner = runner_with(engine.clone(), "", config());

    let err = runner.run(&"SELECT * FROM huge".into()).await.unwrap_err();

    assert!(err.to_string().contains("Maximum retries exceeded"));
    assert!(matches!(
        err,
        QueryError::StuckExecutionExhausted { resubmissions: 2 }
    ));
    assert_eq!(engine.started().len(), 3);
    assert_eq!(engine.stopped().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_execution_reason_is_forwarded() {
    let reason = "SYNTAX_ERROR: line 1:15: Table default.missing does not exist";
    let engine = Arc::new(MockQueryEngine::new().with_statuses([
        QUEUED,
        MockStep::Failed(reason.to_string()),
    ]));
    let runner = runner_with(engine.clone(), "", config());

    let err = runner.run(&"SELECT * FROM missing".into()).await.unwrap_err();

    match err {
        QueryError::ExecutionFailed(message) => assert_eq!(message, reason),
        other => panic!("Expected ExecutionFailed, got {:?}", other),
    }
    assert!(engine.stopped().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_runs_recover_independently() {
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_query_statuses(
                "SELECT slow",
                [RUNNING, RUNNING, RUNNING, RUNNING, SUCCEEDED],
            )
            .with_query_statuses("SELECT fast", [QUEUED, SUCCEEDED])
            .with_result_location(RESULT_URI),
    );
    let runner = runner_with(engine.clone(), "\"n\"\n\"1\"\n", config());

    let slow_request = QueryRequest::new("SELECT slow");
    let fast_request = QueryRequest::new("SELECT fast");
    let (slow, fast) = tokio::join!(runner.run(&slow_request), runner.run(&fast_request));
    let slow = slow.unwrap();
    let fast = fast.unwrap();

    let stopped = engine.stopped();
    assert_eq!(stopped.len(), 1);
    assert_ne!(slow.execution_id, stopped[0]);
    assert_ne!(fast.execution_id, stopped[0]);

    let slow_submissions = engine
        .started()
        .iter()
        .filter(|p| p.query == "SELECT slow")
        .count();
    let fast_submissions = engine
        .started()
        .iter()
        .filter(|p| p.query == "SELECT fast")
        .count();
    assert_eq!(slow_submissions, 2);
    assert_eq!(fast_submissions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_live_execution() {
    let engine = Arc::new(MockQueryEngine::new().with_statuses([QUEUED, RUNNING]));
    let runner = runner_with(engine.clone(), "", config());
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
async fn test_timeout_stops_live_execution() {
    let engine = Arc::new(MockQueryEngine::new());
    let runner = runner_with(
        engine.clone(),
        "",
        config().with_timeout(Duration::from_millis(500)),
    );

    let err = runner.run(&"SELECT 1".into()).await.unwrap_err();

    assert!(matches!(err, QueryError::Timeout(_)));
    assert_eq!(engine.stopped(), vec![ExecutionHandle::new("mock-execution-1")]);
}
