//! Configuration integration tests.
//!
//! Load config files from disk and run queries with the resulting settings.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use lakequery::config::Config;
use lakequery::engine::{ExecutionState, MockQueryEngine, MockStep};
use lakequery::storage::{InMemoryObjectStore, ObjectLocation};
use lakequery::{QueryRequest, QueryRunner};
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_config_file() {
    let file = write_config(
        r#"
[engine]
endpoint = "http://localhost:4566"

[storage]
endpoint = "http://localhost:9000"
timeout_secs = 5

[query]
output_location = "s3://query-results/team/"
database = "warehouse"
poll_interval_ms = 1000
timeout_secs = 120
"#,
    );

    let config = Config::load_from_file(file.path()).unwrap();

    let engine = config.engine_config().unwrap();
    assert_eq!(engine.endpoint, "http://localhost:4566");
    assert_eq!(engine.timeout_secs, 30);

    let storage = config.storage_config().unwrap();
    assert_eq!(storage.endpoint, "http://localhost:9000");
    assert_eq!(storage.timeout_secs, 5);

    let runner = config.query.to_runner_config().unwrap();
    assert_eq!(runner.output_location, "s3://query-results/team/");
    assert_eq!(runner.database, "warehouse");
    assert_eq!(runner.poll.base_interval, Duration::from_millis(1000));
    assert_eq!(runner.timeout, Some(Duration::from_secs(120)));
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let file = write_config("[query]\npoll_interval_ms = \"fast\"\n");

    let err = Config::load_from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn test_zero_poll_interval_is_rejected() {
    let file = write_config(
        r#"
[query]
output_location = "s3://query-results/"
poll_interval_ms = 0
"#,
    );

    let config = Config::load_from_file(file.path()).unwrap();
    assert!(config.query.to_runner_config().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_run_with_loaded_config() {
    let file = write_config(
        r#"
[query]
output_location = "s3://query-results/"
database = "sales"
format_json = false
no_progress_threshold = 1
max_resubmissions = 1
"#,
    );
    let config = Config::load_from_file(file.path()).unwrap();

    let result_uri = "s3://query-results/run.csv";
    let engine = Arc::new(
        MockQueryEngine::new()
            .with_statuses([
                MockStep::State(ExecutionState::Running),
                MockStep::State(ExecutionState::Running),
                MockStep::State(ExecutionState::Succeeded),
            ])
            .with_result_location(result_uri),
    );
    let store = InMemoryObjectStore::new().with_object(
        ObjectLocation::parse(result_uri).unwrap(),
        "\"total\"\n\"42\"\n",
    );
    let runner = QueryRunner::new(
        engine.clone(),
        Arc::new(store),
        config.query.to_runner_config().unwrap(),
    )
    .unwrap();

    let output = runner
        .run(&QueryRequest::new("SELECT count(*) AS total FROM orders"))
        .await
        .unwrap();

    assert_eq!(output.items.as_raw().unwrap().len(), 2);
    assert_eq!(engine.started().len(), 2);
    assert_eq!(engine.started()[1].database, "sales");
    assert_eq!(engine.stopped().len(), 1);
}
