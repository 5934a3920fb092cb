//! lakequery - run SQL on an asynchronous query engine from the command line.

mod cli;

use std::sync::Arc;

use cli::Cli;
use lakequery::config::Config;
use lakequery::engine::{ExecutionState, HttpQueryEngine, MockQueryEngine, MockStep, QueryRequest};
use lakequery::error::{QueryError, Result};
use lakequery::logging;
use lakequery::output;
use lakequery::storage::{InMemoryObjectStore, ObjectLocation, S3ObjectStore};
use lakequery::QueryRunner;
use tracing::{error, info};

/// Result object served in `--mock` mode.
const MOCK_RESULT_LOCATION: &str = "s3://lakequery-mock/results/mock.csv";

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        eprintln!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());

    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_defaults();
    cli.apply_overrides(&mut config);

    let format = cli.parse_output_format().map_err(QueryError::config)?;
    let request = cli.to_request()?;

    let runner = if cli.mock {
        mock_runner(&mut config, &request)?
    } else {
        http_runner(&config)?
    };

    let result = runner.run(&request).await?;
    println!("{}", output::render(&result, format)?);

    Ok(())
}

/// Builds a runner talking to the configured HTTP endpoints.
fn http_runner(config: &Config) -> Result<QueryRunner> {
    let engine = HttpQueryEngine::new(config.engine_config()?)?;
    let store = S3ObjectStore::new(config.storage_config()?)?;

    QueryRunner::new(
        Arc::new(engine),
        Arc::new(store),
        config.query.to_runner_config()?,
    )
}

/// Builds a runner whose engine echoes the query text back as a one-row result.
fn mock_runner(config: &mut Config, request: &QueryRequest) -> Result<QueryRunner> {
    if config.query.output_location.is_none() {
        config.query.output_location = Some("s3://lakequery-mock/results/".to_string());
    }

    let engine = MockQueryEngine::new()
        .with_statuses([
            MockStep::State(ExecutionState::Queued),
            MockStep::State(ExecutionState::Running),
            MockStep::State(ExecutionState::Succeeded),
        ])
        .with_result_location(MOCK_RESULT_LOCATION);

    let contents = format!("\"query\"\n\"{}\"\n", request.text.replace('"', "\"\""));
    let store = InMemoryObjectStore::new()
        .with_object(ObjectLocation::parse(MOCK_RESULT_LOCATION)?, contents);

    QueryRunner::new(
        Arc::new(engine),
        Arc::new(store),
        config.query.to_runner_config()?,
    )
}
