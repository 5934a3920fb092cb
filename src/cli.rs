//! Command-line argument parsing for lakequery.

use clap::Parser;
use lakequery::config::Config;
use lakequery::engine::QueryRequest;
use lakequery::error::{QueryError, Result};
use lakequery::output::OutputFormat;
use std::io::Read;
use std::path::PathBuf;

/// Run a SQL query on the query engine and print its results.
#[derive(Parser, Debug)]
#[command(name = "lakequery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQL query text
    #[arg(value_name = "SQL", conflicts_with = "file")]
    pub sql: Option<String>,

    /// Read the query from a file (use "-" for stdin)
    #[arg(short = 'f', long, value_name = "PATH")]
    pub file: Option<String>,

    /// Database to run the query against
    #[arg(short = 'd', long, value_name = "DATABASE")]
    pub database: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Query engine endpoint URL
    #[arg(long, value_name = "URL")]
    pub engine_url: Option<String>,

    /// Object storage endpoint URL
    #[arg(long, value_name = "URL")]
    pub storage_url: Option<String>,

    /// Result location for the engine (e.g., s3://bucket/prefix/)
    #[arg(short = 'o', long, value_name = "URI")]
    pub output_location: Option<String>,

    /// Print raw result lines instead of decoded records
    #[arg(long)]
    pub raw: bool,

    /// Include scanned data, cost estimate and engine time
    #[arg(long)]
    pub stats: bool,

    /// Milliseconds between status checks
    #[arg(long, value_name = "MS")]
    pub poll_interval: Option<u64>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "json")]
    pub format: String,

    /// Use a mock engine and in-memory storage (for testing)
    #[arg(long)]
    pub mock: bool,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(url) = &self.engine_url {
            config.engine.endpoint = Some(url.clone());
        }
        if let Some(url) = &self.storage_url {
            config.storage.endpoint = Some(url.clone());
        }
        if let Some(location) = &self.output_location {
            config.query.output_location = Some(location.clone());
        }
        if self.raw {
            config.query.format_json = false;
        }
        if self.stats {
            config.query.get_stats = true;
        }
        if let Some(ms) = self.poll_interval {
            config.query.poll_interval_ms = ms;
        }
        if let Some(secs) = self.timeout {
            config.query.timeout_secs = Some(secs);
        }
    }

    /// Parses the output format from the --format argument.
    pub fn parse_output_format(&self) -> std::result::Result<OutputFormat, String> {
        self.format.parse()
    }

    /// Builds the query request from the positional SQL or --file.
    pub fn to_request(&self) -> Result<QueryRequest> {
        let text = match (&self.sql, &self.file) {
            (Some(sql), _) => sql.clone(),
            (None, Some(path)) if path == "-" => {
                let mut text = String::new();
                std::io::stdin()
                    .read_to_string(&mut text)
                    .map_err(|e| QueryError::invalid_request(format!("Failed to read stdin: {e}")))?;
                text
            }
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                QueryError::invalid_request(format!("Failed to read query file {path}: {e}"))
            })?,
            (None, None) => return Err(QueryError::invalid_request("SQL query is missing")),
        };

        let mut request = QueryRequest::new(text.trim());
        if let Some(database) = &self.database {
            request = request.with_database(database.clone());
        }
        Ok(request)
    }
}
