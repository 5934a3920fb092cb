//! HTTP query engine client.
//!
//! Speaks the engine's JSON 1.1 protocol: every operation is a `POST /` with
//! the operation named in the `X-Amz-Target` header. Requests are sent
//! unsigned; deployments that need request signing put a signing proxy in
//! front of the endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::engine::{
    ExecutionHandle, ExecutionState, ExecutionStatistics, ExecutionStatus, QueryEngine,
    StartExecution, StatementKind,
};
use crate::error::{QueryError, RemoteError, RemoteResult, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Prefix of the `X-Amz-Target` header value.
const TARGET_PREFIX: &str = "AmazonAthena";

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// HTTP engine client configuration.
#[derive(Debug, Clone)]
pub struct HttpEngineConfig {
    /// Base URL of the engine API.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl HttpEngineConfig {
    /// Creates a new config for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Query engine client over HTTP.
#[derive(Debug, Clone)]
pub struct HttpQueryEngine {
    config: HttpEngineConfig,
    client: Client,
}

impl HttpQueryEngine {
    /// Creates a new engine client with the given configuration.
    pub fn new(config: HttpEngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QueryError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Issues one API operation and decodes its JSON response.
    async fn call<Req, Resp>(&self, operation: &str, body: &Req) -> RemoteResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        debug!("Engine request: {}", operation);

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .header("Content-Type", CONTENT_TYPE)
            .json(body)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::new("NetworkingError", format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(parse_error(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| RemoteError::new("", format!("Failed to parse {operation} response: {e}")))
    }
}

#[async_trait]
impl QueryEngine for HttpQueryEngine {
    async fn start_execution(&self, params: &StartExecution) -> RemoteResult<ExecutionHandle> {
        let request = StartQueryExecutionRequest {
            query_string: &params.query,
            result_configuration: ResultConfigurationRequest {
                output_location: &params.output_location,
            },
            query_execution_context: QueryExecutionContext {
                database: &params.database,
            },
        };

        let response: StartQueryExecutionResponse =
            self.call("StartQueryExecution", &request).await?;
        Ok(ExecutionHandle::new(response.query_execution_id))
    }

    async fn get_execution(&self, handle: &ExecutionHandle) -> RemoteResult<ExecutionStatus> {
        let request = QueryExecutionIdRequest {
            query_execution_id: handle.as_str(),
        };

        let response: GetQueryExecutionResponse =
            self.call("GetQueryExecution", &request).await?;
        Ok(response.query_execution.into_status(handle))
    }

    async fn stop_execution(&self, handle: &ExecutionHandle) -> RemoteResult<()> {
        let request = QueryExecutionIdRequest {
            query_execution_id: handle.as_str(),
        };

        let _: serde_json::Value = self.call("StopQueryExecution", &request).await?;
        Ok(())
    }
}

/// Maps a transport failure onto the engine's error code vocabulary.
fn map_request_error(e: reqwest::Error) -> RemoteError {
    if e.is_builder() {
        RemoteError::new("UnknownEndpoint", format!("Invalid engine endpoint: {e}"))
    } else if e.is_timeout() {
        RemoteError::new("NetworkingError", "Request timed out")
    } else if e.is_connect() {
        RemoteError::new("NetworkingError", format!("Failed to connect to engine: {e}"))
    } else {
        RemoteError::new("NetworkingError", format!("Request failed: {e}"))
    }
}

/// Parses an error response body into a remote error.
fn parse_error(status: StatusCode, body: &str) -> RemoteError {
    if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
        let code = error
            .error_type
            .as_deref()
            .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
            .unwrap_or_default();
        let message = error.message.unwrap_or_default();

        if !code.is_empty() {
            return RemoteError::new(code, message);
        }
    }

    let code = if status == StatusCode::TOO_MANY_REQUESTS {
        "TooManyRequestsException"
    } else {
        ""
    };

    RemoteError::new(code, format!("Engine API error ({}): {}", status, body))
}

// Engine API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionRequest<'a> {
    query_string: &'a str,
    result_configuration: ResultConfigurationRequest<'a>,
    query_execution_context: QueryExecutionContext<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResultConfigurationRequest<'a> {
    output_location: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionContext<'a> {
    database: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionIdRequest<'a> {
    query_execution_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionResponse {
    query_execution_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryExecutionResponse {
    query_execution: QueryExecution,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecution {
    #[serde(default)]
    statement_type: Option<String>,
    #[serde(default)]
    result_configuration: Option<ResultConfigurationResponse>,
    status: QueryExecutionStatus,
    #[serde(default)]
    statistics: Option<QueryExecutionStatistics>,
}

impl QueryExecution {
    fn into_status(self, handle: &ExecutionHandle) -> ExecutionStatus {
        ExecutionStatus {
            handle: handle.clone(),
            state: ExecutionState::parse(&self.status.state),
            result_location: self.result_configuration.and_then(|c| c.output_location),
            statement_kind: self.statement_type.as_deref().map(StatementKind::parse),
            statistics: self.statistics.map(|s| ExecutionStatistics {
                data_scanned_bytes: s.data_scanned_in_bytes,
                engine_execution_time_ms: s.engine_execution_time_in_millis,
            }),
            state_change_reason: self.status.state_change_reason,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultConfigurationResponse {
    #[serde(default)]
    output_location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionStatus {
    state: String,
    #[serde(default)]
    state_change_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionStatistics {
    #[serde(default)]
    data_scanned_in_bytes: Option<u64>,
    #[serde(default)]
    engine_execution_time_in_millis: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}
