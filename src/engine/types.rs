//! Execution types shared by the engine clients, the poller and the runner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A query to run on the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// SQL text.
    pub text: String,

    /// Database to run against; the runner's default is used when `None`.
    #[serde(default)]
    pub database: Option<String>,
}

impl QueryRequest {
    /// Creates a request for the given SQL text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            database: None,
        }
    }

    /// Targets a specific database instead of the runner's default.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

impl From<&str> for QueryRequest {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for QueryRequest {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Identifier the engine assigns to one submitted execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters of a single `start_execution` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartExecution {
    pub query: String,
    pub output_location: String,
    pub database: String,
}

/// Lifecycle state of an execution as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// Any state this client does not know about; treated as still running.
    #[serde(other)]
    Unknown,
}

impl ExecutionState {
    /// Parses the engine's state string. Unrecognized states map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "QUEUED" => Self::Queued,
            "RUNNING" => Self::Running,
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }

    /// Returns the state as the engine spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Returns true once the engine will not change this execution's state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of statement the engine executed.
///
/// Only `Dml` produces a tabular result file; the other kinds write
/// tab-separated metadata lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    #[default]
    Dml,
    Ddl,
    Utility,
}

impl StatementKind {
    /// Parses the engine's statement type. Unknown types count as non-DML.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "DML" => Self::Dml,
            "DDL" => Self::Ddl,
            _ => Self::Utility,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dml => "DML",
            Self::Ddl => "DDL",
            Self::Utility => "UTILITY",
        }
    }

    pub fn is_dml(&self) -> bool {
        *self == Self::Dml
    }
}

/// Execution statistics reported with a finished execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    pub data_scanned_bytes: Option<u64>,
    pub engine_execution_time_ms: Option<u64>,
}

/// One status report for an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    pub handle: ExecutionHandle,
    pub state: ExecutionState,
    /// Where the engine wrote the result set (`s3://bucket/key`).
    pub result_location: Option<String>,
    pub statement_kind: Option<StatementKind>,
    pub statistics: Option<ExecutionStatistics>,
    /// Engine-provided explanation for FAILED or CANCELLED.
    pub state_change_reason: Option<String>,
}

impl ExecutionStatus {
    /// Creates a status with only the handle and state set.
    pub fn new(handle: ExecutionHandle, state: ExecutionState) -> Self {
        Self {
            handle,
            state,
            result_location: None,
            statement_kind: None,
            statistics: None,
            state_change_reason: None,
        }
    }
}
