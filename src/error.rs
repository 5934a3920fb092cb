//! Error types for lakequery.
//!
//! Defines the remote error shape reported by the query engine and object
//! storage, and the main error enum returned from a query run.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::classify::{classify, ErrorClass};

/// An error reported by a remote service (query engine or object storage).
///
/// `code` is the service's error code (e.g. `ThrottlingException`); it is
/// empty when the service did not report a recognizable one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    /// Creates a remote error with the given code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns the retry class of this error's code.
    pub fn class(&self) -> ErrorClass {
        classify(&self.code)
    }

    /// Returns true if the same request may be retried unchanged.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code.is_empty(), self.message.is_empty()) {
            (true, _) => write!(f, "{}", self.message),
            (false, true) => write!(f, "{}", self.code),
            (false, false) => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Main error type for lakequery operations.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Non-retryable error from the query engine, passed through unchanged.
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// The engine finished the execution in the FAILED state.
    #[error("Query execution failed: {0}")]
    ExecutionFailed(String),

    /// The execution kept making no progress after every allowed resubmission.
    #[error("Maximum retries exceeded: execution made no progress after {resubmissions} resubmissions")]
    StuckExecutionExhausted { resubmissions: u32 },

    /// Submission kept failing with transient errors until the attempt cap.
    #[error("Query submission failed after {attempts} attempts: {last}")]
    SubmitRetriesExhausted { attempts: u32, last: RemoteError },

    /// Object storage errors (missing result object, access denied, etc.)
    #[error("Storage error: {0}")]
    Storage(RemoteError),

    /// Errors while reading the result stream.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The request was rejected before anything was sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration errors (invalid config file, bad output location, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller-supplied deadline elapsed.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the run.
    #[error("Query was cancelled")]
    Cancelled,

    /// Internal errors (unexpected engine responses, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// Creates an execution failure carrying the engine's reason.
    pub fn execution_failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed(reason.into())
    }

    /// Creates a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates an invalid request error with the given message.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Remote(_) => "Remote Error",
            Self::ExecutionFailed(_) => "Execution Failed",
            Self::StuckExecutionExhausted { .. } => "Stuck Execution",
            Self::SubmitRetriesExhausted { .. } => "Submission Error",
            Self::Storage(_) => "Storage Error",
            Self::Decode(_) => "Decode Error",
            Self::InvalidRequest(_) => "Invalid Request",
            Self::Config(_) => "Configuration Error",
            Self::Timeout(_) => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::Internal(_) => "Internal Error",
        }
    }
}

impl From<std::io::Error> for QueryError {
    fn from(e: std::io::Error) -> Self {
        Self::Decode(format!("Failed to read result stream: {e}"))
    }
}

/// Result type alias using QueryError.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Result type alias for a single remote call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
