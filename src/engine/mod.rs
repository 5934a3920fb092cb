//! Query engine abstraction for lakequery.
//!
//! Provides a trait-based interface to the remote query engine, so the
//! submit/poll logic can run against the HTTP client or a scripted mock.

mod http;
mod mock;
mod types;

pub use http::{HttpEngineConfig, HttpQueryEngine};
pub use mock::{MockQueryEngine, MockStep};
pub use types::{
    ExecutionHandle, ExecutionState, ExecutionStatistics, ExecutionStatus, QueryRequest,
    StartExecution, StatementKind,
};

use crate::error::RemoteResult;
use async_trait::async_trait;

/// Trait defining the remote operations of the query engine.
///
/// Errors are returned as the engine reported them; retrying is the
/// caller's decision.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Starts a new execution and returns its handle.
    async fn start_execution(&self, params: &StartExecution) -> RemoteResult<ExecutionHandle>;

    /// Fetches the current status of an execution.
    async fn get_execution(&self, handle: &ExecutionHandle) -> RemoteResult<ExecutionStatus>;

    /// Asks the engine to stop an execution.
    async fn stop_execution(&self, handle: &ExecutionHandle) -> RemoteResult<()>;
}
