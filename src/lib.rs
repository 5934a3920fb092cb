//! lakequery - a client for asynchronous SQL query engines.
//!
//! Submits a query, polls it to completion (recovering executions that stop
//! making progress), then reads and decodes the result object from storage.

pub mod classify;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod logging;
pub mod output;
pub mod poll;
pub mod runner;
pub mod stats;
pub mod storage;
pub mod submit;

pub use engine::QueryRequest;
pub use error::{QueryError, Result};
pub use runner::{QueryOutput, QueryRunner, RunnerConfig};
