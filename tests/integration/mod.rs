//! Integration tests for lakequery.

pub mod config_test;
pub mod runner_test;
