//! Query statistics and cost estimate.
//!
//! Pricing is 5 USD per TB scanned, with a 10 MB minimum charge per query.

use serde::Serialize;

use crate::engine::ExecutionStatistics;

const BYTES_IN_MB: f64 = 1_048_576.0;

/// Cost of one scanned megabyte in USD.
pub const COST_PER_MB: f64 = 0.000004768;

/// Minimum billed megabytes per query.
pub const MIN_BILLED_MB: u64 = 10;

/// Statistics attached to a query output when requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryStats {
    /// Bytes scanned, rounded to whole megabytes.
    pub data_scanned_mb: u64,
    pub query_cost_usd: f64,
    pub engine_execution_time_ms: Option<u64>,
    /// Number of items in the output.
    pub count: usize,
}

impl QueryStats {
    /// Derives stats from the engine's statistics and the decoded item count.
    pub fn from_statistics(statistics: &ExecutionStatistics, count: usize) -> Self {
        let data_scanned_mb = scanned_megabytes(statistics.data_scanned_bytes.unwrap_or(0));

        Self {
            data_scanned_mb,
            query_cost_usd: estimate_cost_usd(data_scanned_mb),
            engine_execution_time_ms: statistics.engine_execution_time_ms,
            count,
        }
    }
}

/// Converts bytes to megabytes, rounded to the nearest whole megabyte.
pub fn scanned_megabytes(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_IN_MB).round() as u64
}

/// Estimates the cost of scanning `megabytes`.
pub fn estimate_cost_usd(megabytes: u64) -> f64 {
    megabytes.max(MIN_BILLED_MB) as f64 * COST_PER_MB
}
