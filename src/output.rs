//! Rendering of query output for the terminal.

use crate::decode::ResultItems;
use crate::error::{QueryError, Result};
use crate::runner::QueryOutput;

/// Output format for printed results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON document.
    #[default]
    Json,
    /// One line per item; records as tab-separated `name=value` pairs.
    Text,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            _ => Err(format!("Invalid output format: {s}. Expected: json or text")),
        }
    }
}

/// Renders a query output in the given format.
pub fn render(output: &QueryOutput, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(output)
            .map_err(|e| QueryError::internal(format!("Failed to serialize output: {e}"))),
        OutputFormat::Text => Ok(render_text(output)),
    }
}

fn render_text(output: &QueryOutput) -> String {
    let mut lines: Vec<String> = match &output.items {
        ResultItems::Raw(raw) => raw.clone(),
        ResultItems::Records(records) => records
            .iter()
            .map(|r| {
                r.iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect(),
    };

    if let Some(stats) = &output.stats {
        let engine_time = stats
            .engine_execution_time_ms
            .map(|ms| format!(", {ms} ms"))
            .unwrap_or_default();
        lines.push(format!(
            "-- {} items, {} MB scanned, ~${:.6}{}",
            stats.count, stats.data_scanned_mb, stats.query_cost_usd, engine_time
        ));
    }

    lines.join("\n")
}
