//! Result stream decoding.
//!
//! The engine writes two line-oriented encodings: tabular results as
//! quoted-comma rows under a header line, and metadata statements as
//! tab-separated key/value lines. Both decode into [`Record`]s; raw mode
//! hands back the trimmed lines untouched.
//!
//! Decoding never fails on malformed content. Short or long DML rows are
//! zipped with the header up to the shorter of the two, and NonDML lines
//! without a tab fall back to a single `row` field. Only I/O and UTF-8
//! errors from the underlying stream are reported.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::engine::StatementKind;
use crate::error::Result;

/// Field name used for NonDML lines that carry no tab.
pub const FALLBACK_FIELD: &str = "row";

/// Separator between quoted values in a DML row.
const DML_SEPARATOR: &str = "\",\"";

/// How a result stream is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Trimmed lines, no structure.
    Raw,
    /// Header line followed by quoted-comma rows.
    Dml,
    /// Tab-separated key/value lines.
    NonDml,
}

impl DecodeMode {
    /// Returns the structured mode matching a statement kind.
    pub fn for_statement(kind: StatementKind) -> Self {
        if kind.is_dml() {
            Self::Dml
        } else {
            Self::NonDml
        }
    }
}

/// One decoded row: field names mapped to values in source order.
///
/// Empty values are never stored; a field whose value is empty in the
/// source is simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field. Empty values are dropped; an existing field is overwritten in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }

        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Decoded contents of a result stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResultItems {
    Raw(Vec<String>),
    Records(Vec<Record>),
}

impl ResultItems {
    /// Number of lines (raw) or records (structured).
    pub fn len(&self) -> usize {
        match self {
            Self::Raw(lines) => lines.len(),
            Self::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            Self::Records(records) => Some(records),
            Self::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[String]> {
        match self {
            Self::Raw(lines) => Some(lines),
            Self::Records(_) => None,
        }
    }
}

/// Decodes a line-oriented result stream.
pub async fn decode<R>(reader: R, mode: DecodeMode) -> Result<ResultItems>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    match mode {
        DecodeMode::Raw => {
            let mut out = Vec::new();
            while let Some(line) = lines.next_line().await? {
                out.push(line.trim().to_string());
            }
            Ok(ResultItems::Raw(out))
        }
        DecodeMode::Dml => {
            let mut header: Option<Vec<String>> = None;
            let mut records = Vec::new();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match &header {
                    None => header = Some(parse_delimited_line(line)),
                    Some(columns) => records.push(decode_dml_row(columns, line)),
                }
            }
            Ok(ResultItems::Records(records))
        }
        DecodeMode::NonDml => {
            let mut records = Vec::new();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                records.push(decode_non_dml_line(line));
            }
            Ok(ResultItems::Records(records))
        }
    }
}

/// Splits a quoted-comma line (`"a","b","c"`) into its values.
///
/// One leading and one trailing quote are stripped before splitting on
/// `","`; doubled quotes inside a value are unescaped.
pub fn parse_delimited_line(line: &str) -> Vec<String> {
    let inner = line.strip_prefix('"').unwrap_or(line);
    let inner = inner.strip_suffix('"').unwrap_or(inner);

    inner
        .split(DML_SEPARATOR)
        .map(|value| value.replace("\"\"", "\""))
        .collect()
}

/// Builds a record from a DML row, pairing values with header names by position.
pub fn decode_dml_row(columns: &[String], line: &str) -> Record {
    columns
        .iter()
        .map(String::as_str)
        .zip(parse_delimited_line(line))
        .collect()
}

/// Builds a one-field record from a NonDML line.
pub fn decode_non_dml_line(line: &str) -> Record {
    let mut record = Record::new();
    match line.split_once('\t') {
        Some((key, value)) => record.insert(key.trim(), value.trim()),
        None => record.insert(FALLBACK_FIELD, line.trim()),
    }
    record
}
