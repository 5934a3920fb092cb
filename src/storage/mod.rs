//! Object storage access for lakequery.
//!
//! Result sets are read from object storage as line-readable streams. The
//! trait keeps the runner independent of where the bytes come from.

mod memory;
mod s3;

pub use memory::InMemoryObjectStore;
pub use s3::{S3ObjectStore, S3StoreConfig};

use async_trait::async_trait;
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncBufRead;
use url::Url;

use crate::error::{QueryError, RemoteError, RemoteResult, Result};

/// A buffered byte stream over one stored object.
pub type ObjectReader = Pin<Box<dyn AsyncBufRead + Send>>;

/// Trait defining read access to object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Opens the object at `location` for streaming reads.
    async fn fetch_object(&self, location: &ObjectLocation) -> RemoteResult<ObjectReader>;
}

/// Bucket and key of an object, parsed from an `s3://bucket/key` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub bucket: String,
    /// Object key without the leading slash. Empty for a bucket-level prefix.
    pub key: String,
}

impl ObjectLocation {
    /// Parses an `s3://bucket/key` URI.
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).map_err(|e| {
            QueryError::Storage(RemoteError::new(
                "InvalidLocation",
                format!("Invalid storage location '{uri}': {e}"),
            ))
        })?;

        if url.scheme() != "s3" {
            return Err(QueryError::Storage(RemoteError::new(
                "InvalidLocation",
                format!(
                    "Invalid scheme '{}' in '{uri}'. Expected 's3'",
                    url.scheme()
                ),
            )));
        }

        let bucket = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                QueryError::Storage(RemoteError::new(
                    "InvalidLocation",
                    format!("Missing bucket in '{uri}'"),
                ))
            })?
            .to_string();
        let key = url.path().trim_start_matches('/').to_string();

        Ok(Self { bucket, key })
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
