//! S3-compatible object store client.
//!
//! Reads result objects through the `object_store` crate. Requests go
//! unsigned to the configured endpoint with path-style addressing, and the
//! body is streamed without buffering it.

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ClientOptions;
use object_store::ObjectStore as RemoteStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::error::{QueryError, RemoteError, RemoteResult, Result};
use crate::storage::{ObjectLocation, ObjectReader, ObjectStore};

/// Default timeout for establishing a download.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Region sent with requests. Unsigned requests do not depend on it.
const DEFAULT_REGION: &str = "us-east-1";

/// S3 store configuration.
#[derive(Debug, Clone)]
pub struct S3StoreConfig {
    /// Base URL of the storage endpoint.
    pub endpoint: String,
    /// Connect timeout in seconds.
    pub timeout_secs: u64,
}

impl S3StoreConfig {
    /// Creates a new config for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Sets the connect timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Object store reading from an S3-compatible endpoint.
///
/// One client is built per bucket on first use and reused afterwards.
pub struct S3ObjectStore {
    config: S3StoreConfig,
    buckets: Mutex<HashMap<String, Arc<dyn RemoteStore>>>,
}

impl S3ObjectStore {
    /// Creates a new store client with the given configuration.
    pub fn new(config: S3StoreConfig) -> Result<Self> {
        let store = Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        };
        // Validates the endpoint up front.
        store.build_bucket_store("lakequery")?;
        Ok(store)
    }

    fn build_bucket_store(&self, bucket: &str) -> Result<Arc<dyn RemoteStore>> {
        // Only the connect phase is bounded; large result objects may take a while to stream.
        let client_options = ClientOptions::new()
            .with_connect_timeout(Duration::from_secs(self.config.timeout_secs));

        let store = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(DEFAULT_REGION)
            .with_endpoint(&self.config.endpoint)
            .with_allow_http(true)
            .with_skip_signature(true)
            .with_virtual_hosted_style_request(false)
            .with_client_options(client_options)
            .build()
            .map_err(|e| QueryError::config(format!("Failed to create S3 store: {}", e)))?;

        Ok(Arc::new(store))
    }

    /// Returns the client for `bucket`, building it on first use.
    fn bucket_store(&self, bucket: &str) -> RemoteResult<Arc<dyn RemoteStore>> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = buckets.get(bucket) {
            return Ok(store.clone());
        }

        let store = self
            .build_bucket_store(bucket)
            .map_err(|e| RemoteError::new("UnknownEndpoint", e.to_string()))?;
        buckets.insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch_object(&self, location: &ObjectLocation) -> RemoteResult<ObjectReader> {
        debug!("Fetching result object: {}", location);
        let store = self.bucket_store(&location.bucket)?;
        open_object(store.as_ref(), location).await
    }
}

/// Opens `location.key` in `store` as a streaming line reader.
async fn open_object(
    store: &dyn RemoteStore,
    location: &ObjectLocation,
) -> RemoteResult<ObjectReader> {
    let path = ObjectPath::from(location.key.as_str());
    let result = store.get(&path).await.map_err(map_store_error)?;

    let stream = result
        .into_stream()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

    Ok(Box::pin(StreamReader::new(stream)))
}

/// Maps an `object_store` failure onto S3 error codes.
fn map_store_error(e: object_store::Error) -> RemoteError {
    let code = match &e {
        object_store::Error::NotFound { .. } => "NoSuchKey",
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => "AccessDenied",
        _ => "",
    };
    RemoteError::new(code, e.to_string())
}
