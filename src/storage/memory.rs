//! In-memory object store.
//!
//! Serves objects from a map keyed by location. Used by tests and the
//! binary's `--mock` mode.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::RwLock;

use crate::error::{RemoteError, RemoteResult};
use crate::storage::{ObjectLocation, ObjectReader, ObjectStore};

/// An object store holding its objects in memory.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectLocation, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `contents` at `location`, replacing any previous object.
    pub fn insert(&self, location: ObjectLocation, contents: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(location, contents.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_object(self, location: ObjectLocation, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(location, contents);
        self
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn fetch_object(&self, location: &ObjectLocation) -> RemoteResult<ObjectReader> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let contents = objects.get(location).cloned().ok_or_else(|| {
            RemoteError::new(
                "NoSuchKey",
                format!("The specified key does not exist: {location}"),
            )
        })?;

        Ok(Box::pin(Cursor::new(contents)))
    }
}
