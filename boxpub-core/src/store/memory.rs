//! In-process blob store
//!
//! Keeps objects in a map guarded by a mutex. Generations increase
//! monotonically across the whole store and preconditions are checked under
//! the same lock as the write, so they are atomic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{BlobStore, Operation, Precondition, StoreError, StoreResult, StoredObject, UploadBody};

/// An object held by [`MemoryBlobStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<(String, String), MemoryObject>,
    last_generation: u64,
}

/// Blob store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    state: Mutex<State>,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write an object directly, bypassing preconditions
    ///
    /// Returns the new generation.
    pub fn insert(&self, container: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> u64 {
        let mut state = self.lock();
        state.last_generation += 1;
        let generation = state.last_generation;
        state.objects.insert(
            (container.to_string(), key.to_string()),
            MemoryObject {
                bytes,
                content_type: content_type.to_string(),
                generation,
            },
        );
        generation
    }

    /// Read an object directly
    pub fn get(&self, container: &str, key: &str) -> Option<MemoryObject> {
        self.lock()
            .objects
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    /// All `(container, key)` pairs, sorted
    pub fn keys(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, container: &str, key: &str) -> StoreResult<Option<StoredObject>> {
        Ok(self.get(container, key).map(|object| StoredObject {
            bytes: object.bytes,
            generation: Some(object.generation.to_string()),
        }))
    }

    async fn store(
        &self,
        container: &str,
        key: &str,
        body: UploadBody,
        content_type: &str,
        precondition: Precondition,
    ) -> StoreResult<String> {
        let bytes = match body {
            UploadBody::Bytes(bytes) => bytes,
            UploadBody::File(path) => {
                tokio::fs::read(&path)
                    .await
                    .map_err(|source| StoreError::Io {
                        operation: Operation::Store,
                        path,
                        source,
                    })?
            }
        };

        let mut state = self.lock();
        let id = (container.to_string(), key.to_string());
        let current = state.objects.get(&id).map(|o| o.generation.to_string());
        if !precondition.is_satisfied_by(current.as_deref()) {
            return Err(StoreError::PreconditionFailed {
                container: container.to_string(),
                key: key.to_string(),
            });
        }

        state.last_generation += 1;
        let generation = state.last_generation;
        state.objects.insert(
            id,
            MemoryObject {
                bytes,
                content_type: content_type.to_string(),
                generation,
            },
        );

        Ok(self.location(container, key))
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn location(&self, container: &str, key: &str) -> String {
        format!("mem://{container}/{key}")
    }
}
