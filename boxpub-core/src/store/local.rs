//! Directory-backed blob store
//!
//! Each object lives at `{root}/{container}/{key}/.object`. Keeping the bytes
//! in a reserved leaf lets one key be a prefix of another, so the manifest at
//! `acme/base` can sit next to boxes under `acme/base/1.0.0/`.
//!
//! The generation of an object is the sha256 of its content, so conditional
//! writes detect any change made since the object was read. The check and
//! the write are not atomic across processes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{
    check_relative_key, BlobStore, Operation, Precondition, StoreError, StoreResult, StoredObject,
    UploadBody,
};
use crate::checksum::sha256_bytes;

/// File holding an object's bytes inside its key directory
pub const OBJECT_FILE: &str = ".object";

/// Sibling the object is written to before being renamed into place
const PARTIAL_FILE: &str = ".object.partial";

/// Blob store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of an object's bytes
    pub fn object_path(&self, container: &str, key: &str) -> StoreResult<PathBuf> {
        check_relative_key(container)?;
        check_relative_key(key)?;
        if key.split('/').any(|part| part.starts_with(OBJECT_FILE)) {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: format!("segments starting with '{OBJECT_FILE}' are reserved"),
            });
        }
        Ok(self.root.join(container).join(key).join(OBJECT_FILE))
    }

    async fn read_current(&self, path: &Path, operation: Operation) -> StoreResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                operation,
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        operation: Operation::Store,
        path: path.to_path_buf(),
        source,
    }
}

/// Write the body to `partial` and move it over `path`
async fn write_object(body: UploadBody, partial: &Path, path: &Path) -> StoreResult<()> {
    match body {
        UploadBody::Bytes(bytes) => {
            tokio::fs::write(partial, bytes)
                .await
                .map_err(io_error(partial))?;
        }
        UploadBody::File(source_path) => {
            let mut source = tokio::fs::File::open(&source_path)
                .await
                .map_err(io_error(&source_path))?;
            let mut target = tokio::fs::File::create(partial)
                .await
                .map_err(io_error(partial))?;
            tokio::io::copy(&mut source, &mut target)
                .await
                .map_err(io_error(partial))?;
            target.sync_all().await.map_err(io_error(partial))?;
        }
    }

    tokio::fs::rename(partial, path)
        .await
        .map_err(io_error(path))
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn fetch(&self, container: &str, key: &str) -> StoreResult<Option<StoredObject>> {
        let path = self.object_path(container, key)?;
        debug!("Reading {}", path.display());

        Ok(self
            .read_current(&path, Operation::Fetch)
            .await?
            .map(|bytes| {
                let generation = Some(sha256_bytes(&bytes));
                StoredObject { bytes, generation }
            }))
    }

    async fn store(
        &self,
        container: &str,
        key: &str,
        body: UploadBody,
        _content_type: &str,
        precondition: Precondition,
    ) -> StoreResult<String> {
        let path = self.object_path(container, key)?;

        if precondition != Precondition::None {
            let current = self
                .read_current(&path, Operation::Store)
                .await?
                .map(|bytes| sha256_bytes(&bytes));
            if !precondition.is_satisfied_by(current.as_deref()) {
                return Err(StoreError::PreconditionFailed {
                    container: container.to_string(),
                    key: key.to_string(),
                });
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }

        // Readers never see a partially written object
        let partial = path.with_file_name(PARTIAL_FILE);
        if let Err(e) = write_object(body, &partial, &path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove {}: {}", partial.display(), cleanup);
                }
            }
            return Err(e);
        }
        debug!("Wrote {}", path.display());

        Ok(self.location(container, key))
    }

    fn name(&self) -> &'static str {
        "local"
    }

    fn location(&self, container: &str, key: &str) -> String {
        let path = self.root.join(container).join(key).join(OBJECT_FILE);
        format!("file://{}", path.display())
    }
}
