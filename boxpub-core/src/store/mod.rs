//! Blob store abstraction
//!
//! Boxes and manifests are written through the same [`BlobStore`] trait so
//! the publish workflow does not care where objects live:
//! - Google Cloud Storage (`gs://`, behind the `gcs` feature)
//! - A local directory tree (`file://`)
//! - An in-process map (`mem://`, tests and dry runs)
//!
//! A missing object is not an error: [`BlobStore::fetch`] returns `Ok(None)`.
//! Writes can be made conditional on the generation observed at fetch time so
//! concurrent publishers do not silently drop each other's manifest entries.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::StoreSettings;

#[cfg(feature = "gcs")]
pub mod gcs;
pub mod local;
pub mod memory;

#[cfg(feature = "gcs")]
pub use gcs::GcsBlobStore;
pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

/// Result type for blob store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Blob store operation, used in error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Fetch,
    Store,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Fetch => f.write_str("fetch"),
            Operation::Store => f.write_str("store"),
        }
    }
}

/// Blob store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object changed (or appeared) since it was read
    #[error("Precondition failed writing {container}/{key}: the object changed since it was read")]
    PreconditionFailed { container: String, key: String },

    /// The request never produced a response
    #[error("Failed to {operation} {container}/{key}: {source}")]
    Transport {
        operation: Operation,
        container: String,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The service answered with an error status
    #[error("Failed to {operation} {container}/{key}: HTTP {status}: {body}")]
    Status {
        operation: Operation,
        container: String,
        key: String,
        status: u16,
        body: String,
    },

    /// Local filesystem error
    #[error("Failed to {operation} {}: {source}", .path.display())]
    Io {
        operation: Operation,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The key cannot be mapped onto this store
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// The store could not be constructed
    #[error("Invalid store configuration: {0}")]
    Configuration(String),
}

/// An object read from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object content
    pub bytes: Vec<u8>,

    /// Opaque version token, if the store provides one
    pub generation: Option<String>,
}

/// Content to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadBody {
    /// Stream a local file
    File(PathBuf),
    /// Upload an in-memory buffer
    Bytes(Vec<u8>),
}

/// Condition a write must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Precondition {
    /// Overwrite unconditionally
    #[default]
    None,
    /// Only create; fail if the object exists
    DoesNotExist,
    /// Only overwrite the given generation
    GenerationMatch(String),
}

impl Precondition {
    /// Condition that guards a read-modify-write of `fetched`
    ///
    /// Falls back to an unconditional write when the store reported no
    /// generation for an existing object.
    pub fn guarding(fetched: Option<&StoredObject>) -> Self {
        match fetched {
            None => Precondition::DoesNotExist,
            Some(object) => match &object.generation {
                Some(generation) => Precondition::GenerationMatch(generation.clone()),
                None => Precondition::None,
            },
        }
    }

    /// Check the condition against the current generation (`None` = absent)
    pub fn is_satisfied_by(&self, current: Option<&str>) -> bool {
        match self {
            Precondition::None => true,
            Precondition::DoesNotExist => current.is_none(),
            Precondition::GenerationMatch(expected) => current == Some(expected.as_str()),
        }
    }
}

/// Key-addressed object storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read an object, `Ok(None)` if it does not exist
    async fn fetch(&self, container: &str, key: &str) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its location
    async fn store(
        &self,
        container: &str,
        key: &str,
        body: UploadBody,
        content_type: &str,
        precondition: Precondition,
    ) -> StoreResult<String>;

    /// Backend identifier for logging
    fn name(&self) -> &'static str;

    /// Location string for an object (`scheme://container/key`)
    fn location(&self, container: &str, key: &str) -> String;
}

/// Open the store described by the settings
pub fn open(settings: &StoreSettings) -> StoreResult<Arc<dyn BlobStore>> {
    match settings {
        StoreSettings::Memory => Ok(Arc::new(MemoryBlobStore::new())),
        StoreSettings::Local { root } => Ok(Arc::new(LocalBlobStore::new(root.clone()))),
        #[cfg(feature = "gcs")]
        StoreSettings::Gcs {
            access_token,
            endpoint,
        } => {
            let store = match endpoint {
                Some(endpoint) => GcsBlobStore::with_endpoint(access_token.clone(), endpoint)?,
                None => GcsBlobStore::new(access_token.clone())?,
            };
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "gcs"))]
        StoreSettings::Gcs { .. } => Err(StoreError::Configuration(
            "Cloud Storage support is not enabled. Rebuild with --features gcs".to_string(),
        )),
    }
}

/// Reject keys that would escape a directory-backed store
pub(crate) fn check_relative_key(key: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') {
        return Err(invalid("key must be relative"));
    }
    if key.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(invalid("key contains an empty, '.' or '..' segment"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_guarding() {
        assert_eq!(Precondition::guarding(None), Precondition::DoesNotExist);

        let object = StoredObject {
            bytes: vec![],
            generation: Some("7".to_string()),
        };
        assert_eq!(
            Precondition::guarding(Some(&object)),
            Precondition::GenerationMatch("7".to_string())
        );

        let untracked = StoredObject {
            bytes: vec![],
            generation: None,
        };
        assert_eq!(Precondition::guarding(Some(&untracked)), Precondition::None);
    }

    #[test]
    fn test_precondition_is_satisfied_by() {
        assert!(Precondition::None.is_satisfied_by(None));
        assert!(Precondition::None.is_satisfied_by(Some("1")));

        assert!(Precondition::DoesNotExist.is_satisfied_by(None));
        assert!(!Precondition::DoesNotExist.is_satisfied_by(Some("1")));

        let matching = Precondition::GenerationMatch("2".to_string());
        assert!(matching.is_satisfied_by(Some("2")));
        assert!(!matching.is_satisfied_by(Some("3")));
        assert!(!matching.is_satisfied_by(None));
    }

    #[test]
    fn test_check_relative_key() {
        assert!(check_relative_key("acme/base/1.0.0/virtualbox.box").is_ok());
        assert!(check_relative_key("acme/base").is_ok());

        assert!(check_relative_key("").is_err());
        assert!(check_relative_key("/etc/passwd").is_err());
        assert!(check_relative_key("acme/../../etc").is_err());
        assert!(check_relative_key("acme//base").is_err());
        assert!(check_relative_key("acme/./base").is_err());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::Status {
            operation: Operation::Fetch,
            container: "boxes".to_string(),
            key: "acme/base".to_string(),
            status: 403,
            body: "forbidden".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to fetch boxes/acme/base: HTTP 403: forbidden"
        );

        let err = StoreError::PreconditionFailed {
            container: "boxes".to_string(),
            key: "acme/base".to_string(),
        };
        assert!(err.to_string().contains("boxes/acme/base"));
    }

    #[test]
    fn test_open_memory_and_local() {
        let store = open(&StoreSettings::Memory).unwrap();
        assert_eq!(store.name(), "memory");

        let dir = tempfile::tempdir().unwrap();
        let store = open(&StoreSettings::Local {
            root: dir.path().to_path_buf(),
        })
        .unwrap();
        assert_eq!(store.name(), "local");
    }
}
