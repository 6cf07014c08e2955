//! Publish error types with actionable messages

use std::path::PathBuf;
use thiserror::Error;

use crate::checksum::ChecksumError;
use crate::manifest::DuplicateProvider;
use crate::store::StoreError;

/// Result type for publish operations
pub type Result<T> = std::result::Result<T, PublishError>;

/// Errors that abort a publish
#[derive(Error, Debug)]
pub enum PublishError {
    /// One or more configuration values are missing or malformed
    #[error("Invalid configuration:\n  - {}", .problems.join("\n  - "))]
    InvalidConfig { problems: Vec<String> },

    /// Failed to read the config file
    #[error("Failed to read config file {}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the config file
    #[error("Failed to parse config file {}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    /// The build artifact is not a usable box
    #[error("Invalid build artifact: {reason}")]
    InvalidArtifact { reason: String },

    /// The artifact id has no catalog provider
    #[error("Unknown artifact type, can't build box: {id}")]
    UnsupportedProvider { id: String },

    /// Failed to compute the box checksum
    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    /// The blob store rejected or failed a request
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The stored manifest could not be decoded
    #[error("Manifest at {location} is corrupt; refusing to overwrite it")]
    CorruptManifest {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    /// The version already has a box for this provider
    #[error(transparent)]
    DuplicateProvider(#[from] DuplicateProvider),

    /// Other publishers kept updating the manifest between our read and write
    #[error("Manifest at {location} was modified concurrently; gave up after {attempts} attempts")]
    ConcurrentModification { location: String, attempts: u32 },

    /// The manifest could not be encoded
    #[error("Failed to encode manifest")]
    Encode(#[source] serde_json::Error),
}

impl PublishError {
    /// Whether the error was raised before anything was written to the store
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PublishError::InvalidConfig { .. }
                | PublishError::ConfigRead { .. }
                | PublishError::ConfigParse { .. }
                | PublishError::InvalidArtifact { .. }
                | PublishError::UnsupportedProvider { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_lists_every_problem() {
        let err = PublishError::InvalidConfig {
            problems: vec!["version must be set".to_string(), "bucket must be set".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration:\n  - version must be set\n  - bucket must be set"
        );
        assert!(err.is_input_error());
    }

    #[test]
    fn test_duplicate_provider_message() {
        let err = PublishError::from(DuplicateProvider {
            provider: "virtualbox".to_string(),
            version: "1.0.0".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "virtualbox box already exists in manifest for version 1.0.0"
        );
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_unsupported_provider_message() {
        let err = PublishError::UnsupportedProvider {
            id: "qemu".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown artifact type, can't build box: qemu");
    }

    #[test]
    fn test_corrupt_manifest_keeps_source() {
        let source = serde_json::from_slice::<serde_json::Value>(b"{not json").unwrap_err();
        let err = PublishError::CorruptManifest {
            location: "gs://boxes/acme/base".to_string(),
            source,
        };
        assert!(err.to_string().contains("gs://boxes/acme/base"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
