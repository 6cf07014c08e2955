//! Publish workflow
//!
//! Uploads a box, then merges a provider entry into the catalog manifest:
//!
//! 1. validate the artifact and map its provider (no network yet)
//! 2. checksum the box
//! 3. upload the box to `{box_dir}/{provider}.box`
//! 4. fetch the manifest, or start a new one if it does not exist
//! 5. add the provider entry, failing on duplicates
//! 6. store the manifest, conditional on the generation read in step 4
//!
//! When the conditional store fails because another publisher updated the
//! manifest in between, steps 4 to 6 are repeated up to
//! [`MAX_MANIFEST_ATTEMPTS`] times. The box is uploaded only once.
//!
//! A failure after step 3 leaves the uploaded box in place. Publishing the
//! same artifact again re-uploads it to the same key.

use serde::Serialize;
use std::sync::Arc;

use crate::artifact::BuildArtifact;
use crate::checksum::sha256_file;
use crate::config::ResolvedConfig;
use crate::error::{PublishError, Result};
use crate::manifest::{Manifest, Provider};
use crate::store::{self, BlobStore, Precondition, StoreError, UploadBody};

/// Fetch-merge-store cycles attempted before giving up on a contended manifest
pub const MAX_MANIFEST_ATTEMPTS: u32 = 3;

/// Content type of uploaded boxes
pub const BOX_CONTENT_TYPE: &str = "application/x-gzip";

/// Content type of the manifest document
pub const MANIFEST_CONTENT_TYPE: &str = "application/json";

/// Result of a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    /// Location of the updated manifest
    pub manifest_url: String,
    /// Location of the uploaded box
    pub artifact_url: String,
    /// Provider label recorded in the manifest
    pub provider: String,
    pub version: String,
    /// sha256 of the box
    pub checksum: String,
    /// Box size in bytes
    pub size: u64,
}

impl PublishOutcome {
    /// Locations written by the publish, manifest first
    pub fn files(&self) -> [&str; 2] {
        [self.manifest_url.as_str(), self.artifact_url.as_str()]
    }
}

/// A manifest as read from the store, with the condition guarding its rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedManifest {
    pub manifest: Manifest,
    pub precondition: Precondition,
    /// The manifest did not exist and was started fresh
    pub created: bool,
}

/// Runs the publish workflow against a blob store
pub struct Publisher {
    config: ResolvedConfig,
    store: Arc<dyn BlobStore>,
}

impl Publisher {
    pub fn new(config: ResolvedConfig, store: Arc<dyn BlobStore>) -> Self {
        Self { config, store }
    }

    /// Create a publisher using the store described by the configuration
    pub fn open(config: ResolvedConfig) -> Result<Self> {
        let store = store::open(&config.store)?;
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Location of the manifest in the store
    pub fn manifest_location(&self) -> String {
        self.store
            .location(&self.config.bucket, &self.config.manifest_key)
    }

    /// Publish a build artifact and register it in the manifest
    pub async fn publish(&self, artifact: &BuildArtifact) -> Result<PublishOutcome> {
        let box_file = artifact.validate().await?;
        let provider = artifact.provider()?;

        tracing::info!(
            "Box file: {} ({} bytes, provider {})",
            box_file.path.display(),
            box_file.size,
            provider
        );

        let checksum = sha256_file(&box_file.path).await?;
        tracing::info!("Box sha256: {}", checksum);

        let key = self.config.artifact_key(provider);
        tracing::info!(
            "Uploading {}: {}",
            BOX_CONTENT_TYPE,
            self.store.location(&self.config.bucket, &key)
        );
        let artifact_url = self
            .store
            .store(
                &self.config.bucket,
                &key,
                UploadBody::File(box_file.path.clone()),
                BOX_CONTENT_TYPE,
                Precondition::None,
            )
            .await?;

        let entry = Provider::sha256(provider.label(), artifact_url.clone(), checksum.clone());
        let manifest_url = self.update_manifest(entry).await?;

        Ok(PublishOutcome {
            manifest_url,
            artifact_url,
            provider: provider.label().to_string(),
            version: self.config.version.clone(),
            checksum,
            size: box_file.size,
        })
    }

    /// Fetch the manifest, or start an empty one if it does not exist
    pub async fn fetch_manifest(&self) -> Result<FetchedManifest> {
        let fetched = self
            .store
            .fetch(&self.config.bucket, &self.config.manifest_key)
            .await?;

        match fetched {
            None => Ok(FetchedManifest {
                manifest: Manifest::new(self.config.box_name.clone()),
                precondition: Precondition::DoesNotExist,
                created: true,
            }),
            Some(object) => {
                let manifest = Manifest::from_slice(&object.bytes).map_err(|source| {
                    PublishError::CorruptManifest {
                        location: self.manifest_location(),
                        source,
                    }
                })?;
                Ok(FetchedManifest {
                    manifest,
                    precondition: Precondition::guarding(Some(&object)),
                    created: false,
                })
            }
        }
    }

    /// Merge a provider entry into the stored manifest and return its location
    async fn update_manifest(&self, entry: Provider) -> Result<String> {
        let location = self.manifest_location();

        for attempt in 1..=MAX_MANIFEST_ATTEMPTS {
            let FetchedManifest {
                mut manifest,
                precondition,
                created,
            } = self.fetch_manifest().await?;

            if created {
                tracing::info!("Manifest create: {}", manifest.name);
            }
            tracing::info!("Manifest add: {} ({})", entry.name, self.config.version);
            manifest.add(&self.config.version, entry.clone())?;

            tracing::info!("Uploading {}: {}", MANIFEST_CONTENT_TYPE, location);

            let bytes = manifest.serialize().map_err(PublishError::Encode)?;
            let stored = self
                .store
                .store(
                    &self.config.bucket,
                    &self.config.manifest_key,
                    UploadBody::Bytes(bytes),
                    MANIFEST_CONTENT_TYPE,
                    precondition,
                )
                .await;

            match stored {
                Ok(url) => return Ok(url),
                Err(StoreError::PreconditionFailed { .. }) => {
                    tracing::warn!(
                        "Manifest {} changed while updating (attempt {}/{})",
                        location,
                        attempt,
                        MAX_MANIFEST_ATTEMPTS
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(PublishError::ConcurrentModification {
            location,
            attempts: MAX_MANIFEST_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::store::MemoryBlobStore;

    fn config() -> ResolvedConfig {
        ResolvedConfig {
            box_name: "acme/base".to_string(),
            organization: "acme".to_string(),
            title: "base".to_string(),
            version: "1.0.0".to_string(),
            bucket: "boxes".to_string(),
            manifest_key: "acme/base".to_string(),
            box_dir: "acme/base/1.0.0".to_string(),
            store: StoreSettings::Memory,
        }
    }

    #[tokio::test]
    async fn test_fetch_missing_manifest_starts_fresh() {
        let publisher = Publisher::new(config(), Arc::new(MemoryBlobStore::new()));

        let fetched = publisher.fetch_manifest().await.unwrap();
        assert!(fetched.created);
        assert_eq!(fetched.manifest, Manifest::new("acme/base"));
        assert_eq!(fetched.precondition, Precondition::DoesNotExist);
    }

    #[tokio::test]
    async fn test_fetch_existing_manifest_guards_generation() {
        let store = Arc::new(MemoryBlobStore::new());
        let generation = store.insert(
            "boxes",
            "acme/base",
            br#"{"name":"acme/base","versions":[]}"#.to_vec(),
            MANIFEST_CONTENT_TYPE,
        );
        let publisher = Publisher::new(config(), store);

        let fetched = publisher.fetch_manifest().await.unwrap();
        assert!(!fetched.created);
        assert_eq!(
            fetched.precondition,
            Precondition::GenerationMatch(generation.to_string())
        );
    }

    #[test]
    fn test_outcome_files_lists_manifest_first() {
        let outcome = PublishOutcome {
            manifest_url: "mem://boxes/acme/base".to_string(),
            artifact_url: "mem://boxes/acme/base/1.0.0/virtualbox.box".to_string(),
            provider: "virtualbox".to_string(),
            version: "1.0.0".to_string(),
            checksum: "00".repeat(32),
            size: 1,
        };
        assert_eq!(
            outcome.files(),
            ["mem://boxes/acme/base", "mem://boxes/acme/base/1.0.0/virtualbox.box"]
        );
    }
}
