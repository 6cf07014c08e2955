//! boxpub core library
//!
//! Publishes a packaged Vagrant box to a blob store and registers it in the
//! catalog manifest that Vagrant reads to discover box versions.
//!
//! # Architecture
//!
//! ```text
//! BuildArtifact (.box file + provider id)
//!     │
//!     ├── checksum    ← streaming sha256 of the box
//!     ├── provider    ← build id → catalog provider label
//!     ▼
//! Publisher
//!     │  1. store box         {org}/{title}/{version}/{provider}.box
//!     │  2. fetch manifest    (or start a new one)
//!     │  3. manifest.add      (rejects duplicates)
//!     │  4. store manifest    (conditional on the fetched generation)
//!     ▼
//! BlobStore (gcs | local | memory)
//! ```

pub mod artifact;
pub mod checksum;
pub mod config;
pub mod error;
pub mod manifest;
pub mod provider;
pub mod publish;
pub mod store;

pub use artifact::{BoxFile, BuildArtifact, VAGRANT_BUILDER_ID};
pub use checksum::{sha256_file, ChecksumError, CHECKSUM_TYPE};
pub use config::{ConfigOverrides, PublishConfig, ResolvedConfig, StoreKind, StoreSettings};
pub use error::{PublishError, Result};
pub use manifest::{DuplicateProvider, Manifest, Provider, Version};
pub use provider::ProviderKind;
pub use publish::{FetchedManifest, PublishOutcome, Publisher, MAX_MANIFEST_ATTEMPTS};
pub use store::{BlobStore, Precondition, StoreError, StoredObject, UploadBody};
