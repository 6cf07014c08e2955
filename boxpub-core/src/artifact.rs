//! Build artifacts handed over by the packaging step

use std::path::{Path, PathBuf};

use crate::error::{PublishError, Result};
use crate::provider::ProviderKind;

/// Builder id of the Vagrant post-processor that produces `.box` files
pub const VAGRANT_BUILDER_ID: &str = "mitchellh.post-processor.vagrant";

/// File extension of packaged boxes
pub const BOX_EXTENSION: &str = "box";

/// Output of a build step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    /// Id of the builder or post-processor that produced the files
    pub builder_id: String,

    /// Artifact id, the provider the box was built for (e.g. "virtualbox")
    pub id: String,

    /// Files produced; only the first one is published
    pub files: Vec<PathBuf>,
}

/// A validated local box file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxFile {
    pub path: PathBuf,
    pub size: u64,
}

impl BuildArtifact {
    /// Artifact for a box produced by the Vagrant post-processor
    pub fn vagrant_box(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            builder_id: VAGRANT_BUILDER_ID.to_string(),
            id: id.into(),
            files: vec![path.into()],
        }
    }

    /// Map the artifact id onto a catalog provider
    pub fn provider(&self) -> Result<ProviderKind> {
        ProviderKind::from_artifact_id(&self.id).ok_or_else(|| PublishError::UnsupportedProvider {
            id: self.id.clone(),
        })
    }

    /// Check that the artifact is a box present on local disk
    pub async fn validate(&self) -> Result<BoxFile> {
        let invalid = |reason: String| PublishError::InvalidArtifact { reason };

        if self.builder_id != VAGRANT_BUILDER_ID {
            return Err(invalid(format!(
                "unknown artifact type '{}', requires an artifact from {VAGRANT_BUILDER_ID}",
                self.builder_id
            )));
        }

        let path = self
            .files
            .first()
            .ok_or_else(|| invalid("artifact has no files".to_string()))?;

        if !has_box_extension(path) {
            return Err(invalid(format!(
                "{} is not a .{BOX_EXTENSION} file",
                path.display()
            )));
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| invalid(format!("cannot read {}: {e}", path.display())))?;
        if !metadata.is_file() {
            return Err(invalid(format!("{} is not a regular file", path.display())));
        }

        Ok(BoxFile {
            path: path.clone(),
            size: metadata.len(),
        })
    }
}

fn has_box_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == BOX_EXTENSION)
}
