//! Publish configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. Command-line flags ([`ConfigOverrides`])
//! 2. Environment (`BOXPUB_ACCESS_TOKEN`)
//! 3. A YAML config file (`--config`, `$BOXPUB_CONFIG` or `./boxpub.yaml`)
//! 4. Built-in defaults
//!
//! ## File Format
//!
//! ```yaml
//! box_name: acme/base          # organization/title
//! version: 1.0.0
//! bucket: acme-vagrant-boxes
//! box_manifest: acme/base.json # optional, defaults to box_name
//! box_dir: releases/base       # optional, defaults to acme/base/1.0.0
//! store: gcs                   # gcs | local | memory
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::artifact::BOX_EXTENSION;
use crate::error::{PublishError, Result};
use crate::provider::ProviderKind;

/// Config file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "boxpub.yaml";

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "BOXPUB_CONFIG";

/// Environment variable holding the Cloud Storage access token
pub const ACCESS_TOKEN_ENV: &str = "BOXPUB_ACCESS_TOKEN";

/// Which blob store backend to publish to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Google Cloud Storage
    #[default]
    Gcs,
    /// A local directory tree
    Local,
    /// Process memory; nothing outlives the run
    Memory,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Gcs => f.write_str("gcs"),
            StoreKind::Local => f.write_str("local"),
            StoreKind::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "gcs" => Ok(StoreKind::Gcs),
            "local" => Ok(StoreKind::Local),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!(
                "Unknown store '{other}'. Valid stores: gcs, local, memory"
            )),
        }
    }
}

/// Raw publish configuration, as read from file and environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Logical box name, `organization/title`
    #[serde(default)]
    pub box_name: String,

    /// Version being published
    #[serde(default)]
    pub version: String,

    /// Bucket (container) receiving boxes and the manifest
    #[serde(default)]
    pub bucket: String,

    /// Manifest key, defaults to the box name
    #[serde(default)]
    pub box_manifest: Option<String>,

    /// Directory for box files, defaults to `organization/title/version`
    #[serde(default)]
    pub box_dir: Option<String>,

    /// Bearer token for Cloud Storage
    #[serde(default)]
    pub access_token: Option<String>,

    /// Backend to publish to
    #[serde(default)]
    pub store: StoreKind,

    /// Root directory of the local store
    #[serde(default)]
    pub store_root: Option<PathBuf>,

    /// Cloud Storage endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Values supplied on the command line; `None` keeps the configured value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub box_name: Option<String>,
    pub version: Option<String>,
    pub bucket: Option<String>,
    pub box_manifest: Option<String>,
    pub box_dir: Option<String>,
    pub access_token: Option<String>,
    pub store: Option<StoreKind>,
    pub store_root: Option<PathBuf>,
    pub endpoint: Option<String>,
}

/// How to reach the blob store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    Gcs {
        access_token: String,
        endpoint: Option<String>,
    },
    Local {
        root: PathBuf,
    },
    Memory,
}

/// Validated configuration consumed by the publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub box_name: String,
    pub organization: String,
    pub title: String,
    pub version: String,
    pub bucket: String,
    pub manifest_key: String,
    pub box_dir: String,
    pub store: StoreSettings,
}

/// Treat empty strings the same as unset values
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl PublishConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml_ng::Error> {
        serde_yaml_ng::from_str(content)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| PublishError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| PublishError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from an explicit path, or `./boxpub.yaml` if it exists, or defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    tracing::debug!("Using config file {}", default_path.display());
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Override values from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Override values from an environment lookup
    ///
    /// Unset or empty variables leave the configured value alone.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = non_empty(lookup(ACCESS_TOKEN_ENV)) {
            self.access_token = Some(token);
        }
    }

    /// Apply command-line overrides
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides {
            box_name,
            version,
            bucket,
            box_manifest,
            box_dir,
            access_token,
            store,
            store_root,
            endpoint,
        } = overrides;

        if let Some(box_name) = box_name {
            self.box_name = box_name;
        }
        if let Some(version) = version {
            self.version = version;
        }
        if let Some(bucket) = bucket {
            self.bucket = bucket;
        }
        if box_manifest.is_some() {
            self.box_manifest = box_manifest;
        }
        if box_dir.is_some() {
            self.box_dir = box_dir;
        }
        if access_token.is_some() {
            self.access_token = access_token;
        }
        if let Some(store) = store {
            self.store = store;
        }
        if store_root.is_some() {
            self.store_root = store_root;
        }
        if endpoint.is_some() {
            self.endpoint = endpoint;
        }
    }

    /// Validate and fill in defaults for a publish
    ///
    /// Every problem is reported at once.
    pub fn resolve(self) -> Result<ResolvedConfig> {
        self.resolve_with(true)
    }

    /// Validate only what is needed to read the manifest
    pub fn resolve_for_reading(self) -> Result<ResolvedConfig> {
        self.resolve_with(false)
    }

    fn resolve_with(self, require_version: bool) -> Result<ResolvedConfig> {
        let mut problems = Vec::new();

        let box_name = self.box_name.trim().to_string();
        let version = self.version.trim().to_string();
        let bucket = self.bucket.trim().to_string();

        let (organization, title) = if box_name.is_empty() {
            problems.push("box_name must be set".to_string());
            (String::new(), String::new())
        } else {
            match box_name.split_once('/') {
                Some((org, title)) if !org.is_empty() && !title.is_empty() && !title.contains('/') => {
                    (org.to_string(), title.to_string())
                }
                _ => {
                    problems.push(format!(
                        "box_name '{box_name}' must have the form organization/title"
                    ));
                    (String::new(), String::new())
                }
            }
        };

        if require_version && version.is_empty() {
            problems.push("version must be set".to_string());
        }
        if bucket.is_empty() {
            problems.push("bucket must be set".to_string());
        }

        let store = match self.store {
            StoreKind::Gcs => match non_empty(self.access_token) {
                Some(access_token) => Some(StoreSettings::Gcs {
                    access_token,
                    endpoint: non_empty(self.endpoint),
                }),
                None => {
                    problems.push(format!(
                        "access_token must be set for the gcs store (or set {ACCESS_TOKEN_ENV})"
                    ));
                    None
                }
            },
            StoreKind::Local => match self.store_root {
                Some(root) if !root.as_os_str().is_empty() => Some(StoreSettings::Local { root }),
                _ => {
                    problems.push("store_root must be set for the local store".to_string());
                    None
                }
            },
            StoreKind::Memory => Some(StoreSettings::Memory),
        };

        let store = match store {
            Some(store) if problems.is_empty() => store,
            _ => return Err(PublishError::InvalidConfig { problems }),
        };

        let manifest_key = non_empty(self.box_manifest)
            .map(|key| key.trim_matches('/').to_string())
            .unwrap_or_else(|| box_name.clone());
        let box_dir = non_empty(self.box_dir)
            .map(|dir| dir.trim_matches('/').to_string())
            .unwrap_or_else(|| {
                format!("{organization}/{title}/{version}")
                    .trim_end_matches('/')
                    .to_string()
            });

        Ok(ResolvedConfig {
            box_name,
            organization,
            title,
            version,
            bucket,
            manifest_key,
            box_dir,
            store,
        })
    }
}

impl ResolvedConfig {
    /// Object key of the box file for a provider
    pub fn artifact_key(&self, provider: ProviderKind) -> String {
        if self.box_dir.is_empty() {
            format!("{}.{BOX_EXTENSION}", provider.label())
        } else {
            format!("{}/{}.{BOX_EXTENSION}", self.box_dir, provider.label())
        }
    }
}
