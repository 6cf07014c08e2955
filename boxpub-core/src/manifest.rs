//! Box catalog manifest
//!
//! The manifest is the JSON document Vagrant fetches to discover which
//! versions of a box exist and which providers each version was built for.
//! Entries are only ever appended; an existing provider entry is never
//! overwritten.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::checksum::CHECKSUM_TYPE;

/// A box catalog (the manifest document)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Logical box name (e.g. "acme/base")
    pub name: String,

    /// Versions in the order they were first published
    #[serde(default, deserialize_with = "null_as_empty")]
    pub versions: Vec<Version>,
}

/// One published version of a box
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Version string, treated as opaque
    pub version: String,

    /// Providers in the order they were published
    #[serde(default, deserialize_with = "null_as_empty")]
    pub providers: Vec<Provider>,
}

/// A box built for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Provider label (e.g. "virtualbox")
    pub name: String,

    /// Location of the box in the blob store
    pub url: String,

    /// Digest algorithm
    pub checksum_type: String,

    /// Hex digest of the box at upload time
    pub checksum: String,
}

/// A provider entry already exists for the version
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{provider} box already exists in manifest for version {version}")]
pub struct DuplicateProvider {
    pub provider: String,
    pub version: String,
}

/// Documents written by older tooling encode empty lists as `null`
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Provider {
    /// Create a provider entry with a sha256 checksum
    pub fn sha256(name: impl Into<String>, url: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            checksum_type: CHECKSUM_TYPE.to_string(),
            checksum: checksum.into(),
        }
    }
}

impl Version {
    /// Get a provider entry by name
    pub fn provider(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.name == name)
    }
}

impl Manifest {
    /// Create an empty manifest for a box
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
        }
    }

    /// Decode a manifest document
    ///
    /// Unknown fields are ignored. Structurally invalid documents are
    /// rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Encode the manifest as JSON
    ///
    /// Output follows the in-memory order of versions and providers, with a
    /// trailing newline.
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Add a provider entry under a version
    ///
    /// Creates the version if it does not exist yet. Fails without modifying
    /// the manifest if the version already has a provider with the same name.
    pub fn add(&mut self, version: &str, provider: Provider) -> Result<(), DuplicateProvider> {
        match self.versions.iter_mut().find(|v| v.version == version) {
            Some(existing) => {
                if existing.provider(&provider.name).is_some() {
                    return Err(DuplicateProvider {
                        provider: provider.name,
                        version: version.to_string(),
                    });
                }
                existing.providers.push(provider);
            }
            None => self.versions.push(Version {
                version: version.to_string(),
                providers: vec![provider],
            }),
        }
        Ok(())
    }

    /// Get a version entry
    pub fn version(&self, version: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Number of versions
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Number of provider entries across all versions
    pub fn provider_count(&self) -> usize {
        self.versions.iter().map(|v| v.providers.len()).sum()
    }
}

#[cfg(test)]
mod manifest_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(name: &str) -> Provider {
        Provider::sha256(
            name,
            format!("gs://boxes/acme/base/1.0.0/{name}.box"),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        )
    }

    #[test]
    fn test_add_creates_version() {
        let mut manifest = Manifest::new("acme/base");
        manifest.add("1.0.0", entry("virtualbox")).unwrap();

        assert_eq!(manifest.version_count(), 1);
        let version = manifest.version("1.0.0").unwrap();
        assert_eq!(version.providers, vec![entry("virtualbox")]);
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let mut manifest = Manifest::new("acme/base");
        manifest.add("2.0.0", entry("virtualbox")).unwrap();
        manifest.add("1.0.0", entry("virtualbox")).unwrap();
        manifest.add("2.0.0", entry("vmware_desktop")).unwrap();
        manifest.add("2.0.0", entry("aws")).unwrap();
        manifest.add("10.0.0", entry("docker")).unwrap();

        let versions: Vec<&str> = manifest.versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(versions, vec!["2.0.0", "1.0.0", "10.0.0"]);

        let providers: Vec<&str> = manifest
            .version("2.0.0")
            .unwrap()
            .providers
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(providers, vec!["virtualbox", "vmware_desktop", "aws"]);
        assert_eq!(manifest.provider_count(), 5);
    }

    #[test]
    fn test_add_duplicate_leaves_manifest_unchanged() {
        let mut manifest = Manifest::new("acme/base");
        manifest.add("1.0.0", entry("virtualbox")).unwrap();
        let before = manifest.clone();

        let mut replacement = entry("virtualbox");
        replacement.url = "gs://elsewhere/other.box".to_string();
        let err = manifest.add("1.0.0", replacement).unwrap_err();

        assert_eq!(
            err,
            DuplicateProvider {
                provider: "virtualbox".to_string(),
                version: "1.0.0".to_string(),
            }
        );
        assert_eq!(
            err.to_string(),
            "virtualbox box already exists in manifest for version 1.0.0"
        );
        assert_eq!(manifest, before);
    }

    #[test]
    fn test_same_provider_in_other_version_is_allowed() {
        let mut manifest = Manifest::new("acme/base");
        manifest.add("1.0.0", entry("virtualbox")).unwrap();
        manifest.add("1.0.1", entry("virtualbox")).unwrap();
        assert_eq!(manifest.version_count(), 2);
    }

    #[test]
    fn test_version_match_is_exact() {
        let mut manifest = Manifest::new("acme/base");
        manifest.add("1.0", entry("virtualbox")).unwrap();
        manifest.add("1.0.0", entry("virtualbox")).unwrap();
        assert_eq!(manifest.version_count(), 2);
    }

    #[test]
    fn test_serialize_field_layout() {
        let mut manifest = Manifest::new("acme/base");
        manifest
            .add("1.0.0", Provider::sha256("virtualbox", "gs://b/k.box", "abc"))
            .unwrap();

        let json = String::from_utf8(manifest.serialize().unwrap()).unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"name":"acme/base","versions":[{"version":"1.0.0","providers":"#,
                r#"[{"name":"virtualbox","url":"gs://b/k.box","checksum_type":"sha256","checksum":"abc"}]}]}"#,
                "\n"
            )
        );
    }

    #[test]
    fn test_serialize_empty_manifest_emits_versions() {
        let json = String::from_utf8(Manifest::new("acme/base").serialize().unwrap()).unwrap();
        assert_eq!(json, "{\"name\":\"acme/base\",\"versions\":[]}\n");
    }

    #[test]
    fn test_roundtrip() {
        let mut manifest = Manifest::new("acme/base");
        manifest.add("1.0.0", entry("virtualbox")).unwrap();
        manifest.add("1.0.0", entry("aws")).unwrap();
        manifest.add("0.9.0", entry("libvirt")).unwrap();

        let decoded = Manifest::from_slice(&manifest.serialize().unwrap()).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_decode_tolerates_unknown_fields() {
        let json = r#"{
            "name": "acme/base",
            "description": "Base image",
            "versions": [{
                "version": "1.0.0",
                "status": "active",
                "providers": [{
                    "name": "virtualbox",
                    "url": "gs://b/k.box",
                    "checksum_type": "sha256",
                    "checksum": "abc",
                    "size": 42
                }]
            }]
        }"#;

        let manifest = Manifest::from_slice(json.as_bytes()).unwrap();
        assert_eq!(manifest.name, "acme/base");
        assert_eq!(
            manifest.version("1.0.0").unwrap().provider("virtualbox").unwrap().url,
            "gs://b/k.box"
        );
    }

    #[test]
    fn test_decode_null_and_missing_lists() {
        let manifest = Manifest::from_slice(br#"{"name":"acme/base","versions":null}"#).unwrap();
        assert!(manifest.versions.is_empty());

        let manifest = Manifest::from_slice(br#"{"name":"acme/base"}"#).unwrap();
        assert!(manifest.versions.is_empty());

        let manifest =
            Manifest::from_slice(br#"{"name":"acme/base","versions":[{"version":"1.0.0","providers":null}]}"#)
                .unwrap();
        assert!(manifest.version("1.0.0").unwrap().providers.is_empty());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(Manifest::from_slice(b"not json").is_err());
        assert!(Manifest::from_slice(br#"{"versions":[]}"#).is_err());
        assert!(Manifest::from_slice(br#"{"name":"acme/base","versions":"1.0.0"}"#).is_err());
        assert!(Manifest::from_slice(
            br#"{"name":"acme/base","versions":[{"version":"1.0.0","providers":[{"name":"virtualbox"}]}]}"#
        )
        .is_err());
        assert!(Manifest::from_slice(br#"{"name":"acme/base","versions":[]"#).is_err());
    }
}
