//! Build-system artifact ids and the catalog provider labels they map to

use std::fmt;

/// Provider a box was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Aws,
    Azure,
    DigitalOcean,
    Docker,
    Google,
    HyperV,
    Libvirt,
    Lxc,
    Parallels,
    Scaleway,
    VirtualBox,
    VmwareDesktop,
}

impl ProviderKind {
    /// Every supported provider
    pub const ALL: [ProviderKind; 12] = [
        ProviderKind::Aws,
        ProviderKind::Azure,
        ProviderKind::DigitalOcean,
        ProviderKind::Docker,
        ProviderKind::Google,
        ProviderKind::HyperV,
        ProviderKind::Libvirt,
        ProviderKind::Lxc,
        ProviderKind::Parallels,
        ProviderKind::Scaleway,
        ProviderKind::VirtualBox,
        ProviderKind::VmwareDesktop,
    ];

    /// Look up the provider for a build-system artifact id
    pub fn from_artifact_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.artifact_id() == id)
    }

    /// Artifact id the build system reports for this provider
    pub fn artifact_id(self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
            ProviderKind::Azure => "azure",
            ProviderKind::DigitalOcean => "digitalocean",
            ProviderKind::Docker => "docker",
            ProviderKind::Google => "google",
            ProviderKind::HyperV => "hyperv",
            ProviderKind::Libvirt => "libvirt",
            ProviderKind::Lxc => "lxc",
            ProviderKind::Parallels => "parallels",
            ProviderKind::Scaleway => "scaleway",
            ProviderKind::VirtualBox => "virtualbox",
            ProviderKind::VmwareDesktop => "vmware",
        }
    }

    /// Provider name written into the manifest
    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::DigitalOcean => "digital_ocean",
            ProviderKind::VmwareDesktop => "vmware_desktop",
            other => other.artifact_id(),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_mapping_table() {
        let expected = [
            ("aws", "aws"),
            ("azure", "azure"),
            ("digitalocean", "digital_ocean"),
            ("docker", "docker"),
            ("google", "google"),
            ("hyperv", "hyperv"),
            ("libvirt", "libvirt"),
            ("lxc", "lxc"),
            ("parallels", "parallels"),
            ("scaleway", "scaleway"),
            ("virtualbox", "virtualbox"),
            ("vmware", "vmware_desktop"),
        ];

        for (id, label) in expected {
            let kind = ProviderKind::from_artifact_id(id)
                .unwrap_or_else(|| panic!("{id} should be supported"));
            assert_eq!(kind.label(), label);
            assert_eq!(kind.to_string(), label);
        }
        assert_eq!(expected.len(), ProviderKind::ALL.len());
    }

    #[test]
    fn test_unknown_ids() {
        assert_eq!(ProviderKind::from_artifact_id("qemu"), None);
        assert_eq!(ProviderKind::from_artifact_id("VirtualBox"), None);
        assert_eq!(ProviderKind::from_artifact_id("vmware_desktop"), None);
        assert_eq!(ProviderKind::from_artifact_id(""), None);
    }

    #[test]
    fn test_ids_and_labels_are_unique() {
        let ids: HashSet<_> = ProviderKind::ALL.iter().map(|k| k.artifact_id()).collect();
        let labels: HashSet<_> = ProviderKind::ALL.iter().map(|k| k.label()).collect();
        assert_eq!(ids.len(), ProviderKind::ALL.len());
        assert_eq!(labels.len(), ProviderKind::ALL.len());
    }
}
