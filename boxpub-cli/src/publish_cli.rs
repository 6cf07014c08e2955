//! Publish and show commands
//!
//! Both commands share the same configuration flags, layered over the
//! config file and environment.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use boxpub_core::config::CONFIG_ENV;
use boxpub_core::{
    BuildArtifact, ConfigOverrides, Manifest, PublishConfig, Publisher, ResolvedConfig, StoreKind,
    VAGRANT_BUILDER_ID,
};

/// Configuration flags; each one overrides the config file and environment
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Config file (defaults to $BOXPUB_CONFIG, then ./boxpub.yaml)
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Box name as organization/title
    #[clap(long)]
    pub box_name: Option<String>,

    /// Version to publish
    #[clap(long)]
    pub box_version: Option<String>,

    /// Bucket receiving boxes and the manifest
    #[clap(long)]
    pub bucket: Option<String>,

    /// Manifest key (defaults to the box name)
    #[clap(long)]
    pub box_manifest: Option<String>,

    /// Directory for box files (defaults to organization/title/version)
    #[clap(long)]
    pub box_dir: Option<String>,

    /// Cloud Storage bearer token (prefer $BOXPUB_ACCESS_TOKEN)
    #[clap(long)]
    pub access_token: Option<String>,

    /// Blob store backend: gcs, local or memory
    #[clap(long)]
    pub store: Option<StoreKind>,

    /// Root directory of the local store
    #[clap(long)]
    pub store_root: Option<PathBuf>,

    /// Cloud Storage endpoint override
    #[clap(long)]
    pub endpoint: Option<String>,
}

impl ConfigArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            box_name: self.box_name.clone(),
            version: self.box_version.clone(),
            bucket: self.bucket.clone(),
            box_manifest: self.box_manifest.clone(),
            box_dir: self.box_dir.clone(),
            access_token: self.access_token.clone(),
            store: self.store,
            store_root: self.store_root.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    /// Layer file, environment and flags
    fn load(&self) -> Result<PublishConfig> {
        let path = self
            .config
            .clone()
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = PublishConfig::load_or_default(path.as_deref())
            .context("Failed to load configuration")?;
        config.apply_env();
        config.apply_overrides(self.overrides());
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Packaged .box file
    #[clap(long)]
    pub artifact: PathBuf,

    /// Artifact id of the build (e.g. virtualbox, vmware, aws)
    #[clap(long)]
    pub provider: String,

    /// Builder id that produced the artifact
    #[clap(long, default_value = VAGRANT_BUILDER_ID)]
    pub builder_id: String,

    /// Output the result as JSON
    #[clap(long)]
    pub json: bool,

    #[clap(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Output the manifest as JSON
    #[clap(long, conflicts_with = "table")]
    pub json: bool,

    /// Display providers in a table
    #[clap(short, long)]
    pub table: bool,

    #[clap(flatten)]
    pub config: ConfigArgs,
}

pub async fn execute_publish(args: PublishArgs) -> Result<()> {
    let config: ResolvedConfig = args.config.load()?.resolve()?;
    let publisher = Publisher::open(config).context("Failed to open blob store")?;
    tracing::debug!(
        "Publishing {} {} to {} (box dir {}, manifest {})",
        publisher.config().box_name,
        publisher.config().version,
        publisher.config().bucket,
        publisher.config().box_dir,
        publisher.manifest_location()
    );

    let artifact = BuildArtifact {
        builder_id: args.builder_id,
        id: args.provider,
        files: vec![args.artifact],
    };

    let outcome = publisher.publish(&artifact).await.with_context(|| {
        format!(
            "Failed to publish {} {}",
            publisher.config().box_name,
            publisher.config().version
        )
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!(
            "Published {} box for {} {}",
            outcome.provider,
            publisher.config().box_name,
            outcome.version
        );
        println!("  manifest: {}", outcome.manifest_url);
        println!("  box:      {}", outcome.artifact_url);
        println!("  sha256:   {}", outcome.checksum);
    }
    Ok(())
}

#[derive(Tabled)]
struct ProviderRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Checksum")]
    checksum: String,
    #[tabled(rename = "URL")]
    url: String,
}

fn provider_rows(manifest: &Manifest) -> Vec<ProviderRow> {
    manifest
        .versions
        .iter()
        .flat_map(|version| {
            version.providers.iter().map(|provider| ProviderRow {
                version: version.version.clone(),
                provider: provider.name.clone(),
                checksum: format!(
                    "{}:{}",
                    provider.checksum_type,
                    provider.checksum.get(..12).unwrap_or(&provider.checksum)
                ),
                url: provider.url.clone(),
            })
        })
        .collect()
}

pub async fn execute_show(args: ShowArgs) -> Result<()> {
    let config = args.config.load()?.resolve_for_reading()?;
    let publisher = Publisher::open(config).context("Failed to open blob store")?;
    let location = publisher.manifest_location();
    tracing::debug!("Reading manifest {}", location);

    let fetched = publisher
        .fetch_manifest()
        .await
        .with_context(|| format!("Failed to fetch manifest {location}"))?;
    let manifest = fetched.manifest;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    if fetched.created {
        println!("No manifest at {location} yet.");
        return Ok(());
    }

    println!("Manifest: {location}");
    println!("Box:      {}", manifest.name);

    if manifest.versions.is_empty() {
        println!("\nNo versions published.");
        return Ok(());
    }

    if args.table {
        println!();
        let table = Table::new(provider_rows(&manifest))
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()))
            .to_string();
        println!("{table}");
    } else {
        println!();
        for version in &manifest.versions {
            println!("  {}", version.version);
            for provider in &version.providers {
                println!(
                    "    {:<16} {}:{}",
                    provider.name, provider.checksum_type, provider.checksum
                );
                println!("    {:<16} {}", "", provider.url);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxpub_core::Provider;

    #[test]
    fn test_overrides_map_every_flag() {
        let args = ConfigArgs {
            box_name: Some("acme/base".to_string()),
            box_version: Some("1.0.0".to_string()),
            store: Some(StoreKind::Local),
            store_root: Some(PathBuf::from("/srv/boxes")),
            ..Default::default()
        };
        let overrides = args.overrides();
        assert_eq!(overrides.version.as_deref(), Some("1.0.0"));
        assert_eq!(overrides.store, Some(StoreKind::Local));
        assert_eq!(overrides.bucket, None);
    }

    #[test]
    fn test_provider_rows_shorten_checksums() {
        let mut manifest = Manifest::new("acme/base");
        manifest
            .add(
                "1.0.0",
                Provider::sha256("virtualbox", "gs://boxes/a.box", "0123456789abcdef"),
            )
            .unwrap();

        let rows = provider_rows(&manifest);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].checksum, "sha256:0123456789ab");
        assert_eq!(rows[0].version, "1.0.0");
    }
}
