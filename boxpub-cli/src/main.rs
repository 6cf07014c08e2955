//! boxpub - publish Vagrant boxes and keep their catalog manifest current

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use boxpub_core::sha256_file;

mod publish_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "boxpub",
    about = "Publish Vagrant boxes to a blob store and register them in a catalog manifest",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON lines
    #[clap(long, global = true)]
    json_logs: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Upload a box and add it to the manifest
    Publish(publish_cli::PublishArgs),

    /// Print the current manifest
    Show(publish_cli::ShowArgs),

    /// Print the sha256 of a local file
    Checksum {
        /// File to hash
        file: PathBuf,
    },
}

/// Initialize tracing with CLI flags
///
/// `RUST_LOG` directives are added on top of `--log-level`.
fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let mut filter = EnvFilter::new(log_level.to_filter_directive());
    if let Ok(extra) = std::env::var("RUST_LOG") {
        for directive in extra.split(',').filter(|d| !d.is_empty()) {
            if let Ok(parsed) = directive.parse() {
                filter = filter.add_directive(parsed);
            }
        }
    }

    // Logs go to stderr so stdout stays machine-readable
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Publish(args) => publish_cli::execute_publish(args).await,
        Command::Show(args) => publish_cli::execute_show(args).await,
        Command::Checksum { file } => {
            let digest = sha256_file(&file)
                .await
                .with_context(|| format!("Failed to checksum {}", file.display()))?;
            println!("{digest}  {}", file.display());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.json_logs);

    // Dropping the workflow future aborts in-flight requests; nothing is rolled back
    tokio::select! {
        result = run(cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Received Ctrl-C, aborting in-flight requests");
            anyhow::bail!("Interrupted; the manifest may not have been updated")
        }
    }
}
