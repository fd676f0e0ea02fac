//! tusvaultctl: maintenance CLI for a tusvault deployment.
//!
//! Operates directly on the configured record and blob stores, so it must run
//! on a host that can reach both.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tusvault_core::config::AppConfig;
use tusvault_core::{NewUpload, UploadId};
use tusvault_uploads::UploadManager;

#[derive(Parser, Debug)]
#[command(name = "tusvaultctl")]
#[command(version, about = "Maintenance CLI for tusvault upload storage", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "TUSVAULT_CONFIG",
        default_value = "config/tusvault.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an upload and print its id
    Create {
        /// Total size in bytes (omit to defer)
        #[arg(long)]
        size: Option<u64>,

        /// Metadata entry as KEY=VALUE (repeatable)
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },

    /// Append a file's content to an upload
    Write {
        upload_id: String,

        /// File to append
        file: PathBuf,

        /// Offset the chunk starts at (defaults to the upload's current offset)
        #[arg(long)]
        offset: Option<u64>,
    },

    /// Declare the total size of a deferred-size upload
    DeclareLength { upload_id: String, size: u64 },

    /// Print an upload record as JSON
    Info { upload_id: String },

    /// Write the bytes uploaded so far to stdout or a file
    Read {
        upload_id: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete an upload's record and blob
    Terminate { upload_id: String },

    /// Remove records without blobs and blobs without records
    Sweep {
        /// Report orphans without deleting them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Check that both stores are reachable
    Health,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    if key.is_empty() {
        return Err("metadata key must not be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_upload_id(s: &str) -> Result<UploadId> {
    UploadId::parse(s).with_context(|| format!("invalid upload id {s:?}"))
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!(config_path = %path.display(), "No config file found, using defaults");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("TUSVAULT_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `read` can stream content on stdout.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli.config)?;
    let manager = tusvault_uploads::from_config(&config)
        .await
        .context("failed to initialize upload stores")?;

    run(cli.command, &manager, &config).await
}

async fn run(command: Commands, manager: &UploadManager, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Create { size, metadata } => {
            let declared = NewUpload {
                size,
                metadata: metadata.into_iter().collect(),
                ..NewUpload::default()
            };
            let id = manager
                .create_upload(declared)
                .await
                .context("failed to create upload")?;
            println!("{id}");
        }

        Commands::Write {
            upload_id,
            file,
            offset,
        } => {
            let id = parse_upload_id(&upload_id)?;
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let offset = match offset {
                Some(offset) => offset,
                None => manager.get_info(id).await?.offset,
            };
            let written = manager
                .write_chunk(id, offset, Bytes::from(data))
                .await
                .context("failed to write chunk")?;
            println!("{}", offset + written);
        }

        Commands::DeclareLength { upload_id, size } => {
            let id = parse_upload_id(&upload_id)?;
            manager
                .declare_length(id, size)
                .await
                .context("failed to declare length")?;
        }

        Commands::Info { upload_id } => {
            let id = parse_upload_id(&upload_id)?;
            let info = manager.get_info(id).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Read { upload_id, output } => {
            let id = parse_upload_id(&upload_id)?;
            let mut reader = manager.get_reader(id).await?;
            match output {
                Some(path) => {
                    let mut file = std::fs::File::create(&path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    std::io::copy(&mut reader, &mut file)?;
                    file.sync_all()?;
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    std::io::copy(&mut reader, &mut stdout)?;
                    stdout.flush()?;
                }
            }
        }

        Commands::Terminate { upload_id } => {
            let id = parse_upload_id(&upload_id)?;
            manager
                .terminate(id)
                .await
                .context("failed to terminate upload")?;
        }

        Commands::Sweep { dry_run } => {
            let mut sweep = config.sweep.clone();
            sweep.dry_run |= dry_run;
            let report = manager.reconcile(&sweep).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.errors > 0 {
                anyhow::bail!("sweep finished with {} errors", report.errors);
            }
        }

        Commands::Health => {
            manager.health_check().await.context("health check failed")?;
            println!("ok");
        }
    }

    Ok(())
}
