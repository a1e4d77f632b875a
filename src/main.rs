use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vault_link_archiver::config::Config;
use vault_link_archiver::ledger::{FailureLedger, LedgerFormat};
use vault_link_archiver::orchestrator::{Mode, Orchestrator};
use vault_link_archiver::profile::{self, Profile};
use vault_link_archiver::store::FsStore;
use vault_link_archiver::wayback::WaybackClient;

#[derive(Parser)]
#[command(name = "vault-link-archiver", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Archive links in a single document (optionally only a selection).
    Archive {
        /// Document path, relative to the vault root.
        file: PathBuf,
        /// Re-archive every link and replace existing annotations.
        #[arg(long)]
        force: bool,
        /// Restrict to a byte range of the document.
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        selection: Option<Vec<usize>>,
    },
    /// Archive links across every eligible document in the vault.
    ArchiveVault {
        /// Re-archive every link and replace existing annotations.
        #[arg(long)]
        force: bool,
    },
    /// Export the failure ledger to a snapshot file.
    ExportLedger {
        /// Output format.
        #[arg(long, default_value = "json")]
        format: LedgerFormat,
        /// Destination file.
        out: PathBuf,
    },
    /// Retry failures from an exported ledger snapshot.
    Retry {
        /// Snapshot file (JSON or CSV).
        snapshot: PathBuf,
        /// Retry every entry, even ones whose link meanwhile gained a fresh
        /// annotation.
        #[arg(long)]
        force: bool,
    },
    /// Delete every entry from the failure ledger.
    ClearLedger,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let profile = match &config.profile_path {
        Some(path) => profile::load_active(path, config.profile_name.as_deref())
            .context("Failed to load settings profile")?,
        None => Profile::default(),
    };

    let store = FsStore::new(&config.vault_dir);
    let ledger = FailureLedger::load(&config.ledger_path)
        .await
        .context("Failed to load failure ledger")?;
    let client = WaybackClient::new(config.credentials(), &profile);
    let mut orchestrator = Orchestrator::new(client, profile, ledger);

    match cli.command {
        Command::Archive {
            file,
            force,
            selection,
        } => {
            let mode = mode_for(force);
            let summary = match selection {
                Some(range) => {
                    orchestrator
                        .archive_selection(&store, &file, range[0]..range[1], mode)
                        .await?
                }
                None => orchestrator.archive_document(&store, &file, mode).await?,
            };
            println!("{}: {summary}", file.display());
        }
        Command::ArchiveVault { force } => {
            let summary = orchestrator.archive_vault(&store, mode_for(force)).await?;
            println!("Vault run complete: {summary}");
        }
        Command::ExportLedger { format, out } => {
            let ledger = orchestrator.ledger();
            ledger.export(&out, format).await?;
            println!(
                "Exported {} failure(s) to {} as {}",
                ledger.len(),
                out.display(),
                format.as_str()
            );
        }
        Command::Retry { snapshot, force } => {
            let summary = orchestrator
                .retry_failures(&store, &snapshot, force)
                .await?;
            println!("Retry complete: {summary}");
        }
        Command::ClearLedger => {
            let count = orchestrator.into_ledger().clear().await?;
            println!("Cleared {count} failure(s) from the ledger");
        }
    }

    Ok(())
}

fn mode_for(force: bool) -> Mode {
    if force {
        Mode::Force
    } else {
        Mode::Normal
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vault_link_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
