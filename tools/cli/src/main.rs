//! Lockbox CLI - Command line interface for the encrypted document vault.
//!
//! Imports documents into the vault, opens and exports them, and erases
//! the vault.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use lockbox_common::ItemId;
use lockbox_vault::mime::sanitize_file_name;
use lockbox_vault::{
    ByteSource, DocumentVault, MaterializeTarget, PickedFile, PickerResult, VaultConfig,
    VaultManager,
};

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(about = "Lockbox - Encrypted local document vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to the JSON configuration file.
    #[arg(short, long, env = "LOCKBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List vault items, newest first.
    List,

    /// Import a file into the vault.
    Import {
        /// File to import.
        file: PathBuf,

        /// MIME type (default: inferred from the file name).
        #[arg(short, long)]
        mime: Option<String>,
    },

    /// Decrypt an item to a temp file.
    Open {
        /// Item id.
        id: String,

        /// Hand the file to the system viewer.
        #[arg(short, long)]
        launch: bool,
    },

    /// Save a decrypted copy of an item into a directory.
    Save {
        /// Item id.
        id: String,

        /// Destination directory.
        dir: PathBuf,
    },

    /// Export every item as one plaintext JSON file.
    Export {
        /// Output file.
        out: PathBuf,
    },

    /// Delete one item.
    Delete {
        /// Item id.
        id: String,
    },

    /// Delete every item and the master key.
    DeleteAll {
        /// Confirm the erasure.
        #[arg(long)]
        yes: bool,
    },

    /// Reconcile the index with the stored envelopes.
    Repair,

    /// Show whether a master key exists.
    KeyStatus,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List => cmd_list(&config).await,
        Commands::Import { file, mime } => cmd_import(&config, &file, mime).await,
        Commands::Open { id, launch } => cmd_open(config, &id, launch).await,
        Commands::Save { id, dir } => cmd_save(&config, &id, &dir).await,
        Commands::Export { out } => cmd_export(&config, &out).await,
        Commands::Delete { id } => cmd_delete(&config, &id).await,
        Commands::DeleteAll { yes } => cmd_delete_all(&config, yes).await,
        Commands::Repair => cmd_repair(&config).await,
        Commands::KeyStatus => cmd_key_status(&config).await,
    }
}

/// Load the configuration from `path`, or from the default location.
fn load_config(path: Option<&Path>) -> Result<VaultConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("lockbox")
            .join("config.json"),
    };

    VaultConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

fn open_vault(config: &VaultConfig) -> Result<DocumentVault> {
    VaultManager::new()
        .open(config)
        .context("Failed to open vault")
}

fn parse_id(id: &str) -> Result<ItemId> {
    ItemId::new(id).context("Invalid item id")
}

/// List items.
async fn cmd_list(config: &VaultConfig) -> Result<()> {
    let vault = open_vault(config)?;
    let items = vault.list_items().await.context("Failed to list items")?;

    if items.is_empty() {
        println!("Vault is empty.");
        return Ok(());
    }

    for item in items {
        println!(
            "{}  {}  {}  {} bytes  {}",
            item.id,
            item.created_at.format("%Y-%m-%d %H:%M"),
            item.mime,
            item.size,
            item.name
        );
    }
    Ok(())
}

/// Import a file.
async fn cmd_import(config: &VaultConfig, file: &Path, mime: Option<String>) -> Result<()> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let size = tokio::fs::metadata(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?
        .len();

    let mut picked = PickedFile::new(name, ByteSource::Path(file.to_path_buf())).with_size(size);
    picked.mime = mime;

    let vault = open_vault(config)?;
    let meta = vault
        .import_from_picker(PickerResult::Picked(picked))
        .await
        .context("Failed to import file")?
        .context("Nothing imported")?;

    println!("Imported {} ({}, {} bytes)", meta.name, meta.mime, meta.size);
    println!("  ID: {}", meta.id);
    Ok(())
}

/// Decrypt an item to a temp file.
async fn cmd_open(mut config: VaultConfig, id: &str, launch: bool) -> Result<()> {
    // A terminal has no use for an in-memory reference.
    config.materialize.target = MaterializeTarget::Filesystem;

    let id = parse_id(id)?;
    let vault = open_vault(&config)?;
    let handle = vault
        .materialize_for_open(&id)
        .await
        .context("Failed to open item")?;

    println!("{} -> {}", handle.display_name(), handle.location());

    if launch {
        open::that(handle.location()).context("Failed to launch viewer")?;
        info!("Temp file stays until removed from the scratch directory");
    }
    Ok(())
}

/// Save a decrypted copy into a directory.
async fn cmd_save(config: &VaultConfig, id: &str, dir: &Path) -> Result<()> {
    let id = parse_id(id)?;
    let vault = open_vault(config)?;
    let copy = vault
        .decrypted_copy(&id)
        .await
        .context("Failed to decrypt item")?;

    let path = dir.join(sanitize_file_name(&copy.name, &copy.mime));
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        bail!("{} already exists", path.display());
    }
    tokio::fs::write(&path, copy.bytes.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Saved {} to {}", copy.name, path.display());
    Ok(())
}

/// Export the vault as plaintext JSON.
async fn cmd_export(config: &VaultConfig, out: &Path) -> Result<()> {
    let vault = open_vault(config)?;
    let bundle = vault.export_bundle().await.context("Failed to export")?;
    let json = bundle.to_json()?;

    tokio::fs::write(out, json.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!(
        "Exported {} items to {} (unencrypted)",
        bundle.items.len(),
        out.display()
    );
    Ok(())
}

/// Delete one item.
async fn cmd_delete(config: &VaultConfig, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let vault = open_vault(config)?;
    vault.delete_one(&id).await.context("Failed to delete item")?;

    println!("Deleted {}", id);
    Ok(())
}

/// Erase the vault.
async fn cmd_delete_all(config: &VaultConfig, yes: bool) -> Result<()> {
    if !yes {
        bail!("This erases every item and the master key. Re-run with --yes to confirm");
    }

    let vault = open_vault(config)?;
    vault.delete_all().await.context("Failed to erase vault")?;

    println!("Vault erased.");
    Ok(())
}

/// Reconcile index and envelopes.
async fn cmd_repair(config: &VaultConfig) -> Result<()> {
    let vault = open_vault(config)?;
    let report = vault.repair().await.context("Failed to repair vault")?;

    if report.is_clean() {
        println!("Vault is consistent.");
        return Ok(());
    }

    println!("Removed {} orphan envelopes", report.orphan_envelopes.len());
    for id in &report.dangling_entries {
        println!("  Dropped index entry without content: {}", id);
    }
    Ok(())
}

/// Show key status.
async fn cmd_key_status(config: &VaultConfig) -> Result<()> {
    let vault = open_vault(config)?;
    let present = vault
        .has_master_key()
        .await
        .context("Failed to query keystore")?;
    let count = vault.list_items().await?.len();

    println!("Keystore: {:?}", config.keystore.backend);
    println!("Master key: {}", if present { "present" } else { "absent" });
    println!("Items: {}", count);
    Ok(())
}
