//! p.file Vault - CLI
//!
//! Command-line interface for vault operations.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use pfile_vault::{CipherMethod, KeyBundle, PhotoStore, StoreConfig};

#[derive(Parser)]
#[command(name = "pfile")]
#[command(version = pfile_vault::VERSION)]
#[command(about = "p.file Vault - Encrypted local photo store")]
struct Cli {
    /// Vault path (overrides the config file)
    #[arg(short, long)]
    vault: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vault and its encryption key
    Init,

    /// Upload photos, one after another
    Upload {
        /// Image files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List photos
    List {
        /// Only names containing this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Decrypt one photo to a file
    Show {
        /// Photo ID
        id: String,

        /// Output path
        output: PathBuf,
    },

    /// Delete a photo
    Delete {
        /// Photo ID
        id: String,
    },

    /// Export every photo as a zip archive
    ExportAll {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Export the encryption key
    ExportKey {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Restore a previously exported key
    ImportKey {
        /// Key file
        file: PathBuf,
    },

    /// Show storage usage
    Stats,

    /// Set the cipher used for new uploads
    Method {
        /// aes256 or xchacha20
        method: CipherMethod,
    },

    /// Show or change settings
    Settings {
        /// Delete source files after a successful upload
        #[arg(long, action = ArgAction::Set)]
        delete_after_upload: Option<bool>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(vault) = &cli.vault {
        config.vault_path = vault.clone();
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let vault_path = config.vault_path.clone();
    let store = PhotoStore::open(config)
        .with_context(|| format!("opening vault at {}", vault_path.display()))?;

    match cli.command {
        Commands::Init => {
            println!("🔐 Vault ready at: {}", vault_path.display());
            println!("   Key: {:?}", store.key_origin());
            println!("   Photos: {}", store.list().len());
            println!("Export your key with `pfile export-key` and keep it safe.");
        }

        Commands::Upload { files } => {
            let report = store.upload_batch(&files).await;

            for record in &report.uploaded {
                println!("✅ {} -> {}", record.name, record.id);
            }
            for (path, err) in &report.failed {
                println!("❌ {}: {}", path.display(), err);
            }
            println!(
                "Uploaded {} of {} files",
                report.uploaded.len(),
                files.len()
            );
            if report.uploaded.is_empty() && !report.failed.is_empty() {
                bail!("no files were uploaded");
            }
        }

        Commands::List { search } => {
            let photos = match &search {
                Some(term) => store.search(term),
                None => store.list(),
            };

            if photos.is_empty() {
                println!("📭 No photos found");
            } else {
                println!("📷 Photos ({}):", photos.len());
                println!("{:-<60}", "");
                for photo in photos {
                    println!(
                        "{} - {} ({} bytes, {})",
                        photo.id,
                        photo.name,
                        photo.size,
                        photo.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        Commands::Show { id, output } => {
            store
                .export_photo(&id, &output)
                .with_context(|| format!("decrypting photo {}", id))?;
            println!("✅ Photo written to: {}", output.display());
        }

        Commands::Delete { id } => {
            if store.delete(&id)? {
                println!("🗑️ Photo deleted");
            } else {
                println!("📭 No photo with id {}, nothing deleted", id);
            }
        }

        Commands::ExportAll { out } => {
            let archive = store.export_all()?;
            let path = archive.write_to_dir(&out)?;
            println!("📦 {} photos exported to: {}", archive.exported, path.display());
            if archive.skipped > 0 {
                println!("⚠️ {} photos could not be decrypted and were skipped", archive.skipped);
            }
        }

        Commands::ExportKey { out } => {
            let path = store.write_key_bundle(&out)?;
            println!("🔑 Key exported to: {}", path.display());
            println!("Keep this key safe! Without it, you cannot decrypt your photos.");
        }

        Commands::ImportKey { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let bundle = KeyBundle::from_json(&text)?;
            store.import_key(&bundle)?;
            println!("🔑 Key imported");
        }

        Commands::Stats => {
            let info = store.storage_info();
            let settings = store.settings();

            println!("📊 p.file Vault Statistics");
            println!("{:-<40}", "");
            println!("Total photos:     {}", info.photo_count);
            println!("Storage:          {}", info);
            println!("Used:             {:.2}%", info.percent_used);
            println!("Encryption:       {}", settings.encryption_method.name());
        }

        Commands::Method { method } => {
            store.set_encryption_method(method)?;
            println!("✅ New uploads use {}", method.name());
        }

        Commands::Settings {
            delete_after_upload,
        } => {
            let mut settings = store.settings();
            if let Some(value) = delete_after_upload {
                settings.delete_after_upload = value;
                store.update_settings(settings.clone())?;
            }

            println!("⚙️ Settings");
            println!("   Auto-encrypt:        {}", settings.auto_encrypt);
            println!("   Delete after upload: {}", settings.delete_after_upload);
            println!("   Encryption method:   {}", settings.encryption_method);
        }
    }

    Ok(())
}
