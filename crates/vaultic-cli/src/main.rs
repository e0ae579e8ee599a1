use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use vaultic_core::store::VaultStore;
use vaultic_core::{container, Error};
use vaultic_mpc::relay::RelayClient;
use vaultic_mpc::transport::ReqwestTransport;

mod file_storage;

use crate::file_storage::FileStorage;

const DEFAULT_RELAY_URL: &str = "https://api.vaultic.dev/relay";

#[derive(Parser)]
#[command(name = "vaultic")]
#[command(about = "Manage Vaultic MPC vault containers", long_about = None)]
struct Cli {
    /// Directory holding the vault records
    #[arg(long, default_value = ".vaultic")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a .vult container file
    Import {
        file: PathBuf,
        /// Prompt for the container password
        #[arg(long)]
        encrypted: bool,
    },

    /// Export a vault to a .vult container file
    Export {
        id: String,
        out: PathBuf,
        /// Encrypt the container with a prompted password
        #[arg(long)]
        encrypt: bool,
    },

    /// List stored vaults
    List,

    /// Show whether a container file is password-protected
    Inspect { file: PathBuf },

    /// Rename a vault
    Rename { id: String, name: String },

    /// Delete a vault
    Delete { id: String },

    /// Show or set the active vault
    Active {
        id: Option<String>,
    },

    /// Check relay reachability
    Ping {
        #[arg(long, default_value = DEFAULT_RELAY_URL)]
        relay_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let store = VaultStore::new(Arc::new(FileStorage::open(&cli.data_dir)?));

    match cli.command {
        Commands::Import { file, encrypted } => {
            let content = std::fs::read_to_string(&file)?;
            let password = if encrypted {
                Some(rpassword::prompt_password("Container password: ")?)
            } else {
                None
            };
            let vault = match container::decode(&content, password.as_deref()) {
                Ok(vault) => vault,
                Err(Error::PasswordRequired) => {
                    let password = rpassword::prompt_password("Container password: ")?;
                    container::decode(&content, Some(&password))?
                }
                Err(err) => return Err(err.into()),
            };
            store.put(&vault).await?;
            store.set_active(Some(vault.id())).await?;
            println!("Imported {} ({})", vault.name, vault.id());
        }
        Commands::Export { id, out, encrypt } => {
            let mut vault = store
                .get(&id)
                .await?
                .ok_or_else(|| anyhow!("vault {id} not found"))?;
            let password = if encrypt {
                let password = rpassword::prompt_password("New container password: ")?;
                let confirm = rpassword::prompt_password("Confirm password: ")?;
                if password != confirm {
                    return Err(anyhow!("passwords do not match"));
                }
                Some(password)
            } else {
                None
            };
            let content = container::encode(&vault, password.as_deref())?;
            std::fs::write(&out, content)?;
            vault.is_backed_up = true;
            store.put(&vault).await?;
            println!("Exported {} to {}", vault.name, out.display());
        }
        Commands::List => {
            let active = store.active().await?;
            for vault in store.list().await? {
                let marker = if active.as_deref() == Some(vault.id()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} {}  {:?}  {}-of-{}  {}",
                    vault.name,
                    vault.security(),
                    vault.threshold(),
                    vault.signers.len(),
                    vault.id(),
                );
            }
        }
        Commands::Inspect { file } => {
            let content = std::fs::read_to_string(&file)?;
            let encrypted = container::is_encrypted(&content)?;
            println!(
                "{}: {}",
                file.display(),
                if encrypted { "encrypted" } else { "plaintext" }
            );
        }
        Commands::Rename { id, name } => {
            let mut vault = store
                .get(&id)
                .await?
                .ok_or_else(|| anyhow!("vault {id} not found"))?;
            vaultic_core::vault::validate_name(&name)?;
            vault.name = name;
            vault.last_modified = chrono::Utc::now();
            store.put(&vault).await?;
            println!("Renamed {id}");
        }
        Commands::Delete { id } => {
            store.delete(&id).await?;
            println!("Deleted {id}");
        }
        Commands::Active { id } => match id {
            Some(id) => {
                if store.get(&id).await?.is_none() {
                    return Err(anyhow!("vault {id} not found"));
                }
                store.set_active(Some(&id)).await?;
                println!("Active vault: {id}");
            }
            None => match store.active().await? {
                Some(id) => println!("Active vault: {id}"),
                None => println!("No active vault"),
            },
        },
        Commands::Ping { relay_url } => {
            let transport = Arc::new(ReqwestTransport::new()?);
            let relay = RelayClient::new(relay_url, transport);
            relay.ping().await?;
            println!("Relay is reachable");
        }
    }
    Ok(())
}
