//! Command-line front end for bootvol.
//!
//! Uses the directory-backed host rooted at `<home>/pools`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bootvol::{
    BootvolOptions, DirHost, PoolLockRegistry, Provisioner, ProvisioningRequest, init_logging,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bootvol")]
#[command(about = "Provision boot configuration payloads as storage volumes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Home directory (overrides the config file and BOOTVOL_HOME)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// JSON options file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a volume from a payload and print its identifier
    Provision {
        /// Logical volume name
        #[arg(long)]
        name: String,

        /// Target storage pool
        #[arg(long, default_value = "default")]
        pool: String,

        /// Path to a payload file, or inline JSON object text
        #[arg(long)]
        payload: String,
    },

    /// Print the volume and pool names behind an identifier
    Resolve {
        id: String,
    },

    /// Delete the volume behind an identifier
    Remove {
        id: String,
    },

    /// Storage pool management
    #[command(subcommand)]
    Pool(PoolCommand),
}

#[derive(Subcommand)]
enum PoolCommand {
    /// Create a storage pool
    Define { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut options = match &cli.config {
        Some(path) => BootvolOptions::load(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => BootvolOptions::default(),
    };
    if let Some(home) = cli.home {
        options.home_dir = home;
    }
    options.sanitize()?;

    // Flushes the log file when main returns.
    let _log_guard = init_logging(&options)?;

    let host = Arc::new(
        DirHost::open(options.pools_dir())
            .with_context(|| format!("opening pools under {}", options.pools_dir().display()))?,
    );
    let provisioner = Provisioner::from_options(
        host.clone(),
        &options,
        Arc::new(PoolLockRegistry::new()),
    );

    match cli.command {
        Commands::Provision {
            name,
            pool,
            payload,
        } => {
            let request = ProvisioningRequest::new(name, pool, payload);
            match provisioner.provision(&request).await {
                Ok(id) => println!("{}", id),
                Err(e) => {
                    if let Some(orphan) = e.orphaned_volume() {
                        tracing::warn!(%orphan, "Volume left behind on the host");
                    }
                    return Err(e.into());
                }
            }
        }
        Commands::Resolve { id } => {
            let volume = provisioner.resolve(&id).await?;
            println!("{}", serde_json::to_string_pretty(&volume)?);
        }
        Commands::Remove { id } => {
            let volume = provisioner.remove(&id).await?;
            println!("removed {} from pool {}", volume.name, volume.pool);
        }
        Commands::Pool(PoolCommand::Define { name }) => {
            host.define_pool(&name)?;
            println!("{}", host.root().join(&name).display());
        }
    }

    Ok(())
}
