//! SNIPERFI - encrypted wallet-fleet custody and distribution tool
//!
//! # WARNING
//! - This tool manages real keys and real funds. Only use funds you can
//!   afford to lose.
//! - The plaintext private key is shown exactly once, at generation.
//!   Store it somewhere safe; it cannot be recovered without your
//!   password or the configured legacy secret.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use sniperfi::cli::commands;
use sniperfi::config::Config;

/// Encrypted wallet-fleet custody and distribution tool
#[derive(Parser)]
#[command(name = "sniperfi")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the parent wallet, or child wallets with --children
    Generate {
        /// Password to encrypt the private key (legacy mode if omitted)
        #[arg(long)]
        password: Option<String>,

        /// Generate this many child wallets instead of a parent
        #[arg(long)]
        children: Option<usize>,

        /// Replace an existing parent wallet without confirmation
        #[arg(long)]
        force: bool,
    },

    /// Show the parent wallet (decrypted) and its balance
    Info {
        /// Password, when the wallet was password-encrypted
        #[arg(long)]
        password: Option<String>,
    },

    /// Back up the parent wallet to a portable archive
    Backup {
        /// Password to decrypt the current wallet
        #[arg(long)]
        password: Option<String>,

        /// Re-encrypt the backup under this password (defaults to --password)
        #[arg(long)]
        new_password: Option<String>,

        /// Backup destination path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore the parent wallet from a backup archive
    Restore {
        /// Path to the backup file
        path: PathBuf,

        /// Password the backup was encrypted with
        #[arg(long)]
        password: Option<String>,
    },

    /// Fund every child wallet from the parent
    Distribute {
        /// Amount in SOL per wallet
        amount: f64,

        /// Password for the parent wallet
        #[arg(long)]
        password: Option<String>,
    },

    /// Buy a token from every child wallet
    Snipe {
        /// Token mint address
        token_mint: String,

        /// Amount in SOL per wallet
        amount: f64,

        /// Password for the child wallets
        #[arg(long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sniperfi=info".parse().unwrap()),
        )
        .with_target(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Generate {
            password,
            children,
            force,
        } => commands::generate(&config, password, children, force).await,
        Commands::Info { password } => commands::info(&config, password).await,
        Commands::Backup {
            password,
            new_password,
            output,
        } => commands::backup(&config, password, new_password, output).await,
        Commands::Restore { path, password } => {
            commands::restore(&config, path, password).await
        }
        Commands::Distribute { amount, password } => {
            commands::distribute(&config, amount, password).await
        }
        Commands::Snipe {
            token_mint,
            amount,
            password,
        } => commands::snipe(&config, token_mint, amount, password).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
