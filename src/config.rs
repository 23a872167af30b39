//! Configuration loading and validation

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Wallet store locations
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Directory holding all wallet stores
    #[serde(default = "default_wallet_dir")]
    pub directory: String,

    /// Parent wallet file name (relative to directory)
    #[serde(default = "default_parent_file")]
    pub parent_file: String,

    /// Child wallet collection file name (relative to directory)
    #[serde(default = "default_children_file")]
    pub children_file: String,

    /// Backup directory (relative to directory)
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            directory: default_wallet_dir(),
            parent_file: default_parent_file(),
            children_file: default_children_file(),
            backup_dir: default_backup_dir(),
        }
    }
}

impl WalletConfig {
    pub fn parent_path(&self) -> std::path::PathBuf {
        Path::new(&self.directory).join(&self.parent_file)
    }

    pub fn children_path(&self) -> std::path::PathBuf {
        Path::new(&self.directory).join(&self.children_file)
    }

    pub fn backup_dir_path(&self) -> std::path::PathBuf {
        Path::new(&self.directory).join(&self.backup_dir)
    }
}

/// Encryption settings for the custody layer
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// PBKDF2 iteration count
    #[serde(default = "default_iterations")]
    pub encryption_iterations: u32,

    /// Static secret for legacy-mode encryption.
    /// Set via SNIPERFI__SECURITY__LEGACY_SECRET, never in the config file.
    #[serde(default)]
    pub legacy_secret: String,

    /// Optional fixed salt for legacy mode, base64-encoded 16 bytes.
    /// When absent a random salt is generated once per process.
    #[serde(default)]
    pub legacy_salt: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_iterations: default_iterations(),
            legacy_secret: String::new(),
            legacy_salt: None,
        }
    }
}

impl SecurityConfig {
    /// Decode the configured legacy salt, if any
    pub fn legacy_salt_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.legacy_salt {
            None => Ok(None),
            Some(b64) => {
                let bytes = BASE64
                    .decode(b64)
                    .context("security.legacy_salt is not valid base64")?;
                Ok(Some(bytes))
            }
        }
    }
}

/// Transfer dispatch settings
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Fixed delay between per-target submissions, in milliseconds.
    /// Zero disables pacing.
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pace_ms: default_pace_ms(),
        }
    }
}

fn default_rpc_endpoint() -> String {
    "https://api.devnet.solana.com".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_wallet_dir() -> String {
    "wallets".to_string()
}

fn default_parent_file() -> String {
    "parent_wallet.json".to_string()
}

fn default_children_file() -> String {
    "wallets.json".to_string()
}

fn default_backup_dir() -> String {
    "backups".to_string()
}

fn default_iterations() -> u32 {
    100_000
}

fn default_pace_ms() -> u64 {
    0
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SNIPERFI_)
            .add_source(
                config::Environment::with_prefix("SNIPERFI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        // Below 100k iterations brute-forcing gets too cheap
        if self.security.encryption_iterations < 100_000 {
            anyhow::bail!(
                "security.encryption_iterations must be at least 100000, got {}",
                self.security.encryption_iterations
            );
        }

        if let Some(salt) = self.security.legacy_salt_bytes()? {
            if salt.len() != 16 {
                anyhow::bail!(
                    "security.legacy_salt must decode to 16 bytes, got {}",
                    salt.len()
                );
            }
        }

        if self.wallet.directory.is_empty() {
            anyhow::bail!("wallet.directory must not be empty");
        }

        Ok(())
    }
}
