//! CLI command implementations
//!
//! Every command prints one structured JSON result to stdout: either a
//! success payload or `{ success: false, error: { type, message, context } }`.
//! Failures also propagate so main can set a non-zero exit status.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dialoguer::Confirm;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::custody::{DerivationConfig, EncryptedKeyStore, WalletCustodian};
use crate::dispatch::{
    lamports_to_sol, sol_to_lamports, ChainClient, DispatcherConfig, RpcChainClient,
    TransferDispatcher,
};
use crate::error::{Error, Result};

/// Generate the parent wallet, or `--children N` child wallets
pub async fn generate(
    config: &Config,
    password: Option<String>,
    children: Option<usize>,
    force: bool,
) -> Result<()> {
    let custodian = build_custodian(config)?;

    if let Some(count) = children {
        let result = tokio::task::spawn_blocking(move || {
            custodian.generate_children(count, password.as_deref())
        })
        .await
        .map_err(|e| Error::Io(e.to_string()))?;

        let public_keys = report("generate_children", result)?;
        print_success(json!({
            "success": true,
            "count": public_keys.len(),
            "public_keys": public_keys,
        }));
        return Ok(());
    }

    // Generating over an existing parent replaces it
    if custodian.store().parent_path().exists() && !force {
        let confirmed = Confirm::new()
            .with_prompt("A parent wallet already exists and will be replaced. Continue?")
            .default(false)
            .interact()
            .map_err(|e| Error::Io(e.to_string()))?;
        if !confirmed {
            warn!("generate aborted by user");
            return Ok(());
        }
    }

    let result =
        tokio::task::spawn_blocking(move || custodian.generate_parent(password.as_deref()))
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

    let generated = report("generate_wallet", result)?;
    // One-time plaintext disclosure: printed to the operator, never logged
    print_success(json!({
        "success": true,
        "public_key": generated.public_key,
        "private_key": generated.private_key,
    }));
    Ok(())
}

/// Decrypt and show the parent wallet, with its current balance
pub async fn info(config: &Config, password: Option<String>) -> Result<()> {
    let custodian = build_custodian(config)?;

    let result = tokio::task::spawn_blocking(move || custodian.inspect(password.as_deref()))
        .await
        .map_err(|e| Error::Io(e.to_string()))?;

    let wallet = report("get_wallet_info", result)?;

    let balance_sol = match wallet.public_key.parse::<Pubkey>() {
        Ok(address) => match chain_client(config).get_balance(&address).await {
            Ok(lamports) => Some(lamports_to_sol(lamports)),
            Err(e) => {
                warn!(error = %e, "balance fetch failed");
                None
            }
        },
        Err(_) => None,
    };

    print_success(json!({
        "success": true,
        "public_key": wallet.public_key,
        "private_key": wallet.private_key,
        "encrypted_with_password": wallet.encrypted_with_password,
        "created_at": wallet.created_at,
        "balance_sol": balance_sol,
    }));
    Ok(())
}

/// Back up the parent wallet, optionally re-encrypted under a new password
pub async fn backup(
    config: &Config,
    password: Option<String>,
    new_password: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let custodian = build_custodian(config)?;
    let default_dir = config.wallet.backup_dir_path();

    let result = tokio::task::spawn_blocking(move || {
        let destination = output.unwrap_or_else(|| {
            default_dir.join(format!(
                "wallet_backup_{}.json",
                chrono::Utc::now().timestamp()
            ))
        });
        // Re-encryption credential defaults to the decryption credential
        let reencrypt_with = new_password.as_deref().or(password.as_deref());
        custodian.backup(password.as_deref(), reencrypt_with, &destination)
    })
    .await
    .map_err(|e| Error::Io(e.to_string()))?;

    let path = report("backup_wallet", result)?;
    print_success(json!({
        "success": true,
        "message": format!("Wallet backed up successfully to {}", path.display()),
        "backup_path": path,
    }));
    Ok(())
}

/// Restore the parent wallet from a backup archive
pub async fn restore(config: &Config, path: PathBuf, password: Option<String>) -> Result<()> {
    let custodian = build_custodian(config)?;

    let result =
        tokio::task::spawn_blocking(move || custodian.restore(&path, password.as_deref()))
            .await
            .map_err(|e| Error::Io(e.to_string()))?;

    let public_key = report("restore_wallet", result)?;
    print_success(json!({
        "success": true,
        "message": "Wallet restored successfully",
        "public_key": public_key,
    }));
    Ok(())
}

/// Fund every child wallet with `amount_sol` from the parent
pub async fn distribute(config: &Config, amount_sol: f64, password: Option<String>) -> Result<()> {
    let custodian = build_custodian(config)?;

    let (signer, targets) = {
        let result = tokio::task::spawn_blocking(move || -> Result<_> {
            let signer = custodian.parent_signer(password.as_deref())?;
            let targets = custodian
                .store()
                .load_children()?
                .into_iter()
                .map(|record| {
                    record.public_key.parse::<Pubkey>().map_err(|e| {
                        Error::CorruptStore(format!(
                            "invalid child public key {}: {}",
                            record.public_key, e
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((signer, targets))
        })
        .await
        .map_err(|e| Error::Io(e.to_string()))?;
        report("distribute_sol", result)?
    };

    if targets.is_empty() {
        print_success(json!({
            "success": true,
            "message": "No child wallets to fund",
            "results": [],
        }));
        return Ok(());
    }

    info!(targets = targets.len(), amount_sol, "starting distribution");

    let dispatcher = TransferDispatcher::new(
        Arc::new(chain_client(config)),
        DispatcherConfig {
            pace: Duration::from_millis(config.dispatch.pace_ms),
        },
    );

    let cancel = ctrl_c_token();
    let outcomes = dispatcher
        .fund(&signer, &targets, sol_to_lamports(amount_sol), &cancel)
        .await;

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    print_success(json!({
        "success": failed == 0,
        "message": format!(
            "Distributed {} SOL to {}/{} wallets",
            amount_sol,
            outcomes.len() - failed,
            outcomes.len()
        ),
        "results": outcomes,
    }));

    if failed > 0 {
        return Err(Error::Dispatch {
            target: format!("{} wallets", failed),
            message: "some transfers failed".to_string(),
        });
    }
    Ok(())
}

/// Buy a token from every child wallet
pub async fn snipe(
    config: &Config,
    token_mint: String,
    amount_sol: f64,
    password: Option<String>,
) -> Result<()> {
    let mint: Pubkey = token_mint
        .parse()
        .map_err(|e| Error::Config(format!("invalid token mint {}: {}", token_mint, e)))?;

    let custodian = build_custodian(config)?;
    let result =
        tokio::task::spawn_blocking(move || custodian.decrypt_children(password.as_deref()))
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
    let wallets = report("snipe_token", result)?;

    info!(wallets = wallets.len(), %mint, amount_sol, "starting snipe");

    let dispatcher = TransferDispatcher::new(
        Arc::new(chain_client(config)),
        DispatcherConfig {
            pace: Duration::from_millis(config.dispatch.pace_ms),
        },
    );

    let cancel = ctrl_c_token();
    let outcomes = dispatcher
        .snipe(wallets, &mint, sol_to_lamports(amount_sol), &cancel)
        .await;

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    print_success(json!({
        "success": failed == 0,
        "message": format!("Sniped token {} with {} SOL per wallet", token_mint, amount_sol),
        "results": outcomes,
    }));

    if failed > 0 {
        return Err(Error::Dispatch {
            target: format!("{} wallets", failed),
            message: "some buys failed".to_string(),
        });
    }
    Ok(())
}

/// Build the custodian from the loaded configuration
fn build_custodian(config: &Config) -> Result<WalletCustodian> {
    let store = EncryptedKeyStore::new(config.wallet.parent_path(), config.wallet.children_path());
    let derivation = DerivationConfig::from_security(&config.security)?;
    Ok(WalletCustodian::new(store, derivation))
}

fn chain_client(config: &Config) -> RpcChainClient {
    RpcChainClient::new(
        config.rpc.endpoint.clone(),
        Duration::from_millis(config.rpc.timeout_ms),
    )
}

/// Cancellation token wired to Ctrl-C: already-dispatched submissions
/// complete, no new ones are issued.
fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight submissions only");
            trigger.cancel();
        }
    });
    cancel
}

/// Print the structured error for a failed operation and propagate it
fn report<T>(context: &str, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            let mut body = json!({
                "success": false,
                "error": {
                    "type": e.kind(),
                    "message": e.to_string(),
                    "context": context,
                },
            });
            if let Error::Decryption {
                requires_password, ..
            } = &e
            {
                body["requires_password"] = json!(requires_password);
            }
            println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
            Err(e)
        }
    }
}

fn print_success(value: serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatchConfig, RpcConfig, SecurityConfig, WalletConfig};
    use std::path::Path;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> Config {
        Config {
            rpc: RpcConfig::default(),
            wallet: WalletConfig {
                directory: dir.to_str().unwrap().to_string(),
                ..WalletConfig::default()
            },
            security: SecurityConfig {
                legacy_secret: "test-secret".to_string(),
                ..SecurityConfig::default()
            },
            dispatch: DispatchConfig::default(),
        }
    }

    #[test]
    fn test_build_custodian_uses_configured_paths() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let custodian = build_custodian(&config).unwrap();
        assert_eq!(
            custodian.store().parent_path(),
            dir.path().join("parent_wallet.json")
        );
    }

    #[tokio::test]
    async fn test_generate_then_restore_flow() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());

        generate(&config, Some("pw1".to_string()), None, true)
            .await
            .unwrap();

        let backup_path = dir.path().join("backup.json");
        backup(
            &config,
            Some("pw1".to_string()),
            Some("pw2".to_string()),
            Some(backup_path.clone()),
        )
        .await
        .unwrap();
        assert!(backup_path.exists());

        restore(&config, backup_path, Some("pw2".to_string()))
            .await
            .unwrap();

        // Restored record is legacy-mode
        let custodian = build_custodian(&config).unwrap();
        let record = custodian.store().load_parent().unwrap();
        assert!(!record.encrypted_with_password);
    }

    #[tokio::test]
    async fn test_restore_missing_archive_fails() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let result = restore(&config, dir.path().join("missing.json"), None).await;
        assert!(matches!(result, Err(Error::Restore(_))));
    }
}
