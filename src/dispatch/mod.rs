//! Batched transfer dispatch
//!
//! Issues one on-chain operation per target through the external chain
//! client, isolating per-target failures: one failing target never prevents
//! subsequent targets from being attempted, and results line up 1:1 with
//! input order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use solana_client::rpc_client::RpcClient;
use solana_sdk::{
    account::Account,
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    system_instruction,
    transaction::Transaction,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::custody::ChildDecryptOutcome;
use crate::error::{Error, Result};

/// External chain-client contract consumed by the dispatcher.
///
/// The core needs only "submit, get result-or-error" and "fetch balance";
/// everything behind these calls (networking, retries) is the
/// collaborator's concern.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submit a signed value transfer, returning the signature
    async fn submit_transfer(
        &self,
        signer: &Keypair,
        to: &Pubkey,
        lamports: u64,
    ) -> Result<String>;

    /// Fetch an account balance in lamports
    async fn get_balance(&self, address: &Pubkey) -> Result<u64>;

    /// Fetch account data, `None` when the account does not exist
    async fn get_account_info(&self, address: &Pubkey) -> Result<Option<Account>>;

    /// Submit a token purchase for `mint`, spending `lamports`
    async fn buy_token(&self, signer: &Keypair, mint: &Pubkey, lamports: u64) -> Result<String>;
}

/// Dispatcher pacing configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Fixed delay between submissions. Zero disables pacing.
    pub pace: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pace: Duration::ZERO,
        }
    }
}

/// Per-target result of a batch dispatch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub target: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn success(target: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            signature: Some(signature.into()),
            error: None,
        }
    }

    pub fn failure(target: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            target: target.into(),
            signature: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.signature.is_some()
    }
}

/// Issues batched operations across the fleet through a [`ChainClient`]
pub struct TransferDispatcher<C: ChainClient> {
    client: Arc<C>,
    config: DispatcherConfig,
}

impl<C: ChainClient> TransferDispatcher<C> {
    pub fn new(client: Arc<C>, config: DispatcherConfig) -> Self {
        Self { client, config }
    }

    /// Fund each target with `lamports` from `signer`.
    ///
    /// No automatic retries. Cancellation is best-effort: targets not yet
    /// dispatched are marked failed without being submitted, in-flight
    /// submissions complete normally.
    pub async fn fund(
        &self,
        signer: &Keypair,
        targets: &[Pubkey],
        lamports: u64,
        cancel: &CancellationToken,
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(targets.len());

        for (i, target) in targets.iter().enumerate() {
            if cancel.is_cancelled() {
                outcomes.push(DispatchOutcome::failure(
                    target.to_string(),
                    "cancelled before dispatch",
                ));
                continue;
            }

            if i > 0 {
                self.pace().await;
            }

            match self.client.submit_transfer(signer, target, lamports).await {
                Ok(signature) => {
                    debug!(%target, %signature, "transfer dispatched");
                    outcomes.push(DispatchOutcome::success(target.to_string(), signature));
                }
                Err(e) => {
                    warn!(%target, error = %e, "transfer failed");
                    outcomes.push(DispatchOutcome::failure(target.to_string(), e));
                }
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            total = outcomes.len(),
            succeeded,
            failed = outcomes.len() - succeeded,
            "fund batch complete"
        );

        outcomes
    }

    /// Buy `mint` from every fleet wallet.
    ///
    /// Wallets that failed to decrypt arrive as per-record errors and are
    /// reported in place, keeping outcomes aligned with store order.
    pub async fn snipe(
        &self,
        wallets: Vec<ChildDecryptOutcome>,
        mint: &Pubkey,
        lamports: u64,
        cancel: &CancellationToken,
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(wallets.len());
        let mut dispatched = false;

        for wallet in wallets {
            let signer = match wallet.result {
                Ok(signer) => signer,
                Err(e) => {
                    outcomes.push(DispatchOutcome::failure(wallet.public_key, e));
                    continue;
                }
            };

            if cancel.is_cancelled() {
                outcomes.push(DispatchOutcome::failure(
                    wallet.public_key,
                    "cancelled before dispatch",
                ));
                continue;
            }

            if dispatched {
                self.pace().await;
            }
            dispatched = true;

            match self.client.buy_token(&signer, mint, lamports).await {
                Ok(signature) => {
                    outcomes.push(DispatchOutcome::success(wallet.public_key, signature))
                }
                Err(e) => {
                    warn!(wallet = %wallet.public_key, error = %e, "token buy failed");
                    outcomes.push(DispatchOutcome::failure(wallet.public_key, e));
                }
            }
        }

        outcomes
    }

    async fn pace(&self) {
        if !self.config.pace.is_zero() {
            tokio::time::sleep(self.config.pace).await;
        }
    }
}

/// Production chain client over a Solana JSON-RPC endpoint.
///
/// The underlying client is blocking, so every call runs on the blocking
/// pool to keep the async scheduler free.
pub struct RpcChainClient {
    endpoint: String,
    timeout: Duration,
}

impl RpcChainClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }

    fn blocking_client(&self) -> RpcClient {
        RpcClient::new_with_timeout(self.endpoint.clone(), self.timeout)
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn submit_transfer(
        &self,
        signer: &Keypair,
        to: &Pubkey,
        lamports: u64,
    ) -> Result<String> {
        let client = self.blocking_client();
        let signer = Keypair::from_bytes(&signer.to_bytes())
            .map_err(|e| Error::Io(format!("failed to clone signer: {}", e)))?;
        let to = *to;

        tokio::task::spawn_blocking(move || {
            let instruction = system_instruction::transfer(&signer.pubkey(), &to, lamports);

            let blockhash = client
                .get_latest_blockhash()
                .map_err(|e| Error::Rpc(format!("failed to get blockhash: {}", e)))?;

            let transaction = Transaction::new_signed_with_payer(
                &[instruction],
                Some(&signer.pubkey()),
                &[&signer],
                blockhash,
            );

            let signature = client
                .send_and_confirm_transaction(&transaction)
                .map_err(|e| Error::Dispatch {
                    target: to.to_string(),
                    message: format!("transfer failed: {}", e),
                })?;

            Ok(signature.to_string())
        })
        .await
        .map_err(|e| Error::Io(format!("dispatch task panicked: {}", e)))?
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        let client = self.blocking_client();
        let address = *address;

        tokio::task::spawn_blocking(move || {
            client
                .get_balance(&address)
                .map_err(|e| Error::Rpc(format!("failed to get balance: {}", e)))
        })
        .await
        .map_err(|e| Error::Io(format!("balance task panicked: {}", e)))?
    }

    async fn get_account_info(&self, address: &Pubkey) -> Result<Option<Account>> {
        let client = self.blocking_client();
        let address = *address;

        tokio::task::spawn_blocking(move || {
            client
                .get_account_with_commitment(&address, CommitmentConfig::confirmed())
                .map(|response| response.value)
                .map_err(|e| Error::Rpc(format!("failed to get account info: {}", e)))
        })
        .await
        .map_err(|e| Error::Io(format!("account info task panicked: {}", e)))?
    }

    async fn buy_token(&self, _signer: &Keypair, mint: &Pubkey, _lamports: u64) -> Result<String> {
        // Swap-instruction encoding is deliberately out of scope; a
        // swap-capable ChainClient implementation plugs in at this trait.
        Err(Error::Dispatch {
            target: mint.to_string(),
            message: "no token swap route configured for this client".to_string(),
        })
    }
}

/// Convert SOL to lamports
pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * 1_000_000_000.0) as u64
}

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / 1_000_000_000.0
}
