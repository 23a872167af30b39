//! Encrypted key-custody layer
//!
//! Key derivation, at-rest encryption, and wallet lifecycle orchestration:
//!
//! ```text
//! credential → DerivationConfig → SymmetricKey
//!                                      ↓
//!                            EncryptedKeyStore (encrypt/decrypt + JSON files)
//!                                      ↓
//!                              WalletCustodian (generate/inspect/backup/restore)
//! ```
//!
//! # Security
//!
//! - Private keys are persisted only as AES-256-GCM ciphertext.
//! - Keys derive from a password (per-record salt) or the configured
//!   legacy secret; the derived key lives in memory only.
//! - Plaintext key material is returned exactly once, at generation,
//!   and is never logged.

pub mod custodian;
pub mod derivation;
pub mod store;

pub use custodian::{ChildDecryptOutcome, GeneratedWallet, WalletCustodian, WalletInfo};
pub use derivation::{new_salt, DerivationConfig, SymmetricKey, SALT_LEN};
pub use store::{decrypt_key, encrypt_key, BackupArchive, EncryptedKeyStore, WalletRecord};
