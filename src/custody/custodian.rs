//! Wallet custodian - lifecycle orchestration
//!
//! Coordinates key generation, encryption mode selection, backup/restore
//! re-encryption, and batch decryption over the child fleet.

use std::path::{Path, PathBuf};

use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use tracing::{info, warn};

use crate::error::{Error, Result};

use super::derivation::{new_salt, DerivationConfig};
use super::store::{
    decrypt_key, encrypt_key, now_ts, BackupArchive, EncryptedKeyStore, WalletRecord,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Result of generating a fresh wallet.
///
/// `private_key` is the one-time plaintext disclosure: it is returned to
/// the operator here and never again, and must not be logged.
#[derive(Debug)]
pub struct GeneratedWallet {
    pub public_key: String,
    pub private_key: String,
}

/// Decrypted view of the parent wallet
#[derive(Debug)]
pub struct WalletInfo {
    pub public_key: String,
    pub private_key: String,
    pub encrypted_with_password: bool,
    pub created_at: f64,
}

/// One entry of a batch decrypt over the child fleet
pub struct ChildDecryptOutcome {
    pub public_key: String,
    pub result: Result<Keypair>,
}

/// Orchestrates custody operations over one parent wallet and the
/// child wallet collection.
pub struct WalletCustodian {
    store: EncryptedKeyStore,
    derivation: DerivationConfig,
}

impl WalletCustodian {
    pub fn new(store: EncryptedKeyStore, derivation: DerivationConfig) -> Self {
        Self { store, derivation }
    }

    pub fn store(&self) -> &EncryptedKeyStore {
        &self.store
    }

    /// Create a fresh parent keypair and persist it encrypted.
    ///
    /// Password mode when a password is given (fresh salt, persisted with
    /// the record), legacy mode otherwise.
    pub fn generate_parent(&self, password: Option<&str>) -> Result<GeneratedWallet> {
        let keypair = Keypair::new();
        let public_key = keypair.pubkey().to_string();
        let private_key_b58 = bs58::encode(keypair.to_bytes()).into_string();

        let record = self.encrypt_record(&public_key, &private_key_b58, password)?;
        self.store.save_parent(&record)?;

        info!(%public_key, password_mode = password.is_some(), "generated parent wallet");

        Ok(GeneratedWallet {
            public_key,
            private_key: private_key_b58,
        })
    }

    /// Generate `count` child wallets and append them to the fleet store.
    /// Returns public keys only.
    pub fn generate_children(&self, count: usize, password: Option<&str>) -> Result<Vec<String>> {
        let mut records = Vec::with_capacity(count);
        let mut public_keys = Vec::with_capacity(count);

        for _ in 0..count {
            let keypair = Keypair::new();
            let public_key = keypair.pubkey().to_string();
            let private_key_b58 = bs58::encode(keypair.to_bytes()).into_string();

            records.push(self.encrypt_record(&public_key, &private_key_b58, password)?);
            public_keys.push(public_key);
        }

        self.store.append_children(records)?;
        info!(count, password_mode = password.is_some(), "generated child wallets");

        Ok(public_keys)
    }

    /// Decrypt the parent record and return the full wallet info.
    ///
    /// A password-encrypted record with no or a wrong password fails with
    /// a `Decryption` error carrying `requires_password`, exposing nothing.
    pub fn inspect(&self, password: Option<&str>) -> Result<WalletInfo> {
        let record = self.store.load_parent()?;
        let plaintext = self.decrypt_record(&record, password)?;

        Ok(WalletInfo {
            public_key: record.public_key,
            private_key: String::from_utf8(plaintext)
                .map_err(|_| Error::CorruptStore("decrypted key is not valid UTF-8".to_string()))?,
            encrypted_with_password: record.encrypted_with_password,
            created_at: record.created_at,
        })
    }

    /// Decrypt the parent record into a signing keypair
    pub fn parent_signer(&self, password: Option<&str>) -> Result<Keypair> {
        let record = self.store.load_parent()?;
        let plaintext = self.decrypt_record(&record, password)?;
        keypair_from_b58(&plaintext)
    }

    /// Snapshot the parent wallet into a portable archive.
    ///
    /// Decrypts with `current_password` (per the record's stored mode) and
    /// re-encrypts under `new_password`, or legacy mode when none is given.
    /// The live store is never touched.
    pub fn backup(
        &self,
        current_password: Option<&str>,
        new_password: Option<&str>,
        destination: &Path,
    ) -> Result<PathBuf> {
        let record = self.store.load_parent().map_err(|e| match e {
            Error::NotFound(p) => Error::Backup(format!("no wallet to back up: {}", p)),
            other => other,
        })?;

        let plaintext = self.decrypt_record(&record, current_password)?;
        let reencrypted = self.encrypt_record(
            &record.public_key,
            std::str::from_utf8(&plaintext)
                .map_err(|_| Error::CorruptStore("decrypted key is not valid UTF-8".to_string()))?,
            new_password,
        )?;

        let archive = BackupArchive {
            record: WalletRecord {
                created_at: now_ts(),
                ..reencrypted
            },
            backup_date: now_ts(),
            original_created_at: record.created_at,
        };

        self.store.save_archive(destination, &archive)?;
        info!(path = %destination.display(), "wallet backed up");

        Ok(destination.to_path_buf())
    }

    /// Restore the parent wallet from a backup archive.
    ///
    /// All-or-nothing: the archive is fully decrypted and re-encrypted
    /// before the live record is replaced, so any failure leaves the
    /// existing parent untouched. The restored record is stored in
    /// legacy mode.
    pub fn restore(&self, archive_path: &Path, password: Option<&str>) -> Result<String> {
        let archive = self.store.load_archive(archive_path)?;

        if archive.record.private_key.is_empty() {
            return Err(Error::Restore(
                "invalid backup file: no private key found".to_string(),
            ));
        }

        let plaintext = self.decrypt_record(&archive.record, password)?;

        let legacy_key = self.derivation.derive_legacy()?;
        let blob = encrypt_key(&plaintext, &legacy_key)?;

        let record = WalletRecord {
            public_key: archive.record.public_key.clone(),
            private_key: blob,
            salt: None,
            encrypted_with_password: false,
            created_at: archive.original_created_at,
        };

        self.store.save_parent(&record)?;
        info!(public_key = %record.public_key, "wallet restored from backup");

        Ok(record.public_key)
    }

    /// Decrypt every child record independently.
    ///
    /// One record failing to decrypt is recorded as a per-record error and
    /// never aborts the rest. Results are in store order.
    pub fn decrypt_children(&self, password: Option<&str>) -> Result<Vec<ChildDecryptOutcome>> {
        let records = self.store.load_children()?;
        let mut outcomes = Vec::with_capacity(records.len());

        for record in records {
            let result = self
                .decrypt_record(&record, password)
                .and_then(|plaintext| keypair_from_b58(&plaintext));

            if let Err(e) = &result {
                warn!(public_key = %record.public_key, error = %e, "child wallet decrypt failed");
            }

            outcomes.push(ChildDecryptOutcome {
                public_key: record.public_key,
                result,
            });
        }

        Ok(outcomes)
    }

    /// Encrypt plaintext key material into a fresh record
    fn encrypt_record(
        &self,
        public_key: &str,
        private_key_b58: &str,
        password: Option<&str>,
    ) -> Result<WalletRecord> {
        let (blob, salt) = match password {
            Some(password) => {
                let salt = new_salt();
                let key = self.derivation.derive(password, &salt)?;
                (
                    encrypt_key(private_key_b58.as_bytes(), &key)?,
                    Some(BASE64.encode(salt)),
                )
            }
            None => {
                let key = self.derivation.derive_legacy()?;
                (encrypt_key(private_key_b58.as_bytes(), &key)?, None)
            }
        };

        Ok(WalletRecord {
            public_key: public_key.to_string(),
            private_key: blob,
            encrypted_with_password: salt.is_some(),
            salt,
            created_at: now_ts(),
        })
    }

    /// Decrypt a record according to its stored mode
    fn decrypt_record(&self, record: &WalletRecord, password: Option<&str>) -> Result<Vec<u8>> {
        if record.encrypted_with_password {
            let salt = record.salt_bytes()?.ok_or_else(|| {
                Error::CorruptStore(
                    "record requires a password but carries no salt".to_string(),
                )
            })?;

            let password = password.ok_or_else(|| {
                Error::needs_password("record is password-encrypted, no password supplied")
            })?;

            let key = self.derivation.derive(password, &salt)?;
            decrypt_key(&record.private_key, &key).map_err(|e| match e {
                Error::Decryption { message, .. } => Error::Decryption {
                    message,
                    requires_password: true,
                },
                other => other,
            })
        } else {
            let key = self.derivation.derive_legacy()?;
            decrypt_key(&record.private_key, &key)
        }
    }

}

/// Rebuild a signing keypair from bs58-encoded plaintext material
fn keypair_from_b58(plaintext: &[u8]) -> Result<Keypair> {
    let b58 = std::str::from_utf8(plaintext)
        .map_err(|_| Error::CorruptStore("decrypted key is not valid UTF-8".to_string()))?;
    let bytes = bs58::decode(b58)
        .into_vec()
        .map_err(|e| Error::CorruptStore(format!("decrypted key is not valid base58: {}", e)))?;
    Keypair::from_bytes(&bytes)
        .map_err(|e| Error::CorruptStore(format!("decrypted key is not a valid keypair: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TEST_ITERATIONS: u32 = 100_000;

    fn custodian(dir: &Path) -> WalletCustodian {
        let store = EncryptedKeyStore::new(
            dir.join("parent_wallet.json"),
            dir.join("wallets.json"),
        );
        WalletCustodian::new(store, DerivationConfig::for_tests("env-secret", TEST_ITERATIONS))
    }

    #[test]
    fn test_generate_legacy_then_inspect() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());

        let generated = custodian.generate_parent(None).unwrap();
        let record = custodian.store.load_parent().unwrap();
        assert!(!record.encrypted_with_password);
        assert!(record.salt.is_none());

        let info = custodian.inspect(None).unwrap();
        assert_eq!(info.public_key, generated.public_key);
        assert_eq!(info.private_key, generated.private_key);
    }

    #[test]
    fn test_generate_password_mode_has_salt() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());

        custodian.generate_parent(Some("hunter2")).unwrap();
        let record = custodian.store.load_parent().unwrap();
        assert!(record.encrypted_with_password);
        assert_eq!(record.salt_bytes().unwrap().unwrap().len(), 16);
    }

    #[test]
    fn test_inspect_wrong_password_flags_requires_password() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());
        custodian.generate_parent(Some("correct")).unwrap();

        for attempt in [None, Some("wrong")] {
            match custodian.inspect(attempt) {
                Err(Error::Decryption {
                    requires_password, ..
                }) => assert!(requires_password),
                other => panic!("expected decryption error, got {:?}", other.map(|i| i.public_key)),
            }
        }
    }

    #[test]
    fn test_backup_restore_round_trip() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());

        let generated = custodian.generate_parent(Some("pw1")).unwrap();
        let backup_path = dir.path().join("backup.json");
        custodian
            .backup(Some("pw1"), Some("pw2"), &backup_path)
            .unwrap();

        let restored_pk = custodian.restore(&backup_path, Some("pw2")).unwrap();
        assert_eq!(restored_pk, generated.public_key);

        // Restored record is legacy-mode and decrypts to the original key
        let record = custodian.store.load_parent().unwrap();
        assert!(!record.encrypted_with_password);
        assert!(record.salt.is_none());

        let info = custodian.inspect(None).unwrap();
        assert_eq!(info.private_key, generated.private_key);
    }

    #[test]
    fn test_backup_never_touches_live_store() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());
        custodian.generate_parent(None).unwrap();

        let before = std::fs::read(dir.path().join("parent_wallet.json")).unwrap();
        custodian
            .backup(None, Some("pw"), &dir.path().join("b.json"))
            .unwrap();
        let after = std::fs::read(dir.path().join("parent_wallet.json")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_restore_wrong_password_is_atomic() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());

        custodian.generate_parent(None).unwrap();
        let backup_path = dir.path().join("backup.json");
        custodian
            .backup(None, Some("right"), &backup_path)
            .unwrap();

        // Overwrite parent with a second wallet so we can detect any change
        custodian.generate_parent(None).unwrap();
        let before = std::fs::read(dir.path().join("parent_wallet.json")).unwrap();

        let result = custodian.restore(&backup_path, Some("wrong"));
        assert!(matches!(result, Err(Error::Decryption { .. })));

        let after = std::fs::read(dir.path().join("parent_wallet.json")).unwrap();
        assert_eq!(before, after, "failed restore must leave the live store untouched");
    }

    #[test]
    fn test_restore_missing_archive() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());
        let result = custodian.restore(&dir.path().join("missing.json"), None);
        assert!(matches!(result, Err(Error::Restore(_))));
    }

    #[test]
    fn test_generate_children_returns_public_keys_only() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());

        let keys = custodian.generate_children(3, None).unwrap();
        assert_eq!(keys.len(), 3);

        let records = custodian.store.load_children().unwrap();
        assert_eq!(records.len(), 3);
        for (key, record) in keys.iter().zip(&records) {
            assert_eq!(key, &record.public_key);
            assert!(!record.encrypted_with_password);
        }
    }

    #[test]
    fn test_batch_decrypt_isolates_corrupt_record() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());
        custodian.generate_children(5, None).unwrap();

        // Corrupt the ciphertext of the middle record
        let children_path = dir.path().join("wallets.json");
        let mut records: Vec<WalletRecord> =
            serde_json::from_str(&std::fs::read_to_string(&children_path).unwrap()).unwrap();
        records[2].private_key = BASE64.encode([0u8; 40]);
        std::fs::write(&children_path, serde_json::to_string(&records).unwrap()).unwrap();

        let outcomes = custodian.decrypt_children(None).unwrap();
        assert_eq!(outcomes.len(), 5);

        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.public_key, records[i].public_key, "store order preserved");
            if i == 2 {
                assert!(outcome.result.is_err());
            } else {
                assert!(outcome.result.is_ok());
            }
        }
    }

    #[test]
    fn test_password_flagged_record_without_salt_is_corrupt() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());
        custodian.generate_parent(Some("pw")).unwrap();

        let parent_path = dir.path().join("parent_wallet.json");
        let mut record: WalletRecord =
            serde_json::from_str(&std::fs::read_to_string(&parent_path).unwrap()).unwrap();
        record.salt = None;
        std::fs::write(&parent_path, serde_json::to_string(&record).unwrap()).unwrap();

        let result = custodian.inspect(Some("pw"));
        assert!(matches!(result, Err(Error::CorruptStore(_))));
    }

    #[test]
    fn test_parent_signer_matches_generated_key() {
        let dir = tempdir().unwrap();
        let custodian = custodian(dir.path());

        let generated = custodian.generate_parent(None).unwrap();
        let signer = custodian.parent_signer(None).unwrap();
        assert_eq!(signer.pubkey().to_string(), generated.public_key);
    }
}
