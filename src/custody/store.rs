//! Encrypted wallet record persistence
//!
//! Serializes wallet records to JSON stores and runs private-key material
//! through AES-256-GCM. Ciphertext blobs are base64 of nonce || ciphertext,
//! so a record is self-contained apart from its credential.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::derivation::SymmetricKey;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// One persisted, encrypted keypair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    /// Base58 public key
    pub public_key: String,

    /// Encrypted private key: base64(nonce || AES-256-GCM ciphertext)
    pub private_key: String,

    /// Salt for password-mode key derivation, base64. Present iff
    /// `encrypted_with_password`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,

    /// Whether the record was encrypted with a user password
    /// (as opposed to the configured legacy secret)
    #[serde(default)]
    pub encrypted_with_password: bool,

    /// Creation time, Unix seconds
    pub created_at: f64,
}

impl WalletRecord {
    /// Decode the stored salt, if any
    pub fn salt_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.salt {
            None => Ok(None),
            Some(b64) => {
                let bytes = BASE64.decode(b64).map_err(|e| {
                    Error::CorruptStore(format!("invalid salt encoding: {}", e))
                })?;
                Ok(Some(bytes))
            }
        }
    }
}

/// Self-contained backup snapshot of a parent record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupArchive {
    #[serde(flatten)]
    pub record: WalletRecord,

    /// When the backup was taken, Unix seconds
    pub backup_date: f64,

    /// Creation time of the wallet the backup came from, Unix seconds
    pub original_created_at: f64,
}

/// Current time as Unix seconds
pub fn now_ts() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Encrypt plaintext key material under a derived key.
///
/// A fresh random nonce is generated per call and prepended to the
/// ciphertext inside the base64 blob.
pub fn encrypt_key(plaintext: &[u8], key: &SymmetricKey) -> Result<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| Error::decryption(format!("encryption failed: {}", e)))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(blob))
}

/// Decrypt a ciphertext blob produced by [`encrypt_key`].
///
/// A wrong key or tampered blob fails the GCM tag check and comes back
/// as a `Decryption` error, never as silently wrong plaintext.
pub fn decrypt_key(blob_b64: &str, key: &SymmetricKey) -> Result<Vec<u8>> {
    let blob = BASE64
        .decode(blob_b64)
        .map_err(|e| Error::CorruptStore(format!("invalid ciphertext encoding: {}", e)))?;

    if blob.len() <= NONCE_LEN {
        return Err(Error::CorruptStore(
            "ciphertext blob too short".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| Error::decryption("wrong credential or corrupt ciphertext"))
}

/// File-backed store for the parent record and the child collection.
///
/// Single-writer: all saves go through one in-process lock, and every
/// write is write-then-rename so a crash never leaves a partial record.
pub struct EncryptedKeyStore {
    parent_path: PathBuf,
    children_path: PathBuf,
    write_lock: Mutex<()>,
}

impl EncryptedKeyStore {
    pub fn new(parent_path: impl Into<PathBuf>, children_path: impl Into<PathBuf>) -> Self {
        Self {
            parent_path: parent_path.into(),
            children_path: children_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn parent_path(&self) -> &Path {
        &self.parent_path
    }

    /// Load the parent wallet record
    pub fn load_parent(&self) -> Result<WalletRecord> {
        load_json(&self.parent_path)
    }

    /// Persist the parent wallet record
    pub fn save_parent(&self, record: &WalletRecord) -> Result<()> {
        let _guard = self.write_lock.lock().expect("store lock poisoned");
        save_json(&self.parent_path, record)?;
        debug!(path = %self.parent_path.display(), "saved parent wallet record");
        Ok(())
    }

    /// Load the child wallet collection. A missing file is an empty fleet.
    pub fn load_children(&self) -> Result<Vec<WalletRecord>> {
        match load_json::<Vec<WalletRecord>>(&self.children_path) {
            Ok(records) => Ok(records),
            Err(Error::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Append newly generated records to the child collection
    pub fn append_children(&self, new_records: Vec<WalletRecord>) -> Result<()> {
        let _guard = self.write_lock.lock().expect("store lock poisoned");
        let mut records = match load_json::<Vec<WalletRecord>>(&self.children_path) {
            Ok(records) => records,
            Err(Error::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let added = new_records.len();
        records.extend(new_records);
        save_json(&self.children_path, &records)?;
        debug!(added, total = records.len(), "appended child wallet records");
        Ok(())
    }

    /// Load a backup archive from an explicit path
    pub fn load_archive(&self, path: &Path) -> Result<BackupArchive> {
        if !path.exists() {
            return Err(Error::Restore(format!(
                "backup file not found: {}",
                path.display()
            )));
        }
        load_json(path)
    }

    /// Write a backup archive to an explicit path, never the live store
    pub fn save_archive(&self, path: &Path, archive: &BackupArchive) -> Result<()> {
        if path == self.parent_path {
            return Err(Error::Backup(
                "backup destination must not be the live wallet store".to_string(),
            ));
        }
        let _guard = self.write_lock.lock().expect("store lock poisoned");
        save_json(path, archive)
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(Error::Io(format!("failed to read {}: {}", path.display(), e))),
    };

    serde_json::from_str(&content)
        .map_err(|e| Error::CorruptStore(format!("malformed record in {}: {}", path.display(), e)))
}

/// Write-then-rename so a crash mid-write never corrupts the store
fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Io(format!("failed to create {}: {}", parent.display(), e)))?;
        }
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");

    fs::write(&tmp_path, &json)
        .map_err(|e| Error::Io(format!("failed to write {}: {}", tmp_path.display(), e)))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| Error::Io(format!("failed to replace {}: {}", path.display(), e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::derivation::{new_salt, DerivationConfig};
    use tempfile::tempdir;

    fn test_key(credential: &str, salt: &[u8]) -> SymmetricKey {
        DerivationConfig::for_tests("secret", 100_000)
            .derive(credential, salt)
            .unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let salt = new_salt();
        let key = test_key("password", &salt);

        let blob = encrypt_key(b"super-secret-private-key", &key).unwrap();
        let plaintext = decrypt_key(&blob, &key).unwrap();
        assert_eq!(plaintext, b"super-secret-private-key");
    }

    #[test]
    fn test_wrong_credential_rejected() {
        let salt = new_salt();
        let blob = encrypt_key(b"material", &test_key("right", &salt)).unwrap();

        let result = decrypt_key(&blob, &test_key("wrong", &salt));
        assert!(matches!(result, Err(Error::Decryption { .. })));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let salt = new_salt();
        let key = test_key("password", &salt);
        let blob = encrypt_key(b"material", &key).unwrap();

        let mut bytes = BASE64.decode(&blob).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = BASE64.encode(bytes);

        let result = decrypt_key(&tampered, &key);
        assert!(matches!(result, Err(Error::Decryption { .. })));
    }

    #[test]
    fn test_garbage_blob_is_corrupt_not_decryption() {
        let key = test_key("password", &new_salt());
        assert!(matches!(
            decrypt_key("!!!not-base64!!!", &key),
            Err(Error::CorruptStore(_))
        ));
        assert!(matches!(
            decrypt_key("c2hvcnQ=", &key), // shorter than a nonce
            Err(Error::CorruptStore(_))
        ));
    }

    #[test]
    fn test_parent_save_load() {
        let dir = tempdir().unwrap();
        let store = EncryptedKeyStore::new(
            dir.path().join("parent_wallet.json"),
            dir.path().join("wallets.json"),
        );

        let record = WalletRecord {
            public_key: "Pubkey111".to_string(),
            private_key: "blob".to_string(),
            salt: Some(BASE64.encode(new_salt())),
            encrypted_with_password: true,
            created_at: now_ts(),
        };

        store.save_parent(&record).unwrap();
        let loaded = store.load_parent().unwrap();
        assert_eq!(loaded.public_key, "Pubkey111");
        assert!(loaded.encrypted_with_password);
        assert!(loaded.salt.is_some());

        // No temp file left behind
        assert!(!dir.path().join("parent_wallet.json.tmp").exists());
    }

    #[test]
    fn test_missing_parent_is_not_found() {
        let dir = tempdir().unwrap();
        let store = EncryptedKeyStore::new(
            dir.path().join("parent_wallet.json"),
            dir.path().join("wallets.json"),
        );
        assert!(matches!(store.load_parent(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_malformed_store_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("parent_wallet.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = EncryptedKeyStore::new(path, dir.path().join("wallets.json"));
        assert!(matches!(store.load_parent(), Err(Error::CorruptStore(_))));
    }

    #[test]
    fn test_children_append_and_load() {
        let dir = tempdir().unwrap();
        let store = EncryptedKeyStore::new(
            dir.path().join("parent_wallet.json"),
            dir.path().join("wallets.json"),
        );

        assert!(store.load_children().unwrap().is_empty());

        let make = |pk: &str| WalletRecord {
            public_key: pk.to_string(),
            private_key: "blob".to_string(),
            salt: None,
            encrypted_with_password: false,
            created_at: now_ts(),
        };

        store.append_children(vec![make("a"), make("b")]).unwrap();
        store.append_children(vec![make("c")]).unwrap();

        let children = store.load_children().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[2].public_key, "c");
    }

    #[test]
    fn test_archive_refuses_live_store_path() {
        let dir = tempdir().unwrap();
        let parent = dir.path().join("parent_wallet.json");
        let store = EncryptedKeyStore::new(parent.clone(), dir.path().join("wallets.json"));

        let archive = BackupArchive {
            record: WalletRecord {
                public_key: "p".to_string(),
                private_key: "blob".to_string(),
                salt: None,
                encrypted_with_password: false,
                created_at: 1.0,
            },
            backup_date: 2.0,
            original_created_at: 1.0,
        };

        assert!(matches!(
            store.save_archive(&parent, &archive),
            Err(Error::Backup(_))
        ));
    }

    #[test]
    fn test_missing_archive_is_restore_error() {
        let dir = tempdir().unwrap();
        let store = EncryptedKeyStore::new(
            dir.path().join("parent_wallet.json"),
            dir.path().join("wallets.json"),
        );
        let result = store.load_archive(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(Error::Restore(_))));
    }

    #[test]
    fn test_salt_flag_round_trips_through_json() {
        let record = WalletRecord {
            public_key: "p".to_string(),
            private_key: "blob".to_string(),
            salt: None,
            encrypted_with_password: false,
            created_at: 1.0,
        };
        let json = serde_json::to_string(&record).unwrap();
        // Legacy records carry no salt field at all
        assert!(!json.contains("salt"));

        let parsed: WalletRecord = serde_json::from_str(&json).unwrap();
        assert!(parsed.salt_bytes().unwrap().is_none());
    }
}
