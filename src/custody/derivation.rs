//! Symmetric key derivation
//!
//! Turns a credential (password or configured static secret) plus a salt
//! into a reproducible 32-byte encryption key via PBKDF2-HMAC-SHA256.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::config::SecurityConfig;
use crate::error::{Error, Result};

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// A derived symmetric key. Held in memory only, never persisted.
#[derive(Clone)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// Key material must not leak through Debug output
impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey(..)")
    }
}

/// Explicit derivation settings, replacing hidden process-global state.
///
/// The legacy salt is resolved once at construction: either the configured
/// override or a random salt that stays stable for the process lifetime.
#[derive(Debug, Clone)]
pub struct DerivationConfig {
    /// Static secret for legacy-mode encryption
    legacy_secret: String,

    /// Process-wide salt for legacy mode
    legacy_salt: Vec<u8>,

    /// PBKDF2 iteration count
    iterations: u32,
}

impl DerivationConfig {
    /// Build from the security section of the loaded configuration
    pub fn from_security(security: &SecurityConfig) -> Result<Self> {
        let legacy_salt = match security
            .legacy_salt_bytes()
            .map_err(|e| Error::Config(e.to_string()))?
        {
            Some(salt) => salt,
            None => new_salt().to_vec(),
        };

        Ok(Self {
            legacy_secret: security.legacy_secret.clone(),
            legacy_salt,
            iterations: security.encryption_iterations,
        })
    }

    #[cfg(test)]
    pub fn for_tests(secret: &str, iterations: u32) -> Self {
        Self {
            legacy_secret: secret.to_string(),
            legacy_salt: vec![7u8; SALT_LEN],
            iterations,
        }
    }

    /// Derive a key from an explicit credential and salt (password mode)
    pub fn derive(&self, credential: &str, salt: &[u8]) -> Result<SymmetricKey> {
        if credential.is_empty() {
            return Err(Error::Derivation(
                "credential must not be empty".to_string(),
            ));
        }
        if salt.is_empty() {
            return Err(Error::Derivation("salt must not be empty".to_string()));
        }

        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(credential.as_bytes(), salt, self.iterations, &mut key);
        Ok(SymmetricKey(key))
    }

    /// Derive the legacy-mode key from the configured static secret
    /// and process-wide salt.
    ///
    /// Weaker than password mode. Kept for records written without a
    /// password and as the at-rest mode after restore.
    pub fn derive_legacy(&self) -> Result<SymmetricKey> {
        if self.legacy_secret.is_empty() {
            return Err(Error::Derivation(
                "no legacy secret configured (set SNIPERFI__SECURITY__LEGACY_SECRET) \
                 and no password supplied"
                    .to_string(),
            ));
        }
        self.derive(&self.legacy_secret, &self.legacy_salt)
    }
}

/// Generate a fresh random salt
pub fn new_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
