//! Error types for the custody tool

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the custody tool
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Key derivation errors
    #[error("Key derivation failed: {0}")]
    Derivation(String),

    // Encryption / store errors
    #[error("Decryption failed: {message}")]
    Decryption {
        message: String,
        /// True when the record is password-encrypted and the caller
        /// supplied no (or the wrong) password.
        requires_password: bool,
    },

    #[error("Corrupt wallet store: {0}")]
    CorruptStore(String),

    #[error("Wallet store not found: {0}")]
    NotFound(String),

    // Lifecycle operation errors
    #[error("Backup failed: {0}")]
    Backup(String),

    #[error("Restore failed: {0}")]
    Restore(String),

    // Transfer dispatch errors
    #[error("Dispatch failed for {target}: {message}")]
    Dispatch { target: String, message: String },

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Decryption error without the password flag set
    pub fn decryption(message: impl Into<String>) -> Self {
        Error::Decryption {
            message: message.into(),
            requires_password: false,
        }
    }

    /// Decryption error for a password-protected record
    pub fn needs_password(message: impl Into<String>) -> Self {
        Error::Decryption {
            message: message.into(),
            requires_password: true,
        }
    }

    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Rpc(_) | Error::Dispatch { .. })
    }

    /// Stable kind string for structured CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::MissingEnvVar(_) => "ConfigError",
            Error::Derivation(_) => "DerivationError",
            Error::Decryption { .. } => "DecryptionError",
            Error::CorruptStore(_) => "CorruptStoreError",
            Error::NotFound(_) => "NotFoundError",
            Error::Backup(_) => "BackupError",
            Error::Restore(_) => "RestoreError",
            Error::Dispatch { .. } => "DispatchError",
            Error::Rpc(_) => "RpcError",
            Error::Serialization(_) => "SerializationError",
            Error::Io(_) => "IoError",
            Error::Anyhow(_) => "InternalError",
        }
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(Error::Derivation("x".into()).kind(), "DerivationError");
        assert_eq!(Error::decryption("x").kind(), "DecryptionError");
        assert_eq!(Error::NotFound("x".into()).kind(), "NotFoundError");
        assert_eq!(
            Error::Dispatch {
                target: "t".into(),
                message: "m".into()
            }
            .kind(),
            "DispatchError"
        );
    }

    #[test]
    fn test_needs_password_flag() {
        match Error::needs_password("locked") {
            Error::Decryption {
                requires_password, ..
            } => assert!(requires_password),
            _ => panic!("wrong variant"),
        }
    }
}
