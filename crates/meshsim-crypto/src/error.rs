//! Error types for meshsim-crypto

use meshsim_core::MeshError;
use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Tag did not verify: wrong keys, tampered ciphertext or wrong nonce
    #[error("Authentication failed")]
    Authentication,

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for MeshError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KeyGeneration(msg) => MeshError::KeyGen(msg),
            CryptoError::Encryption(msg) => MeshError::Encrypt(msg),
            CryptoError::InvalidKey(msg) => MeshError::Encrypt(format!("invalid key: {msg}")),
            CryptoError::Authentication => MeshError::Authentication,
        }
    }
}
