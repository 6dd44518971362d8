//! # Meshsim Crypto
//!
//! Authenticated public-key encryption between mesh nodes.
//!
//! Every node owns an X25519 key pair. A message from `S` to `R` is sealed
//! with a key derived from the X25519 shared secret of `S` and `R`
//! (HKDF-SHA256) and encrypted with XChaCha20-Poly1305 under a fresh
//! 24-byte random nonce. Both public keys are bound into the associated
//! data, so a box only opens for the exact sender/recipient pair it was
//! sealed for.
//!
//! ## Example
//!
//! ```rust,ignore
//! use meshsim_crypto::{KeyPair, open, seal};
//!
//! let alice = KeyPair::generate()?;
//! let bob = KeyPair::generate()?;
//!
//! let sealed = seal(b"hello", alice.secret(), &bob.public())?;
//! let plaintext = open(&sealed.ciphertext, &sealed.nonce, &alice.public(), bob.secret())?;
//! assert_eq!(plaintext, b"hello");
//! ```

pub mod error;
pub mod keys;
pub mod sealed_box;

// Re-exports
pub use error::{CryptoError, CryptoResult};
pub use keys::{KEY_SIZE, KeyDirectory, KeyPair, PublicKey, SecretKey};
pub use sealed_box::{SealedBox, TAG_SIZE, open, seal};
