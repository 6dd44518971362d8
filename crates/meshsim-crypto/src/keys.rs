//! Node key pairs and the shared public-key directory

use std::collections::HashMap;
use std::fmt;

use rand::TryRngCore;
use rand::rngs::OsRng;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

use meshsim_core::NodeId;

use crate::error::{CryptoError, CryptoResult};

/// Key size (32 bytes)
pub const KEY_SIZE: usize = 32;

/// A node's public key, safe to share with every other node
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(x25519_dalek::PublicKey);

impl PublicKey {
    /// Create from raw Montgomery-form bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(x25519_dalek::PublicKey::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        self.0.as_bytes()
    }

    pub(crate) fn inner(&self) -> &x25519_dalek::PublicKey {
        &self.0
    }

    /// Short hex fingerprint for logs
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.as_bytes()[..8])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

/// A node's private key
///
/// Not `Clone`; the underlying secret zeroizes its memory on drop.
pub struct SecretKey(StaticSecret);

impl SecretKey {
    /// Create from raw key material
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey(x25519_dalek::PublicKey::from(&self.0))
    }

    pub(crate) fn inner(&self) -> &StaticSecret {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// A node's key pair
#[derive(Debug)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a key pair from the operating system's secure random source
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng
            .try_fill_bytes(&mut bytes[..])
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self::from_secret(SecretKey::from_bytes(*bytes)))
    }

    /// Build a key pair around an existing secret
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn public(&self) -> PublicKey {
        self.public
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Split into the shareable half and the private half
    pub fn into_parts(self) -> (PublicKey, SecretKey) {
        (self.public, self.secret)
    }
}

/// Read-only registry of every node's public key for one simulation run
#[derive(Debug, Clone, Default)]
pub struct KeyDirectory {
    keys: HashMap<NodeId, PublicKey>,
}

impl KeyDirectory {
    pub fn get(&self, id: &str) -> Option<&PublicKey> {
        self.keys.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.keys.keys()
    }
}

impl FromIterator<(NodeId, PublicKey)> for KeyDirectory {
    fn from_iter<T: IntoIterator<Item = (NodeId, PublicKey)>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation_is_unique() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        assert_ne!(a.public(), b.public());
        assert_eq!(a.secret().public_key(), a.public());
    }

    #[test]
    fn test_secret_debug_does_not_leak() {
        let secret = SecretKey::from_bytes([0x42; KEY_SIZE]);
        assert_eq!(format!("{:?}", secret), "SecretKey(..)");
    }

    #[test]
    fn test_public_key_bytes_roundtrip() {
        let pair = KeyPair::generate().unwrap();
        let restored = PublicKey::from_bytes(*pair.public().as_bytes());
        assert_eq!(restored, pair.public());
        assert_eq!(pair.public().fingerprint().len(), 16);
    }

    #[test]
    fn test_directory_lookup() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        let directory: KeyDirectory = [
            (NodeId::new("A"), a.public()),
            (NodeId::new("B"), b.public()),
        ]
        .into_iter()
        .collect();

        assert_eq!(directory.len(), 2);
        assert_eq!(directory.get("A"), Some(&a.public()));
        assert!(directory.contains("B"));
        assert!(directory.get("C").is_none());
    }
}
