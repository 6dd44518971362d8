//! Authenticated public-key box
//!
//! The box key is derived from the X25519 shared secret between sender and
//! recipient with HKDF-SHA256. Payloads are encrypted with
//! XChaCha20-Poly1305; the sender's and recipient's public keys are the
//! associated data. Tag verification inside the AEAD is constant-time.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroizing;

use meshsim_core::NONCE_SIZE;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{KEY_SIZE, PublicKey, SecretKey};

/// Size of the Poly1305 tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

const BOX_INFO: &[u8] = b"meshsim box v1";

/// Output of [`seal`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    /// Ciphertext with the tag appended (plaintext length + 16)
    pub ciphertext: Vec<u8>,
    /// Fresh random nonce used for this box
    pub nonce: [u8; NONCE_SIZE],
}

fn box_cipher(
    our_secret: &SecretKey,
    their_public: &PublicKey,
) -> Option<(XChaCha20Poly1305, Zeroizing<[u8; KEY_SIZE]>)> {
    let shared = our_secret.inner().diffie_hellman(their_public.inner());
    if !shared.was_contributory() {
        return None;
    }

    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(BOX_INFO, &mut key[..]).ok()?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key[..]));
    Some((cipher, key))
}

fn associated_data(sender: &PublicKey, recipient: &PublicKey) -> [u8; 2 * KEY_SIZE] {
    let mut aad = [0u8; 2 * KEY_SIZE];
    aad[..KEY_SIZE].copy_from_slice(sender.as_bytes());
    aad[KEY_SIZE..].copy_from_slice(recipient.as_bytes());
    aad
}

/// Encrypt `plaintext` from the holder of `sender` to `recipient`
///
/// A fresh nonce is drawn from the OS on every call.
pub fn seal(
    plaintext: &[u8],
    sender: &SecretKey,
    recipient: &PublicKey,
) -> CryptoResult<SealedBox> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::Encryption(format!("nonce generation failed: {e}")))?;

    let (cipher, _key) = box_cipher(sender, recipient)
        .ok_or_else(|| CryptoError::InvalidKey("low-order recipient key".to_string()))?;
    let aad = associated_data(&sender.public_key(), recipient);

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(SealedBox { ciphertext, nonce })
}

/// Decrypt a box sealed by `sender` for the holder of `recipient`
///
/// Any mismatch (wrong keys, altered ciphertext, altered nonce) yields
/// [`CryptoError::Authentication`]; no partial plaintext is ever returned.
pub fn open(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_SIZE],
    sender: &PublicKey,
    recipient: &SecretKey,
) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Authentication);
    }

    let (cipher, _key) = box_cipher(recipient, sender).ok_or(CryptoError::Authentication)?;
    let aad = associated_data(sender, &recipient.public_key());

    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    fn pairs() -> (KeyPair, KeyPair) {
        (KeyPair::generate().unwrap(), KeyPair::generate().unwrap())
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let (alice, bob) = pairs();
        for plaintext in [&b""[..], &b"Hello from A \xe2\x86\x92 B"[..], &[0xAB; 4096][..]] {
            let sealed = seal(plaintext, alice.secret(), &bob.public()).unwrap();
            assert_eq!(sealed.ciphertext.len(), plaintext.len() + TAG_SIZE);

            let opened = open(&sealed.ciphertext, &sealed.nonce, &alice.public(), bob.secret()).unwrap();
            assert_eq!(opened, plaintext);
        }
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let (alice, bob) = pairs();
        let first = seal(b"same", alice.secret(), &bob.public()).unwrap();
        let second = seal(b"same", alice.secret(), &bob.public()).unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_every_ciphertext_bit_flip_fails() {
        let (alice, bob) = pairs();
        let sealed = seal(b"tamper me", alice.secret(), &bob.public()).unwrap();

        for byte in 0..sealed.ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = sealed.ciphertext.clone();
                tampered[byte] ^= 1 << bit;
                let result = open(&tampered, &sealed.nonce, &alice.public(), bob.secret());
                assert!(matches!(result, Err(CryptoError::Authentication)));
            }
        }
    }

    #[test]
    fn test_every_nonce_bit_flip_fails() {
        let (alice, bob) = pairs();
        let sealed = seal(b"tamper the nonce", alice.secret(), &bob.public()).unwrap();

        for byte in 0..NONCE_SIZE {
            for bit in 0..8 {
                let mut nonce = sealed.nonce;
                nonce[byte] ^= 1 << bit;
                let result = open(&sealed.ciphertext, &nonce, &alice.public(), bob.secret());
                assert!(matches!(result, Err(CryptoError::Authentication)));
            }
        }
    }

    #[test]
    fn test_wrong_keys_fail() {
        let (alice, bob) = pairs();
        let mallory = KeyPair::generate().unwrap();
        let sealed = seal(b"for bob only", alice.secret(), &bob.public()).unwrap();

        // wrong recipient
        assert!(matches!(
            open(&sealed.ciphertext, &sealed.nonce, &alice.public(), mallory.secret()),
            Err(CryptoError::Authentication)
        ));
        // wrong claimed sender
        assert!(matches!(
            open(&sealed.ciphertext, &sealed.nonce, &mallory.public(), bob.secret()),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let (alice, bob) = pairs();
        let sealed = seal(b"short", alice.secret(), &bob.public()).unwrap();
        let result = open(&sealed.ciphertext[..TAG_SIZE - 1], &sealed.nonce, &alice.public(), bob.secret());
        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_low_order_key_rejected() {
        let alice = KeyPair::generate().unwrap();
        let zero = PublicKey::from_bytes([0u8; KEY_SIZE]);
        assert!(matches!(
            seal(b"x", alice.secret(), &zero),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
