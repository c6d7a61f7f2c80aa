//! Cryptographic helpers for the local session.
//!
//! Device keys are Curve25519 pairs; uploaded media is sealed with
//! AES-256-GCM under keys expanded from a per-upload media key via
//! HKDF-SHA256.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CryptoError {
    #[error("invalid key material")]
    InvalidKey,
    #[error("encryption failed")]
    EncryptionFailed,
}

/// A Curve25519 key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public: [u8; 32],
    pub private: [u8; 32],
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let mut private = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut private);

        // Curve25519 clamping
        private[0] &= 248;
        private[31] &= 127;
        private[31] |= 64;

        Self::from_private_key(private)
    }

    pub fn from_private_key(private: [u8; 32]) -> Self {
        let public = PublicKey::from(&StaticSecret::from(private));
        Self {
            public: *public.as_bytes(),
            private,
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public))
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// HKDF-SHA256 extract-then-expand.
pub fn hkdf(salt: Option<&[u8]>, ikm: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>, CryptoError> {
    let salt = salt.unwrap_or(&[0u8; 32]);
    let mut mac = <HmacSha256 as Mac>::new_from_slice(salt).map_err(|_| CryptoError::InvalidKey)?;
    mac.update(ikm);
    let prk = mac.finalize().into_bytes();

    let mut output = Vec::with_capacity(length);
    let mut block: Vec<u8> = Vec::new();
    let mut counter = 1u8;

    while output.len() < length {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&prk).map_err(|_| CryptoError::InvalidKey)?;
        mac.update(&block);
        mac.update(info);
        mac.update(&[counter]);
        block = mac.finalize().into_bytes().to_vec();

        let take = (length - output.len()).min(block.len());
        output.extend_from_slice(&block[..take]);
        counter = counter.wrapping_add(1);
    }

    Ok(output)
}

pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Encrypted media blob plus the digests the message carries.
#[derive(Debug, Clone)]
pub struct SealedMedia {
    pub media_key: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
}

/// Seal `plaintext` under a fresh media key.
///
/// The media key expands into a 12-byte nonce followed by a 32-byte cipher
/// key, using `app_info` as HKDF info.
pub fn seal_media(plaintext: &[u8], app_info: &str) -> Result<SealedMedia, CryptoError> {
    let mut media_key = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut media_key);

    let expanded = hkdf(None, &media_key, app_info.as_bytes(), 44)?;
    let (nonce, cipher_key) = expanded.split_at(12);

    let cipher = Aes256Gcm::new_from_slice(cipher_key).map_err(|_| CryptoError::InvalidKey)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(SealedMedia {
        file_sha256: sha256(plaintext),
        file_enc_sha256: sha256(&ciphertext),
        media_key,
        ciphertext,
    })
}
