//! Symmetric artifact encryption
//!
//! AES-256-GCM with the key derived from the job passphrase (SHA-256).
//! A fresh random nonce is generated per encryption and prepended to the
//! ciphertext, so the payload is self-contained:
//!
//! `[ 12-byte nonce | ciphertext + tag ]`

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed (wrong passphrase or corrupted payload)")]
    Decrypt,

    #[error("payload too short to contain a nonce")]
    Truncated,
}

fn derive_key(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Encrypt `plaintext` under `passphrase`. Each call produces a distinct
/// payload (fresh nonce) that decrypts to the same plaintext.
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>, CipherError> {
    let cipher = Aes256Gcm::new_from_slice(&derive_key(passphrase))
        .map_err(|_| CipherError::Encrypt)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CipherError::Encrypt)?;

    let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&nonce_bytes);
    payload.extend_from_slice(&ciphertext);
    Ok(payload)
}

/// Decrypt a payload produced by [`encrypt`]. Fails on a wrong passphrase
/// or any tampering, via the GCM authentication tag.
pub fn decrypt(payload: &[u8], passphrase: &str) -> Result<Vec<u8>, CipherError> {
    if payload.len() < NONCE_LEN {
        return Err(CipherError::Truncated);
    }
    let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(&derive_key(passphrase))
        .map_err(|_| CipherError::Decrypt)?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CipherError::Decrypt)
}
