//! Authenticated envelope encryption for opaque byte payloads.
//!
//! Wraps XChaCha20-Poly1305. Every call to [`seal`] draws a fresh random
//! 24-byte nonce, so two encryptions of the same plaintext under the same key
//! produce different ciphertexts.
//!
//! ## Ciphertext layout
//!
//! ```text
//! [nonce:24][ciphertext + tag:16]
//! ```
//!
//! Callers treat the whole blob as opaque bytes; [`open`] fails with
//! [`MyFsError::Authentication`] on any bit flip or wrong key rather than
//! returning garbage.

use chacha20poly1305::aead::{Aead, AeadCore, OsRng};
use chacha20poly1305::{KeyInit, XChaCha20Poly1305, XNonce};
use rand_core::RngCore;

use crate::error::MyFsError;

/// Nonce length for XChaCha20-Poly1305 (extended nonce).
pub const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;

/// Fixed size difference between a sealed blob and its plaintext.
pub const OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// Generate a fresh random 256-bit key (master and per-file keys).
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

fn cipher(key: &[u8; 32]) -> XChaCha20Poly1305 {
    // Key length is fixed by the type, so this cannot fail
    XChaCha20Poly1305::new_from_slice(key)
        .expect("BUG: key is always 32 bytes, this should never fail")
}

/// Encrypt `plaintext` under `key`, prepending the random nonce.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, MyFsError> {
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher(key)
        .encrypt(&nonce, plaintext)
        .map_err(|e| MyFsError::authentication(format!("encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a blob produced by [`seal`]. Fails with
/// [`MyFsError::Authentication`] if the blob is too short, was tampered with,
/// or `key` is wrong.
pub fn open(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>, MyFsError> {
    if blob.len() < OVERHEAD {
        return Err(MyFsError::authentication(format!(
            "blob too short: {} bytes, need at least {}",
            blob.len(),
            OVERHEAD
        )));
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher(key)
        .decrypt(nonce, ciphertext)
        .map_err(|_| MyFsError::authentication("authentication tag mismatch"))
}
