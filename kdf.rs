//! Password-based key derivation.
//!
//! Turns a password string into a 256-bit symmetric key via PBKDF2-HMAC-SHA256
//! with a high iteration count. Derivation is deterministic: the same
//! password, salt, and iteration count always yield the same key.
//!
//! ## Salt
//!
//! The metadata volume uses a fixed, documented salt ([`METADATA_SALT`])
//! shared by every container. This is part of the on-disk format contract
//! inherited from the original design and is a known weakness: identical
//! passwords on different containers derive identical keys. Do not change it
//! without versioning the metadata volume.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Fixed salt for the metadata volume key. Shared by all containers (known
/// weakness, kept for format compatibility).
pub const METADATA_SALT: &[u8] = b"salt";

/// Default PBKDF2 iteration count. High enough to slow brute force on
/// commodity hardware.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derived key length in bytes (XChaCha20-Poly1305 key size).
pub const KEY_LEN: usize = 32;

/// Derive a 32-byte key from `password` under `salt` with `iterations`
/// rounds of PBKDF2-HMAC-SHA256.
///
/// The result is wrapped in [`Zeroizing`] so the key material is wiped when
/// the caller drops it.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, key.as_mut());
    key
}

/// Derive the metadata volume key for `password` using the fixed salt and
/// default iteration count.
pub fn derive_metadata_key(password: &str) -> Zeroizing<[u8; KEY_LEN]> {
    derive_key(password, METADATA_SALT, PBKDF2_ITERATIONS)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keep test iteration counts low; determinism is what is under test.
    const TEST_ITERS: u32 = 1_000;

    #[test]
    fn derivation_is_deterministic() {
        let k1 = derive_key("hunter2", b"salt", TEST_ITERS);
        let k2 = derive_key("hunter2", b"salt", TEST_ITERS);
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn password_changes_key() {
        let k1 = derive_key("hunter2", b"salt", TEST_ITERS);
        let k2 = derive_key("hunter3", b"salt", TEST_ITERS);
        assert_ne!(*k1, *k2);
    }

    #[test]
    fn salt_changes_key() {
        let k1 = derive_key("hunter2", b"salt", TEST_ITERS);
        let k2 = derive_key("hunter2", b"pepper", TEST_ITERS);
        assert_ne!(*k1, *k2);
    }

    #[test]
    fn iteration_count_changes_key() {
        let k1 = derive_key("hunter2", b"salt", TEST_ITERS);
        let k2 = derive_key("hunter2", b"salt", TEST_ITERS + 1);
        assert_ne!(*k1, *k2);
    }
}
