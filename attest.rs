//! Collaborator interfaces around the container engine: machine identity,
//! one-time-password gating, and executable self-attestation.
//!
//! The engine only consumes these as traits; the reference implementations
//! here are deliberately simple and callers are free to substitute their own
//! (tests use [`FixedFingerprint`]).

use sha2::{Digest, Sha256};
use std::io;
use tracing::debug;

/// Source of a machine-identifying value, stable for the current machine
/// across runs. Captured into `machine_id` at format time and compared on
/// every open.
pub trait FingerprintProvider {
    fn current(&self) -> io::Result<String>;
}

/// Machine fingerprint from the host's machine-id (with a hostname fallback
/// on platforms that have none).
pub struct HostFingerprint;

impl FingerprintProvider for HostFingerprint {
    fn current(&self) -> io::Result<String> {
        #[cfg(target_os = "linux")]
        {
            for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
                if let Ok(id) = std::fs::read_to_string(path) {
                    let id = id.trim();
                    if !id.is_empty() {
                        return Ok(id.to_string());
                    }
                }
            }
        }

        // Fallback: hostname is stable enough for a single-user container
        std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .map_err(|_| {
                io::Error::new(io::ErrorKind::NotFound, "no machine identifier available")
            })
    }
}

/// Fixed fingerprint for tests and for callers that choose to bypass the
/// machine check after an explicit mismatch.
pub struct FixedFingerprint(pub String);

impl FingerprintProvider for FixedFingerprint {
    fn current(&self) -> io::Result<String> {
        Ok(self.0.clone())
    }
}

/// Gate for sensitive operations: checks a challenge/response pair inside an
/// expiry window.
pub trait OtpVerifier {
    fn verify(
        &self,
        challenge: u32,
        response: u32,
        now: i64,
        issued_at: i64,
        timeout_seconds: i64,
    ) -> bool;
}

/// Reference verifier: the response matches when its last four digits equal
/// the challenge, and the challenge has not expired.
pub struct ChallengeWindowVerifier;

impl OtpVerifier for ChallengeWindowVerifier {
    fn verify(
        &self,
        challenge: u32,
        response: u32,
        now: i64,
        issued_at: i64,
        timeout_seconds: i64,
    ) -> bool {
        if now < issued_at || now - issued_at > timeout_seconds {
            debug!(challenge, "OTP challenge expired");
            return false;
        }
        response % 10_000 == challenge
    }
}

/// Reports whether the running executable matches an expected reference
/// hash. The reference hash is provisioned out of band; this side only
/// recomputes and compares.
pub trait BinaryAttestor {
    fn verify_self(&self) -> io::Result<bool>;
}

/// SHA-256 self-hash attestor comparing the current executable against an
/// expected hex digest.
pub struct SelfHashAttestor {
    expected_hex: String,
}

impl SelfHashAttestor {
    pub fn new(expected_hex: impl Into<String>) -> Self {
        Self {
            expected_hex: expected_hex.into().to_lowercase(),
        }
    }
}

impl BinaryAttestor for SelfHashAttestor {
    fn verify_self(&self) -> io::Result<bool> {
        let exe = std::env::current_exe()?;
        let bytes = std::fs::read(&exe)?;
        let digest = hex::encode(Sha256::digest(&bytes));
        debug!(exe = %exe.display(), %digest, "computed self hash");
        Ok(digest == self.expected_hex)
    }
}
