//! # MyFS - Encrypted Single-File Container
//!
//! MyFS stores multiple user files inside one opaque data volume, protected by
//! a master password and bound to the machine that created it. File payloads
//! live in an append-oriented container file; the index that maps logical
//! names to byte ranges (and per-file keys) lives in a separate metadata
//! volume, encrypted with XChaCha20-Poly1305 under a PBKDF2-derived key.
//!
//! ## Features
//!
//! - **Two-volume layout**: raw payload bytes and the encrypted index are
//!   persisted separately; the metadata volume is the source of truth
//! - **Authenticated encryption**: wrong password and tampered bytes are
//!   detected, never decrypted into garbage
//! - **Per-file keys**: individual files can be sealed under their own key,
//!   independent of the filesystem password
//! - **Machine binding**: the container records a machine fingerprint at
//!   format time and reports a mismatch on every open
//! - **Crash-safe metadata**: the index is re-encrypted and atomically
//!   replaced after every mutation
//!
//! ## Quick Start
//!
//! ```no_run
//! use myfs::{attest::HostFingerprint, config::Config, engine::MyFs};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = Config::new("./myfs.dat", "./myfs.meta");
//!     let fp = HostFingerprint;
//!
//!     let fs = MyFs::format(&cfg, "master password", &fp).await?;
//!     fs.import_file("note.txt", b"hello", "/tmp/note.txt", true).await?;
//!
//!     let plain = fs.export_file("note.txt").await?;
//!     assert_eq!(plain, b"hello");
//!     Ok(())
//! }
//! ```
//!
//! ## Volume Formats
//!
//! - **Data volume**: 1024-byte reserved header, then file payloads appended
//!   back to back; deletion leaves unreferenced holes
//! - **Metadata volume**: one encrypted blob holding the whole serialized
//!   index, always rewritten whole

pub mod attest;
pub mod config;
pub mod container;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod metadata;
pub mod metadata_store;

// Re-export common types for convenience
pub use engine::MyFs;
pub use error::MyFsError;
