use thiserror::Error;

/// Error taxonomy for MyFS operations.
///
/// Every engine operation returns one of these kinds rather than a bare
/// boolean, so callers can tell a wrong password from a tampered payload from
/// a missing file.
#[derive(Debug, Error)]
pub enum MyFsError {
    /// A container already exists at the target path; `format` never
    /// overwrites silently.
    #[error("container already exists at {0}")]
    AlreadyFormatted(String),

    /// The password did not authenticate the metadata volume.
    #[error("wrong password for metadata volume")]
    WrongPassword,

    /// The metadata volume decrypted but did not decode into a valid index.
    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),

    /// A stored payload failed authenticated decryption (tamper/corruption).
    #[error("payload authentication failed: {0}")]
    Authentication(String),

    /// The live machine fingerprint does not match the one captured at
    /// format time.
    #[error("container is bound to another machine (expected '{expected}', found '{found}')")]
    MachineMismatch { expected: String, found: String },

    /// The container holds the maximum number of files.
    #[error("file limit reached ({0} files)")]
    CapacityExceeded(usize),

    /// A file with this name is already stored.
    #[error("a file named '{0}' already exists")]
    DuplicateName(String),

    /// No stored file has this name.
    #[error("no file named '{0}'")]
    NotFound(String),

    /// The data volume ended before the requested range.
    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    TruncatedRead {
        offset: u64,
        wanted: usize,
        got: usize,
    },

    /// Underlying storage failure (disk full, permissions, missing volume).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MyFsError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptMetadata(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }
}
