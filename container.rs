//! The data volume: a fixed-size reserved header followed by file payloads
//! appended back to back.
//!
//! ```text
//! [header: 1024 zero bytes][payload][payload]...
//! ```
//!
//! The container never overwrites or shrinks in place. Logical deletion is a
//! metadata concern; ranges whose entries were deleted simply become
//! unreferenced holes. Offsets handed out by [`Container::append`] stay valid
//! until the owning entry is deleted.

use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::{debug, info};

use crate::error::MyFsError;

/// Reserved header length in bytes. Zero-filled at format time; kept for
/// future container-level versioning and checksums.
pub const HEADER_SIZE: u64 = 1024;

#[derive(Debug)]
pub struct Container {
    path: PathBuf,
}

impl Container {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a data volume exists at this path.
    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Create (or truncate) the data volume and write the zero-filled header.
    pub async fn initialize(&self) -> Result<(), MyFsError> {
        info!(path = %self.path.display(), header = HEADER_SIZE, "initializing data volume");
        let mut file = fs::File::create(&self.path).await?;
        file.write_all(&vec![0u8; HEADER_SIZE as usize]).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Append `payload` at the end of the volume and return the offset where
    /// it begins.
    ///
    /// Position acquisition and the write happen on one handle opened in
    /// append mode; the engine serializes mutating callers, so no two appends
    /// ever observe the same offset.
    pub async fn append(&self, payload: &[u8]) -> Result<u64, MyFsError> {
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        let offset = file.seek(SeekFrom::End(0)).await?;
        file.write_all(payload).await?;
        file.sync_all().await?;

        debug!(offset, bytes = payload.len(), "payload appended");
        Ok(offset)
    }

    /// Read exactly `length` bytes starting at `offset`.
    pub async fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, MyFsError> {
        let mut file = fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(MyFsError::TruncatedRead {
                    offset,
                    wanted: length,
                    got: filled,
                });
            }
            filled += n;
        }

        debug!(offset, bytes = length, "payload read");
        Ok(buf)
    }

    /// Current length of the data volume in bytes.
    pub async fn len(&self) -> Result<u64, MyFsError> {
        Ok(fs::metadata(&self.path).await?.len())
    }
}
