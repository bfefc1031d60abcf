//! Encrypted persistence for the metadata index.
//!
//! The metadata volume is one opaque blob: the serialized
//! [`MetadataDocument`] sealed under a password-derived key. It is always
//! rewritten whole — [`MetadataStore::save`] writes to a random temp sibling,
//! syncs it, then atomically renames over the volume, so a crash leaves
//! either the old index or the new one, never a partial write.

use rand_core::{OsRng, RngCore};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::envelope;
use crate::error::MyFsError;
use crate::metadata::MetadataDocument;

#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a metadata volume exists at this path.
    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Serialize, seal, and atomically replace the metadata volume.
    pub async fn save(&self, doc: &MetadataDocument, key: &[u8; 32]) -> Result<(), MyFsError> {
        debug!(path = %self.path.display(), files = doc.files.len(), "persisting metadata");

        let plain = doc.to_bytes()?;
        let sealed = envelope::seal(key, &plain)?;

        let tmp_path = self.random_tmp_path();
        let mut tmp = fs::File::create(&tmp_path).await?;
        if let Err(e) = async {
            tmp.write_all(&sealed).await?;
            tmp.sync_all().await?;
            Ok::<(), std::io::Error>(())
        }
        .await
        {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        drop(tmp);

        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        info!(path = %self.path.display(), bytes = sealed.len(), "metadata volume written");
        Ok(())
    }

    /// Read, decrypt, and decode the metadata volume.
    ///
    /// A failed authentication means the key (and so the password) is wrong:
    /// the volume is one sealed blob, so a bad password and a tampered blob
    /// are indistinguishable here and both surface as
    /// [`MyFsError::WrongPassword`]. Bytes that authenticate but do not
    /// decode surface as [`MyFsError::CorruptMetadata`].
    pub async fn load(&self, key: &[u8; 32]) -> Result<MetadataDocument, MyFsError> {
        debug!(path = %self.path.display(), "loading metadata volume");

        let sealed = fs::read(&self.path).await?;
        let plain = envelope::open(key, &sealed).map_err(|_| MyFsError::WrongPassword)?;
        let doc = MetadataDocument::from_bytes(&plain)?;

        debug!(files = doc.files.len(), "metadata volume loaded");
        Ok(doc)
    }

    /// Unique temp path next to the volume, so the rename stays on one
    /// filesystem.
    fn random_tmp_path(&self) -> PathBuf {
        let mut buf = [0u8; 8];
        OsRng.fill_bytes(&mut buf);

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "metadata".to_string());

        self.path
            .with_file_name(format!("{}.tmp.{}", file_name, hex::encode(buf)))
    }
}
