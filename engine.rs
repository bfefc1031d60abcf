//! High-level container operations.
//!
//! This module provides [`MyFs`], the unlocked session returned by
//! [`MyFs::format`] and [`MyFs::open`]. It owns the derived metadata key and
//! the in-memory index for its lifetime, and keeps the data volume and the
//! metadata volume consistent: every content mutation is followed by a
//! metadata re-encrypt and atomic re-persist, and a failed persist rolls the
//! in-memory index back, so the metadata volume is always the single source
//! of truth for what the container holds.
//!
//! Mutating operations serialize on a write lock; exports and listings share
//! a read lock.

use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::attest::FingerprintProvider;
use crate::config::Config;
use crate::container::{Container, HEADER_SIZE};
use crate::envelope;
use crate::error::MyFsError;
use crate::kdf;
use crate::metadata::{FileEntry, MetadataDocument, MAX_FILES};
use crate::metadata_store::MetadataStore;

#[derive(Debug)]
struct State {
    doc: MetadataDocument,
    /// Metadata volume key derived from the filesystem password; wiped when
    /// the session drops.
    key: Zeroizing<[u8; 32]>,
}

/// An unlocked MyFS container.
#[derive(Debug)]
pub struct MyFs {
    container: Container,
    store: MetadataStore,
    state: RwLock<State>,
}

/// Snapshot of volume usage for status reporting.
#[derive(Debug)]
pub struct FsStatus {
    pub file_count: usize,
    pub container_len: u64,
    pub header_size: u64,
    /// Bytes still referenced by live entries; the rest of the payload
    /// region is unreferenced holes.
    pub live_bytes: u64,
}

impl MyFs {
    /// Create a new container pair and return the opened session.
    ///
    /// Refuses to overwrite an existing container at either path.
    pub async fn format(
        cfg: &Config,
        password: &str,
        fingerprint: &dyn FingerprintProvider,
    ) -> Result<Self, MyFsError> {
        let container = Container::new(&cfg.data_path);
        let store = MetadataStore::new(&cfg.metadata_path);

        if container.exists().await {
            return Err(MyFsError::AlreadyFormatted(cfg.data_path.clone()));
        }
        if store.exists().await {
            return Err(MyFsError::AlreadyFormatted(cfg.metadata_path.clone()));
        }

        let machine_id = fingerprint.current()?;
        info!(data = %cfg.data_path, metadata = %cfg.metadata_path, %machine_id, "formatting container");

        let doc = MetadataDocument::new(
            machine_id,
            Utc::now().to_rfc3339(),
            envelope::generate_key(),
        );

        container.initialize().await?;
        let key = kdf::derive_metadata_key(password);
        if let Err(e) = store.save(&doc, &key).await {
            // Do not leave a header-only volume behind that blocks a retry
            let _ = tokio::fs::remove_file(&cfg.data_path).await;
            return Err(e);
        }

        Ok(Self {
            container,
            store,
            state: RwLock::new(State { doc, key }),
        })
    }

    /// Unlock an existing container.
    ///
    /// Fails with [`MyFsError::WrongPassword`] if the password does not
    /// authenticate the metadata volume, and with
    /// [`MyFsError::MachineMismatch`] if the live fingerprint differs from
    /// the one captured at format time. The mismatch is always reported;
    /// a caller that decides to proceed anyway can re-open with a provider
    /// returning the stored id.
    pub async fn open(
        cfg: &Config,
        password: &str,
        fingerprint: &dyn FingerprintProvider,
    ) -> Result<Self, MyFsError> {
        let container = Container::new(&cfg.data_path);
        let store = MetadataStore::new(&cfg.metadata_path);

        let key = kdf::derive_metadata_key(password);
        let doc = store.load(&key).await?;

        let found = fingerprint.current()?;
        if doc.machine_id != found {
            warn!(expected = %doc.machine_id, %found, "machine fingerprint mismatch");
            return Err(MyFsError::MachineMismatch {
                expected: doc.machine_id.clone(),
                found,
            });
        }

        info!(data = %cfg.data_path, files = doc.files.len(), "container opened");
        Ok(Self {
            container,
            store,
            state: RwLock::new(State { doc, key }),
        })
    }

    /// Store `content` under the logical name `name`.
    ///
    /// With `encrypt` set, the payload is sealed under a fresh per-file key
    /// before it reaches the data volume. If persisting the updated index
    /// fails, the in-memory insert is rolled back; the appended bytes become
    /// an unreferenced hole.
    pub async fn import_file(
        &self,
        name: &str,
        content: &[u8],
        original_path: &str,
        encrypt: bool,
    ) -> Result<(), MyFsError> {
        debug!(file = name, size = content.len(), encrypt, "importing file");
        let mut st = self.state.write().await;

        if st.doc.files.len() >= MAX_FILES {
            return Err(MyFsError::CapacityExceeded(MAX_FILES));
        }
        if st.doc.files.contains_key(name) {
            return Err(MyFsError::DuplicateName(name.to_string()));
        }

        let (payload, file_key) = if encrypt {
            let key = envelope::generate_key();
            (envelope::seal(&key, content)?, Some(key))
        } else {
            (content.to_vec(), None)
        };

        let offset = self.container.append(&payload).await?;

        let entry = FileEntry {
            name: name.to_string(),
            size: content.len() as u64,
            original_path: original_path.to_string(),
            creation_time: Utc::now().to_rfc3339(),
            is_encrypted: encrypt,
            file_key,
            offset,
            attributes: BTreeMap::new(),
        };
        st.doc.files.insert(name.to_string(), entry);
        st.doc.file_count = st.doc.files.len() as u32;

        if let Err(e) = self.store.save(&st.doc, &st.key).await {
            // The appended range stays behind as a hole; the index must not
            // reference it
            error!(file = name, error = %e, "metadata persist failed, rolling back import");
            st.doc.files.remove(name);
            st.doc.file_count = st.doc.files.len() as u32;
            return Err(e);
        }

        info!(file = name, offset, stored = payload.len(), encrypted = encrypt, "file imported");
        Ok(())
    }

    /// Return the plaintext content of a stored file. Decryption is
    /// transparent: the caller gets the original bytes either way.
    pub async fn export_file(&self, name: &str) -> Result<Vec<u8>, MyFsError> {
        debug!(file = name, "exporting file");
        let st = self.state.read().await;

        let entry = st
            .doc
            .files
            .get(name)
            .ok_or_else(|| MyFsError::NotFound(name.to_string()))?;

        let stored = self
            .container
            .read_at(entry.offset, entry.stored_len() as usize)
            .await?;

        let plain = if entry.is_encrypted {
            let key = entry
                .file_key
                .as_ref()
                .ok_or_else(|| MyFsError::corrupt(format!("entry '{}' has no file key", name)))?;
            match envelope::open(key, &stored) {
                Ok(plain) => plain,
                Err(e) => {
                    error!(file = name, error = %e, "payload decryption failed");
                    return Err(e);
                }
            }
        } else {
            stored
        };

        info!(file = name, bytes = plain.len(), "file exported");
        Ok(plain)
    }

    /// Drop a file from the index. The payload bytes stay in the data volume
    /// as an unreferenced hole.
    pub async fn delete_file(&self, name: &str) -> Result<(), MyFsError> {
        let mut st = self.state.write().await;

        let entry = st
            .doc
            .files
            .remove(name)
            .ok_or_else(|| MyFsError::NotFound(name.to_string()))?;
        st.doc.file_count = st.doc.files.len() as u32;

        if let Err(e) = self.store.save(&st.doc, &st.key).await {
            error!(file = name, error = %e, "metadata persist failed, rolling back delete");
            st.doc.files.insert(name.to_string(), entry);
            st.doc.file_count = st.doc.files.len() as u32;
            return Err(e);
        }

        info!(file = name, "file deleted (payload range left as hole)");
        Ok(())
    }

    /// Re-encrypt a stored file under a key derived from `password`.
    ///
    /// The current payload is read back (and decrypted if needed), sealed
    /// under the new key, and appended as a fresh range; the entry then
    /// points at the new ciphertext and the old range becomes a hole.
    pub async fn set_file_password(&self, name: &str, password: &str) -> Result<(), MyFsError> {
        debug!(file = name, "setting file password");
        let mut st = self.state.write().await;

        let previous = st
            .doc
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| MyFsError::NotFound(name.to_string()))?;

        let stored = self
            .container
            .read_at(previous.offset, previous.stored_len() as usize)
            .await?;
        let plain = if previous.is_encrypted {
            let key = previous
                .file_key
                .as_ref()
                .ok_or_else(|| MyFsError::corrupt(format!("entry '{}' has no file key", name)))?;
            envelope::open(key, &stored)?
        } else {
            stored
        };

        let new_key = *kdf::derive_key(password, kdf::METADATA_SALT, kdf::PBKDF2_ITERATIONS);
        let sealed = envelope::seal(&new_key, &plain)?;
        let offset = self.container.append(&sealed).await?;

        {
            // Entry exists, checked above
            let entry = st
                .doc
                .files
                .get_mut(name)
                .ok_or_else(|| MyFsError::NotFound(name.to_string()))?;
            entry.offset = offset;
            entry.file_key = Some(new_key);
            entry.is_encrypted = true;
        }

        if let Err(e) = self.store.save(&st.doc, &st.key).await {
            error!(file = name, error = %e, "metadata persist failed, rolling back rekey");
            st.doc.files.insert(name.to_string(), previous);
            return Err(e);
        }

        info!(file = name, offset, "file re-encrypted under password-derived key");
        Ok(())
    }

    /// Re-encrypt the metadata volume under a new filesystem password.
    /// Neither the data volume nor any per-file key changes.
    pub async fn change_fs_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), MyFsError> {
        let mut st = self.state.write().await;

        // Authenticate the old password against the volume itself, not just
        // the in-memory key
        let old_key = kdf::derive_metadata_key(old_password);
        self.store.load(&old_key).await?;

        let new_key = kdf::derive_metadata_key(new_password);
        self.store.save(&st.doc, &new_key).await?;
        st.key = new_key;

        info!("filesystem password changed");
        Ok(())
    }

    /// Sorted listing of `(name, plaintext size, is_encrypted)`.
    pub async fn list_files(&self) -> Vec<(String, u64, bool)> {
        let st = self.state.read().await;
        st.doc
            .files
            .values()
            .map(|e| (e.name.clone(), e.size, e.is_encrypted))
            .collect()
    }

    /// Full descriptor for one stored file.
    pub async fn stat(&self, name: &str) -> Result<FileEntry, MyFsError> {
        let st = self.state.read().await;
        st.doc
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| MyFsError::NotFound(name.to_string()))
    }

    /// Fingerprint of the machine that formatted this container.
    pub async fn machine_id(&self) -> String {
        self.state.read().await.doc.machine_id.clone()
    }

    /// Volume usage snapshot.
    pub async fn status(&self) -> Result<FsStatus, MyFsError> {
        let st = self.state.read().await;
        let live_bytes = st.doc.files.values().map(|e| e.stored_len()).sum();
        Ok(FsStatus {
            file_count: st.doc.files.len(),
            container_len: self.container.len().await?,
            header_size: HEADER_SIZE,
            live_bytes,
        })
    }
}
