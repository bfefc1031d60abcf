//! The metadata index: per-file descriptors and the whole-container document,
//! plus the codec that turns the document into plain bytes.
//!
//! The serialized form is JSON with all key material rendered as lowercase
//! hex text, so the codec never assumes a binary-safe transport. The codec
//! round-trips exactly: `from_bytes(to_bytes(d)) == d` for every valid
//! document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroize;

use crate::envelope;
use crate::error::MyFsError;

/// Hard cap on the number of stored files.
pub const MAX_FILES: usize = 99;

/// Descriptor for one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Unique logical name; doubles as the index key.
    pub name: String,
    /// Plaintext length in bytes.
    pub size: u64,
    /// Where the file came from; informational only.
    pub original_path: String,
    /// RFC 3339 timestamp, set once at import.
    pub creation_time: String,
    /// Whether the payload bytes in the data volume are ciphertext.
    pub is_encrypted: bool,
    /// Per-file key; present iff `is_encrypted`.
    #[serde(with = "hex_key_opt")]
    pub file_key: Option<[u8; 32]>,
    /// Byte offset of the payload in the data volume.
    pub offset: u64,
    /// Open string mapping for future extension.
    pub attributes: BTreeMap<String, String>,
}

impl FileEntry {
    /// Length of the payload as stored in the data volume: the plaintext
    /// size, plus nonce and tag overhead when encrypted.
    pub fn stored_len(&self) -> u64 {
        if self.is_encrypted {
            self.size + envelope::OVERHEAD as u64
        } else {
            self.size
        }
    }
}

impl Drop for FileEntry {
    fn drop(&mut self) {
        if let Some(ref mut key) = self.file_key {
            key.zeroize();
        }
    }
}

/// The whole index for one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Machine fingerprint captured at format time.
    pub machine_id: String,
    /// RFC 3339 timestamp of `format`.
    pub creation_date: String,
    /// Always equals `files.len()`; recomputed on load, never trusted from
    /// disk.
    pub file_count: u32,
    /// Logical name to descriptor.
    pub files: BTreeMap<String, FileEntry>,
    /// Container-wide key, generated once at format time. Reserved for
    /// container-level encryption; payloads currently use per-file keys.
    #[serde(with = "hex_key")]
    pub master_key: [u8; 32],
}

impl Drop for MetadataDocument {
    fn drop(&mut self) {
        self.master_key.zeroize();
    }
}

impl MetadataDocument {
    /// Build an empty index for a freshly formatted container.
    pub fn new(machine_id: String, creation_date: String, master_key: [u8; 32]) -> Self {
        Self {
            machine_id,
            creation_date,
            file_count: 0,
            files: BTreeMap::new(),
            master_key,
        }
    }

    /// Serialize to plain bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MyFsError> {
        serde_json::to_vec(self).map_err(|e| MyFsError::corrupt(format!("serialize: {}", e)))
    }

    /// Deserialize from plain bytes, recomputing `file_count` and checking
    /// per-entry invariants.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MyFsError> {
        let mut doc: MetadataDocument = serde_json::from_slice(bytes)
            .map_err(|e| MyFsError::corrupt(format!("deserialize: {}", e)))?;

        for (name, entry) in &doc.files {
            if entry.name != *name {
                return Err(MyFsError::corrupt(format!(
                    "index key '{}' does not match entry name '{}'",
                    name, entry.name
                )));
            }
            if entry.is_encrypted != entry.file_key.is_some() {
                return Err(MyFsError::corrupt(format!(
                    "entry '{}': file_key must be present iff encrypted",
                    name
                )));
            }
        }

        // Never trust the stored count
        doc.file_count = doc.files.len() as u32;
        Ok(doc)
    }
}

mod hex_key {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(&text).map_err(de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| de::Error::custom("key must be exactly 32 bytes"))
    }
}

mod hex_key_opt {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &Option<[u8; 32]>, s: S) -> Result<S::Ok, S::Error> {
        match key {
            Some(k) => s.serialize_some(&hex::encode(k)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[u8; 32]>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| {
            let bytes = hex::decode(&t).map_err(de::Error::custom)?;
            bytes
                .try_into()
                .map_err(|_| de::Error::custom("key must be exactly 32 bytes"))
        })
        .transpose()
    }
}
