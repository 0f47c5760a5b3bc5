// ChapterSleuth - app/index.rs
//
// Processed-file index: a JSON map from content hash to processing record,
// persisted in the platform data directory. Re-runs consult it to skip
// inputs that were already segmented, keyed by content rather than path so
// renamed files are still recognised.

use crate::platform::fs::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// SHA-256 content hash, lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// One processed input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub source_path: PathBuf,
    pub chapter_count: usize,
    pub output_path: Option<PathBuf>,
    pub processed_at: DateTime<Utc>,
}

/// The on-disk index.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProcessedIndex {
    entries: HashMap<String, IndexEntry>,
}

impl ProcessedIndex {
    /// Load from `path`. A missing file is an empty index; a corrupt file
    /// is logged and replaced by an empty index rather than aborting the
    /// batch.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(index) => index,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Corrupt index; starting fresh");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read index; starting fresh");
                Self::default()
            }
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&IndexEntry> {
        self.entries.get(hash)
    }

    pub fn insert(&mut self, hash: String, entry: IndexEntry) {
        self.entries.insert(hash, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist atomically (temp sibling + rename).
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
    }
}
