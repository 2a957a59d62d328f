//! Content-addressed store of solved fingerprints.
//!
//! Entries are write-once: a repeated write with the same plaintext is a no-op
//! and a write with a different plaintext is rejected, leaving the original
//! entry authoritative. Concurrent access goes through `DashMap`, so reads never
//! wait on writers for other fingerprints.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub plaintext: String,
    pub solved_at: DateTime<Utc>,
    pub solved_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Unchanged,
}

#[derive(Debug, Default)]
pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        self.entries.get(fingerprint).map(|e| e.value().clone())
    }

    pub fn plaintext(&self, fingerprint: &str) -> Option<String> {
        self.entries
            .get(fingerprint)
            .map(|e| e.value().plaintext.clone())
    }

    /// Record a solved fingerprint.
    pub fn put(&self, fingerprint: &str, plaintext: &str, solved_by: &str) -> Result<PutOutcome> {
        match self.entries.entry(fingerprint.to_string()) {
            Entry::Occupied(existing) => {
                if existing.get().plaintext == plaintext {
                    Ok(PutOutcome::Unchanged)
                } else {
                    Err(CoordinatorError::CacheConflict(fingerprint.to_string()))
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry {
                    plaintext: plaintext.to_string(),
                    solved_at: Utc::now(),
                    solved_by: solved_by.to_string(),
                });
                tracing::info!(fingerprint, solved_by, "Cached solved fingerprint");
                Ok(PutOutcome::Inserted)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load entries from a JSON file written by [`ResultCache::save`].
    /// A missing file yields an empty cache.
    pub fn load(path: &Path) -> Result<Self> {
        let cache = Self::new();
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(cache),
            Err(e) => {
                return Err(CoordinatorError::Persistence(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let stored: BTreeMap<String, CacheEntry> = serde_json::from_slice(&data)
            .map_err(|e| CoordinatorError::Persistence(format!("parsing {}: {}", path.display(), e)))?;
        for (fingerprint, entry) in stored {
            cache.entries.insert(fingerprint, entry);
        }
        tracing::info!(path = %path.display(), entries = cache.len(), "Loaded result cache");
        Ok(cache)
    }

    /// Write all entries to `path` as a JSON object keyed by fingerprint.
    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot: BTreeMap<String, CacheEntry> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| CoordinatorError::Persistence(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| {
            CoordinatorError::Persistence(format!("writing {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), entries = snapshot.len(), "Saved result cache");
        Ok(())
    }
}
