//! Bounded webhook history log
//!
//! Keeps the most recent raw event envelopes for audit/replay. Newest entry is
//! at the head; once capacity is reached the oldest entry is evicted (FIFO).
//! The in-memory buffer is mirrored to a JSON array file after each append.
//!
//! Append failures are the caller's to log: a history write never fails an
//! ingestion request.

use crate::error::StoreError;
use crate::pipeline::types::HistoryEntry;
use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

/// Entries retained on disk
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Entries returned by the read endpoint
pub const HISTORY_READ_LIMIT: usize = 100;

pub struct HistoryLog {
    path: PathBuf,
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl HistoryLog {
    /// Open the log, loading any entries already on disk
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let capacity = capacity.max(1);

        let mut entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("⚠️  History file {} unreadable ({}), starting empty", path.display(), e);
                VecDeque::new()
            }
        };
        entries.truncate(capacity);

        log::info!("Loaded {} history entries from {}", entries.len(), path.display());

        Self {
            path,
            capacity,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert at the head, evicting from the tail past capacity, then persist
    pub fn append(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut entries = self.lock();
        entries.push_front(entry);
        while entries.len() > self.capacity {
            entries.pop_back();
        }
        write_entries(&self.path, &entries)
    }

    /// Up to `limit` entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.lock().iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry and truncate the file
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.lock();
        entries.clear();
        write_entries(&self.path, &entries)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_entries(path: &Path) -> Result<VecDeque<HistoryEntry>, StoreError> {
    if !path.exists() {
        return Ok(VecDeque::new());
    }
    let json = fs::read_to_string(path)?;
    let entries: VecDeque<HistoryEntry> = serde_json::from_str(&json)?;
    Ok(entries)
}

fn write_entries(path: &Path, entries: &VecDeque<HistoryEntry>) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(entries)?;
    fs::write(path, json)?;
    Ok(())
}
