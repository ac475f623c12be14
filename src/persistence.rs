//! Durable profile store
//!
//! The whole profile map is one JSON document on disk. Every save:
//! 1. copies the current primary file to the backup path (if it parses)
//! 2. writes the full map to `<primary>.tmp` and renames it over the primary
//!
//! `load` reads the primary, falls back to the backup when the primary is
//! missing or unparsable, and returns an empty map when neither exists.
//!
//! All read-modify-write cycles go through one store-wide mutex, so concurrent
//! ingestion requests cannot lose each other's updates. Plain `load` does not
//! take the lock: readers see the last fully written snapshot.

use crate::error::StoreError;
use crate::pipeline::merge;
use crate::pipeline::types::{ProfileMap, ProfileRecord};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

/// File-backed profile map guarded by a single lock
pub struct ProfileStore {
    primary_path: PathBuf,
    backup_path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProfileStore {
    pub fn new(primary_path: impl Into<PathBuf>, backup_path: impl Into<PathBuf>) -> Self {
        Self {
            primary_path: primary_path.into(),
            backup_path: backup_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary_path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Load the full map (primary -> backup -> empty)
    pub fn load(&self) -> ProfileMap {
        match read_map(&self.primary_path) {
            Ok(Some(profiles)) => return profiles,
            Ok(None) => {
                log::debug!("No profile store at {}", self.primary_path.display());
            }
            Err(e) => {
                log::warn!(
                    "⚠️  Primary profile store {} unreadable ({}), trying backup",
                    self.primary_path.display(),
                    e
                );
            }
        }

        match read_map(&self.backup_path) {
            Ok(Some(profiles)) => {
                log::info!(
                    "Recovered {} profiles from backup {}",
                    profiles.len(),
                    self.backup_path.display()
                );
                profiles
            }
            Ok(None) => ProfileMap::new(),
            Err(e) => {
                log::error!(
                    "❌ Backup profile store {} unreadable ({}), starting empty",
                    self.backup_path.display(),
                    e
                );
                ProfileMap::new()
            }
        }
    }

    /// Persist the full map, rotating the previous primary into the backup slot
    pub fn save(&self, profiles: &ProfileMap) -> Result<(), StoreError> {
        let _guard = self.lock();
        self.save_locked(profiles)
    }

    /// Run `f` against the current map inside the store-wide critical section,
    /// then persist the result. The map is saved even if `f` changed nothing.
    pub fn update<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut ProfileMap) -> R,
    {
        let _guard = self.lock();
        let mut profiles = self.load();
        let result = f(&mut profiles);
        self.save_locked(&profiles)?;
        Ok(result)
    }

    /// Shallow-merge `partial` onto the record for `id` (created if unknown)
    /// and return the merged record
    pub fn upsert(
        &self,
        id: &str,
        partial: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<ProfileRecord, StoreError> {
        let event = crate::pipeline::ClassifiedEvent::SingleProfileUpsert {
            profile_id: id.to_string(),
            fields: partial,
        };

        self.update(|profiles| {
            let outcome = merge::apply_event(profiles, &event, now);
            outcome
                .touched
                .first()
                .and_then(|key| profiles.get(key))
                .cloned()
                .unwrap_or_else(|| ProfileRecord::new(id))
        })
    }

    /// Look up one profile by either alias
    pub fn get(&self, id: &str) -> Option<ProfileRecord> {
        let profiles = self.load();
        if let Some(record) = profiles.get(id) {
            return Some(record.clone());
        }
        profiles.values().find(|record| record.answers_to(id)).cloned()
    }

    /// Replace the store with an empty map
    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock();
        log::warn!("🗑️  Clearing profile store {}", self.primary_path.display());
        self.save_locked(&ProfileMap::new())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is (); a panicked writer leaves nothing half-updated in memory
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save_locked(&self, profiles: &ProfileMap) -> Result<(), StoreError> {
        if let Some(parent) = self.primary_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        self.rotate_backup();

        let json = serde_json::to_string_pretty(profiles)?;
        let tmp_path = tmp_path_for(&self.primary_path);
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.primary_path)?;

        log::debug!("Saved {} profiles to {}", profiles.len(), self.primary_path.display());
        Ok(())
    }

    /// Copy the current primary into the backup slot, unless it is corrupt
    fn rotate_backup(&self) {
        match read_map(&self.primary_path) {
            Ok(Some(_)) => {
                if let Some(parent) = self.backup_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    if let Err(e) = fs::create_dir_all(parent) {
                        log::warn!("Failed to create backup directory {}: {}", parent.display(), e);
                        return;
                    }
                }
                if let Err(e) = fs::copy(&self.primary_path, &self.backup_path) {
                    log::warn!("Failed to rotate backup {}: {}", self.backup_path.display(), e);
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Primary store corrupt ({}), keeping existing backup", e);
            }
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Ok(None) when the file does not exist
fn read_map(path: &Path) -> Result<Option<ProfileMap>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(path)?;
    let profiles: ProfileMap = serde_json::from_str(&json)?;
    Ok(Some(profiles))
}
