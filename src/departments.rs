//! Read-only view of externally managed department assignments
//!
//! The profile-management UI owns `departments.json` (profile id -> department).
//! Ingestion never writes it; the read API and statistics overlay it onto
//! profile records.

use crate::pipeline::types::{ProfileMap, ProfileRecord};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone)]
pub struct DepartmentDirectory {
    path: PathBuf,
}

impl DepartmentDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current assignments; empty when the file is absent or unreadable
    pub fn load(&self) -> HashMap<String, String> {
        if !self.path.exists() {
            return HashMap::new();
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str::<HashMap<String, String>>(&json).map_err(|e| e.to_string()));

        match parsed {
            Ok(assignments) => assignments,
            Err(e) => {
                log::warn!("⚠️  Department file {} unreadable: {}", self.path.display(), e);
                HashMap::new()
            }
        }
    }

    /// Overlay assignments onto a snapshot, keyed by store key or either alias
    pub fn apply(&self, profiles: &mut ProfileMap) {
        let assignments = self.load();
        if assignments.is_empty() {
            return;
        }
        for (key, record) in profiles.iter_mut() {
            if let Some(department) = lookup(&assignments, key, record) {
                record.department = department.clone();
            }
        }
    }

    /// Overlay the assignment for a single record stored under `key`
    pub fn apply_record(&self, key: &str, record: &mut ProfileRecord) {
        let assignments = self.load();
        if let Some(department) = lookup(&assignments, key, record) {
            record.department = department.clone();
        }
    }

    /// Snapshot as a list with departments applied
    pub fn merged_profiles(&self, mut profiles: ProfileMap) -> Vec<ProfileRecord> {
        self.apply(&mut profiles);
        profiles.into_values().collect()
    }
}

fn lookup<'a>(assignments: &'a HashMap<String, String>, key: &str, record: &ProfileRecord) -> Option<&'a String> {
    assignments
        .get(key)
        .or_else(|| record.external_id.as_ref().and_then(|id| assignments.get(id)))
        .or_else(|| record.profile_id.as_ref().and_then(|id| assignments.get(id)))
}
