//! Statistics snapshot file
//!
//! Dashboards poll a JSON file rather than recomputing on every read. Each write
//! goes to its own temp file in the target directory and is renamed over the
//! target, so a reader never sees a half-written snapshot and concurrent writers
//! never share a temp path.

use super::statistics::PopulationStats;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub stats: PopulationStats,
}

/// Write `stats` stamped with `now` to `path`
pub fn write_snapshot(path: &Path, stats: &PopulationStats, now: DateTime<Utc>) -> Result<(), StoreError> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let snapshot = StatsSnapshot {
        generated_at: now,
        stats: stats.clone(),
    };
    let json = serde_json::to_string_pretty(&snapshot)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;

    log::info!(
        "📝 Wrote statistics snapshot ({} profiles) to {}",
        stats.total_profiles,
        path.display()
    );
    Ok(())
}

/// Ok(None) when no snapshot has been written yet
pub fn load_snapshot(path: &Path) -> Result<Option<StatsSnapshot>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&json)?))
}
