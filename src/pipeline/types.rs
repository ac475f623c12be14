//! Core data structures for profile state and the audit log
//!
//! All persisted types serialize with camelCase field names so the JSON files
//! stay readable by the dashboard consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Department value for profiles nobody has assigned yet
pub const DEFAULT_DEPARTMENT: &str = "unassigned";

/// Full store contents: profile identifier -> record
pub type ProfileMap = BTreeMap<String, ProfileRecord>;

/// Accumulated wellness state for one tracked profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    /// Latest score per score type (last-write-wins)
    #[serde(default)]
    pub scores: BTreeMap<String, ScoreEntry>,

    /// Latest classification per archetype name
    #[serde(default)]
    pub archetypes: BTreeMap<String, ArchetypeEntry>,

    /// Latest reading per `category_type` key
    #[serde(default)]
    pub biomarkers: BTreeMap<String, BiomarkerEntry>,

    /// Raw log entries, append-only
    #[serde(default)]
    pub data_logs: Vec<Value>,

    #[serde(default = "default_department")]
    pub department: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Fields delivered by profile upserts that have no typed slot
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_department() -> String {
    DEFAULT_DEPARTMENT.to_string()
}

impl Default for ProfileRecord {
    fn default() -> Self {
        Self {
            profile_id: None,
            external_id: None,
            account_id: None,
            scores: BTreeMap::new(),
            archetypes: BTreeMap::new(),
            biomarkers: BTreeMap::new(),
            data_logs: Vec::new(),
            department: default_department(),
            last_updated: None,
            extra: Map::new(),
        }
    }
}

impl ProfileRecord {
    /// Empty record for a newly seen identifier
    pub fn new(id: &str) -> Self {
        Self {
            profile_id: Some(id.to_string()),
            external_id: Some(id.to_string()),
            ..Self::default()
        }
    }

    /// True if either alias matches `id`
    pub fn answers_to(&self, id: &str) -> bool {
        self.external_id.as_deref() == Some(id) || self.profile_id.as_deref() == Some(id)
    }

    /// Preferred display identifier (externalId, then profileId)
    pub fn display_id(&self) -> Option<&str> {
        self.external_id.as_deref().or(self.profile_id.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    /// Canonical 0-1 scale
    pub value: f64,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factors: Option<Vec<Value>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchetypeEntry {
    /// Categorical label, e.g. "night_owl"
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinality: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodicity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiomarkerEntry {
    pub category: String,
    #[serde(rename = "type")]
    pub biomarker_type: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodicity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BiomarkerEntry {
    /// Storage key: `category_type`
    pub fn composite_key(category: &str, biomarker_type: &str) -> String {
        format!("{}_{}", category, biomarker_type)
    }
}

/// Header fields recorded alongside each audited event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub has_signature: bool,
    #[serde(default)]
    pub signature_valid: bool,
}

/// One raw event envelope in the bounded audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub payload: Value,
    #[serde(default)]
    pub header_summary: HeaderSummary,
}
