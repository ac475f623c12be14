//! State merge engine
//!
//! Applies a `ClassifiedEvent` to the in-memory profile map. Pure with respect
//! to I/O: the caller owns locking and persistence (see `ProfileStore::update`).
//!
//! ## Merge rules
//!
//! | Event | Required fields | Effect |
//! |---|---|---|
//! | ScoreCreated | `type`, `score`/`value` | replace `scores[type]` |
//! | ArchetypeCreated | `name`, `value` | replace `archetypes[name]` |
//! | BiomarkerCreated | `category`, `type`, `value` | replace `biomarkers[category_type]` |
//! | DataLogReceived | `logs`/`data` list | append to `dataLogs` |
//! | BatchProfileUpdate | per-profile id | shallow merge each profile |
//! | SingleProfileUpsert | id | shallow merge |
//!
//! A missing required field skips that field only and yields a `FieldWarning`.
//! `lastUpdated` is refreshed on every touched record regardless.

use super::classifier::{id_field, ClassifiedEvent, IntegrationKind};
use super::types::{ArchetypeEntry, BiomarkerEntry, ProfileMap, ProfileRecord, ScoreEntry};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A required field was absent, so one part of the update was skipped
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWarning {
    pub profile_id: String,
    pub event: &'static str,
    pub field: String,
    pub reason: String,
}

impl std::fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} for {}: field '{}' skipped ({})",
            self.event, self.profile_id, self.field, self.reason
        )
    }
}

/// Result of merging one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub profiles_processed: usize,
    /// Store keys of every record that was created or modified
    pub touched: Vec<String>,
    pub warnings: Vec<FieldWarning>,
}

/// Missing-field detail before it is attributed to a profile/event
#[derive(Debug, Clone, PartialEq)]
struct FieldGap {
    field: String,
    reason: &'static str,
}

impl FieldGap {
    fn missing(field: &str) -> Self {
        Self {
            field: field.to_string(),
            reason: "missing or invalid",
        }
    }
}

/// Convert a raw score to the canonical 0-1 scale.
///
/// Values in (1, 100] are treated as percentages. This is the only place
/// scores are rescaled.
pub fn normalize_score(value: f64) -> f64 {
    if value > 1.0 && value <= 100.0 {
        value / 100.0
    } else {
        value
    }
}

/// Find the store key for `candidates`, honouring the externalId/profileId
/// alias. Falls back to the first candidate for a new record.
pub fn resolve_record_key(profiles: &ProfileMap, candidates: &[&str]) -> Option<String> {
    for id in candidates {
        if profiles.contains_key(*id) {
            return Some(id.to_string());
        }
    }
    for id in candidates {
        if let Some((key, _)) = profiles.iter().find(|(_, record)| record.answers_to(id)) {
            return Some(key.clone());
        }
    }
    candidates.first().map(|id| id.to_string())
}

/// Apply one classified event to the profile map
pub fn apply_event(profiles: &mut ProfileMap, event: &ClassifiedEvent, now: DateTime<Utc>) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let event_name = event.event_name();

    match event {
        ClassifiedEvent::Integration {
            kind,
            profile_id,
            payload,
        } => {
            let empty = Map::new();
            let object = payload.as_object().unwrap_or(&empty);
            let key = locate_or_create(profiles, profile_id, object);

            if let Some(record) = profiles.get_mut(&key) {
                stamp_identity(record, profile_id, object);
                if let Err(gap) = merge_integration(record, *kind, object, now) {
                    outcome.warnings.push(attribute(gap, &key, event_name));
                }
                record.last_updated = Some(now);
            }
            outcome.profiles_processed = 1;
            outcome.touched.push(key);
        }
        ClassifiedEvent::SingleProfileUpsert { profile_id, fields } => {
            let key = locate_or_create(profiles, profile_id, fields);
            if let Some(record) = profiles.get_mut(&key) {
                stamp_identity(record, profile_id, fields);
                let trust_ids = !payload_aliases(profile_id, fields).is_empty();
                for gap in shallow_merge(record, fields, trust_ids, now) {
                    outcome.warnings.push(attribute(gap, &key, event_name));
                }
                record.last_updated = Some(now);
            }
            outcome.profiles_processed = 1;
            outcome.touched.push(key);
        }
        ClassifiedEvent::BatchProfileUpdate { profiles: batch } => {
            for (index, item) in batch.iter().enumerate() {
                let fields = match item.as_object() {
                    Some(fields) => fields,
                    None => {
                        outcome.warnings.push(FieldWarning {
                            profile_id: format!("#{}", index),
                            event: event_name,
                            field: "profile".to_string(),
                            reason: "batch entry is not an object".to_string(),
                        });
                        continue;
                    }
                };

                let profile_id = match id_field(fields, "externalId").or_else(|| id_field(fields, "profileId")) {
                    Some(id) => id,
                    None => {
                        outcome.warnings.push(FieldWarning {
                            profile_id: format!("#{}", index),
                            event: event_name,
                            field: "externalId".to_string(),
                            reason: "no identifier, profile skipped".to_string(),
                        });
                        continue;
                    }
                };

                let key = locate_or_create(profiles, &profile_id, fields);
                if let Some(record) = profiles.get_mut(&key) {
                    stamp_identity(record, &profile_id, fields);
                    for gap in shallow_merge(record, fields, true, now) {
                        outcome.warnings.push(attribute(gap, &key, event_name));
                    }
                    record.last_updated = Some(now);
                }
                outcome.profiles_processed += 1;
                if !outcome.touched.contains(&key) {
                    outcome.touched.push(key);
                }
            }
        }
        ClassifiedEvent::Unrecognized => {}
    }

    for warning in &outcome.warnings {
        log::warn!("⚠️  {}", warning);
    }

    outcome
}

fn attribute(gap: FieldGap, profile_id: &str, event: &'static str) -> FieldWarning {
    FieldWarning {
        profile_id: profile_id.to_string(),
        event,
        field: gap.field,
        reason: gap.reason.to_string(),
    }
}

/// Payload `externalId`/`profileId` values, but only when one of them is the
/// resolved id. An id taken from the `X-External-Id` header names the target
/// on its own; body aliases for some other profile are ignored.
fn payload_aliases(profile_id: &str, object: &Map<String, Value>) -> Vec<String> {
    let aliases: Vec<String> = [id_field(object, "externalId"), id_field(object, "profileId")]
        .into_iter()
        .flatten()
        .collect();
    if aliases.iter().any(|alias| alias == profile_id) {
        aliases
    } else {
        Vec::new()
    }
}

/// Resolve the record key (lazily creating an empty record) for an event
fn locate_or_create(profiles: &mut ProfileMap, profile_id: &str, object: &Map<String, Value>) -> String {
    let aliases = payload_aliases(profile_id, object);

    let mut candidates: Vec<&str> = vec![profile_id];
    for alias in &aliases {
        if !candidates.contains(&alias.as_str()) {
            candidates.push(alias);
        }
    }

    let key = resolve_record_key(profiles, &candidates).unwrap_or_else(|| profile_id.to_string());
    profiles.entry(key.clone()).or_insert_with(|| {
        log::info!("🆕 Creating profile record: {}", key);
        ProfileRecord::default()
    });
    key
}

/// Fill identity fields without overwriting known aliases. A new record's
/// `externalId` is always the resolved identifier.
fn stamp_identity(record: &mut ProfileRecord, profile_id: &str, object: &Map<String, Value>) {
    if record.external_id.is_none() {
        record.external_id = Some(profile_id.to_string());
    }
    if record.profile_id.is_none() {
        let internal = if payload_aliases(profile_id, object).is_empty() {
            None
        } else {
            id_field(object, "profileId")
        };
        record.profile_id = Some(internal.unwrap_or_else(|| profile_id.to_string()));
    }
    if let Some(account_id) = id_field(object, "accountId") {
        record.account_id = Some(account_id);
    }
}

fn merge_integration(
    record: &mut ProfileRecord,
    kind: IntegrationKind,
    object: &Map<String, Value>,
    now: DateTime<Utc>,
) -> Result<(), FieldGap> {
    match kind {
        IntegrationKind::ScoreCreated => {
            let score_type = string_field(object, "type")
                .or_else(|| string_field(object, "scoreType"))
                .ok_or_else(|| FieldGap::missing("type"))?;
            let entry = score_entry(object, now)?;
            record.scores.insert(score_type, entry);
        }
        IntegrationKind::ArchetypeCreated => {
            let name = string_field(object, "name").ok_or_else(|| FieldGap::missing("name"))?;
            let entry = archetype_entry(object, now)?;
            record.archetypes.insert(name, entry);
        }
        IntegrationKind::BiomarkerCreated => {
            let entry = biomarker_entry(object, now)?;
            let key = BiomarkerEntry::composite_key(&entry.category, &entry.biomarker_type);
            record.biomarkers.insert(key, entry);
        }
        IntegrationKind::DataLogReceived => {
            let logs = match object.get("logs").or_else(|| object.get("data")) {
                Some(Value::Array(logs)) => logs,
                _ => return Err(FieldGap::missing("logs")),
            };
            // No dedup: redelivery appends again
            record.data_logs.extend(logs.iter().cloned());
        }
    }
    Ok(())
}

/// Field-level overwrite of `fields` onto `record`.
///
/// Typed maps are replaced wholesale; `dataLogs` is appended (never replaced);
/// `department` and `lastUpdated` are owned elsewhere and ignored.
fn shallow_merge(
    record: &mut ProfileRecord,
    fields: &Map<String, Value>,
    trust_ids: bool,
    now: DateTime<Utc>,
) -> Vec<FieldGap> {
    let mut gaps = Vec::new();

    for (field, value) in fields {
        match field.as_str() {
            "externalId" | "profileId" if !trust_ids => {
                log::debug!("Ignoring payload {} that differs from the X-External-Id target", field);
            }
            "externalId" => record.external_id = id_field(fields, field).or(record.external_id.take()),
            "profileId" => record.profile_id = id_field(fields, field).or(record.profile_id.take()),
            "accountId" => record.account_id = id_field(fields, field).or(record.account_id.take()),
            "scores" => match value.as_object() {
                Some(map) => {
                    let mut scores = BTreeMap::new();
                    for (score_type, entry) in map {
                        match entry.as_object().map(|entry| score_entry(entry, now)) {
                            Some(Ok(score)) => {
                                scores.insert(score_type.clone(), score);
                            }
                            _ => gaps.push(FieldGap::missing(&format!("scores.{}", score_type))),
                        }
                    }
                    record.scores = scores;
                }
                None => gaps.push(FieldGap::missing("scores")),
            },
            "archetypes" => match value.as_object() {
                Some(map) => {
                    let mut archetypes = BTreeMap::new();
                    for (name, entry) in map {
                        match entry.as_object().map(|entry| archetype_entry(entry, now)) {
                            Some(Ok(archetype)) => {
                                archetypes.insert(name.clone(), archetype);
                            }
                            _ => gaps.push(FieldGap::missing(&format!("archetypes.{}", name))),
                        }
                    }
                    record.archetypes = archetypes;
                }
                None => gaps.push(FieldGap::missing("archetypes")),
            },
            "biomarkers" => match value.as_object() {
                Some(map) => {
                    let mut biomarkers = BTreeMap::new();
                    for (key, entry) in map {
                        match entry.as_object().map(|entry| biomarker_entry(entry, now)) {
                            Some(Ok(biomarker)) => {
                                biomarkers.insert(key.clone(), biomarker);
                            }
                            _ => gaps.push(FieldGap::missing(&format!("biomarkers.{}", key))),
                        }
                    }
                    record.biomarkers = biomarkers;
                }
                None => gaps.push(FieldGap::missing("biomarkers")),
            },
            "dataLogs" => match value {
                Value::Array(logs) => record.data_logs.extend(logs.iter().cloned()),
                _ => gaps.push(FieldGap::missing("dataLogs")),
            },
            "department" => {
                log::debug!("Ignoring department in ingestion payload (managed externally)");
            }
            "lastUpdated" => {}
            _ => {
                record.extra.insert(field.clone(), value.clone());
            }
        }
    }

    gaps
}

fn score_entry(object: &Map<String, Value>, now: DateTime<Utc>) -> Result<ScoreEntry, FieldGap> {
    let raw = number_field(object, "score")
        .or_else(|| number_field(object, "value"))
        .ok_or_else(|| FieldGap::missing("score"))?;
    let value = normalize_score(raw);
    if !(0.0..=1.0).contains(&value) {
        log::warn!("Score {} outside expected 0-1 range after normalization", raw);
    }

    let factors = match object.get("factors") {
        Some(Value::Array(factors)) => Some(factors.clone()),
        _ => None,
    };

    Ok(ScoreEntry {
        value,
        state: string_field(object, "state").unwrap_or_default(),
        factors,
        updated_at: timestamp_field(object, "updatedAt").unwrap_or(now),
    })
}

fn archetype_entry(object: &Map<String, Value>, now: DateTime<Utc>) -> Result<ArchetypeEntry, FieldGap> {
    let value = object
        .get("value")
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| FieldGap::missing("value"))?;

    Ok(ArchetypeEntry {
        value,
        data_type: string_field(object, "dataType"),
        ordinality: number_field(object, "ordinality").map(|n| n as i64),
        periodicity: string_field(object, "periodicity"),
        start_date_time: string_field(object, "startDateTime"),
        end_date_time: string_field(object, "endDateTime"),
        version: object.get("version").filter(|v| !v.is_null()).cloned(),
        updated_at: timestamp_field(object, "updatedAt").unwrap_or(now),
    })
}

fn biomarker_entry(object: &Map<String, Value>, now: DateTime<Utc>) -> Result<BiomarkerEntry, FieldGap> {
    let category = string_field(object, "category").ok_or_else(|| FieldGap::missing("category"))?;
    let biomarker_type = string_field(object, "type").ok_or_else(|| FieldGap::missing("type"))?;
    let value = object
        .get("value")
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| FieldGap::missing("value"))?;

    Ok(BiomarkerEntry {
        category,
        biomarker_type,
        value,
        unit: string_field(object, "unit"),
        periodicity: string_field(object, "periodicity"),
        aggregation: string_field(object, "aggregation"),
        updated_at: timestamp_field(object, "updatedAt").unwrap_or(now),
    })
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Numbers and numeric strings
fn number_field(object: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = match object.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

fn timestamp_field(object: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    object
        .get(key)
        .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok())
}
