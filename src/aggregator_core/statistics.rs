//! Population statistics over a full profile snapshot
//!
//! ## Figures
//!
//! - **coverage**: profiles with a value for a score type / total profiles
//! - **averages**: mean over profiles that have the type (missing != zero)
//! - **distribution**: band counts (`excellent`/`high`/`medium`/`low`/`minimal`)
//! - **data completeness**: populated primary score slots / (profiles x 5)
//! - **profile completeness**: complete (5) / partial (2-4) / minimal (1) / none (0)
//! - biomarker, archetype and data-log tallies with per-key coverage
//! - top-N profiles by data richness, pairwise score correlations,
//!   per-department summaries
//!
//! Scores are assumed to be on the canonical 0-1 scale (normalized at ingestion).
//! The aggregator never takes the store's write lock: it works on whatever
//! single `load()` snapshot it is handed.

use super::correlator::{ScoreCorrelation, ScoreCorrelator};
use super::scorer::{BandCounts, ProfileRanker, RankedProfile};
use crate::departments::DepartmentDirectory;
use crate::persistence::ProfileStore;
use crate::pipeline::types::{ProfileMap, ProfileRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The five primary wellness scores
pub const PRIMARY_SCORE_TYPES: [&str; 5] = ["activity", "sleep", "readiness", "wellbeing", "mental_wellbeing"];

/// Minimum paired profiles before a correlation is reported
const MIN_CORRELATION_SAMPLES: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessBuckets {
    pub complete: usize,
    pub partial: usize,
    pub minimal: usize,
    pub none: usize,
}

/// Counts for a keyed per-profile map (biomarkers, archetypes)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyedTally {
    pub total_entries: usize,
    pub profiles_with_any: usize,
    pub coverage: f64,
    /// Profiles carrying each key
    pub per_key: BTreeMap<String, usize>,
    /// `per_key` divided by total profiles
    pub per_key_coverage: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchetypeTally {
    #[serde(flatten)]
    pub tally: KeyedTally,
    /// archetype name -> label -> profiles
    pub value_distribution: BTreeMap<String, BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLogTally {
    pub total_entries: usize,
    pub profiles_with_any: usize,
    pub coverage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentSummary {
    pub profiles: usize,
    pub score_averages: BTreeMap<String, Option<f64>>,
}

/// Everything the dashboard consumers read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationStats {
    pub total_profiles: usize,
    pub score_coverage: BTreeMap<String, f64>,
    pub score_averages: BTreeMap<String, Option<f64>>,
    pub score_distribution: BTreeMap<String, BandCounts>,
    pub data_completeness: f64,
    pub profile_completeness: CompletenessBuckets,
    pub biomarkers: KeyedTally,
    pub archetypes: ArchetypeTally,
    pub data_logs: DataLogTally,
    pub top_profiles: Vec<RankedProfile>,
    pub correlations: Vec<ScoreCorrelation>,
    pub departments: BTreeMap<String, DepartmentSummary>,
}

pub struct StatisticsAggregator {
    top_n: usize,
    ranker: ProfileRanker,
    correlator: ScoreCorrelator,
}

impl StatisticsAggregator {
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            ranker: ProfileRanker::default(),
            correlator: ScoreCorrelator::new(MIN_CORRELATION_SAMPLES),
        }
    }

    /// Load one snapshot from `store`, overlay departments, and compute
    pub fn compute_from_store(&self, store: &ProfileStore, departments: &DepartmentDirectory) -> PopulationStats {
        let mut profiles = store.load();
        departments.apply(&mut profiles);
        self.compute(&profiles)
    }

    pub fn compute(&self, profiles: &ProfileMap) -> PopulationStats {
        let total = profiles.len();
        let mut stats = PopulationStats {
            total_profiles: total,
            ..PopulationStats::default()
        };

        let mut populated_slots = 0usize;
        for score_type in PRIMARY_SCORE_TYPES {
            let values = score_values(profiles.values(), score_type);
            populated_slots += values.len();

            let mut bands = BandCounts::default();
            for value in &values {
                bands.record(*value);
            }

            stats.score_coverage.insert(score_type.to_string(), ratio(values.len(), total));
            stats.score_averages.insert(score_type.to_string(), mean(&values));
            stats.score_distribution.insert(score_type.to_string(), bands);
        }
        stats.data_completeness = ratio(populated_slots, total * PRIMARY_SCORE_TYPES.len());

        for record in profiles.values() {
            match primary_score_count(record) {
                n if n == PRIMARY_SCORE_TYPES.len() => stats.profile_completeness.complete += 1,
                0 => stats.profile_completeness.none += 1,
                1 => stats.profile_completeness.minimal += 1,
                _ => stats.profile_completeness.partial += 1,
            }
        }

        stats.biomarkers = keyed_tally(profiles, total, |record| record.biomarkers.keys().cloned().collect());
        stats.archetypes = archetype_tally(profiles, total);
        stats.data_logs = DataLogTally {
            total_entries: profiles.values().map(|r| r.data_logs.len()).sum(),
            profiles_with_any: profiles.values().filter(|r| !r.data_logs.is_empty()).count(),
            coverage: ratio(profiles.values().filter(|r| !r.data_logs.is_empty()).count(), total),
        };

        stats.top_profiles = self.ranker.top_n(profiles, self.top_n);
        stats.correlations = self.correlator.correlate(profiles, &PRIMARY_SCORE_TYPES);
        stats.departments = department_summaries(profiles);

        stats
    }
}

/// Finite values of `score_type` across `records`
fn score_values<'a>(records: impl Iterator<Item = &'a ProfileRecord>, score_type: &str) -> Vec<f64> {
    records
        .filter_map(|record| record.scores.get(score_type))
        .map(|entry| entry.value)
        .filter(|value| value.is_finite())
        .collect()
}

fn primary_score_count(record: &ProfileRecord) -> usize {
    PRIMARY_SCORE_TYPES
        .iter()
        .filter(|t| record.scores.get(**t).map_or(false, |s| s.value.is_finite()))
        .count()
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn keyed_tally(profiles: &ProfileMap, total: usize, keys: impl Fn(&ProfileRecord) -> Vec<String>) -> KeyedTally {
    let mut tally = KeyedTally::default();
    for record in profiles.values() {
        let record_keys = keys(record);
        if !record_keys.is_empty() {
            tally.profiles_with_any += 1;
        }
        tally.total_entries += record_keys.len();
        for key in record_keys {
            *tally.per_key.entry(key).or_insert(0) += 1;
        }
    }
    tally.coverage = ratio(tally.profiles_with_any, total);
    tally.per_key_coverage = tally
        .per_key
        .iter()
        .map(|(key, count)| (key.clone(), ratio(*count, total)))
        .collect();
    tally
}

fn archetype_tally(profiles: &ProfileMap, total: usize) -> ArchetypeTally {
    let mut value_distribution: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for record in profiles.values() {
        for (name, archetype) in &record.archetypes {
            let label = match &archetype.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            *value_distribution
                .entry(name.clone())
                .or_default()
                .entry(label)
                .or_insert(0) += 1;
        }
    }

    ArchetypeTally {
        tally: keyed_tally(profiles, total, |record| record.archetypes.keys().cloned().collect()),
        value_distribution,
    }
}

fn department_summaries(profiles: &ProfileMap) -> BTreeMap<String, DepartmentSummary> {
    let mut grouped: BTreeMap<String, Vec<&ProfileRecord>> = BTreeMap::new();
    for record in profiles.values() {
        grouped.entry(record.department.clone()).or_default().push(record);
    }

    grouped
        .into_iter()
        .map(|(department, records)| {
            let score_averages = PRIMARY_SCORE_TYPES
                .iter()
                .map(|t| (t.to_string(), mean(&score_values(records.iter().copied(), t))))
                .collect();
            (
                department,
                DepartmentSummary {
                    profiles: records.len(),
                    score_averages,
                },
            )
        })
        .collect()
}
