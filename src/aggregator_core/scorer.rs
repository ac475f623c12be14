//! Score banding and profile ranking

use crate::pipeline::types::ProfileMap;
use serde::{Deserialize, Serialize};

/// Distribution bands over the canonical 0-1 score scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreBand {
    Excellent,
    High,
    Medium,
    Low,
    Minimal,
}

impl ScoreBand {
    /// `excellent >=0.8`, `high >=0.6`, `medium >=0.4`, `low >=0.2`, else `minimal`
    pub fn from_value(value: f64) -> Self {
        if value >= 0.8 {
            ScoreBand::Excellent
        } else if value >= 0.6 {
            ScoreBand::High
        } else if value >= 0.4 {
            ScoreBand::Medium
        } else if value >= 0.2 {
            ScoreBand::Low
        } else {
            ScoreBand::Minimal
        }
    }
}

/// Per-band profile counts for one score type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandCounts {
    pub excellent: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub minimal: usize,
}

impl BandCounts {
    pub fn record(&mut self, value: f64) {
        match ScoreBand::from_value(value) {
            ScoreBand::Excellent => self.excellent += 1,
            ScoreBand::High => self.high += 1,
            ScoreBand::Medium => self.medium += 1,
            ScoreBand::Low => self.low += 1,
            ScoreBand::Minimal => self.minimal += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.excellent + self.high + self.medium + self.low + self.minimal
    }
}

/// Entry in the top-N data-richness ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedProfile {
    pub profile_id: String,
    pub department: String,
    pub score_count: usize,
    pub biomarker_count: usize,
    pub rank_score: f64,
}

/// Ranks profiles by `score_count * score_weight + biomarker_count * biomarker_weight`
pub struct ProfileRanker {
    score_weight: f64,
    biomarker_weight: f64,
}

impl Default for ProfileRanker {
    fn default() -> Self {
        Self {
            score_weight: 2.0,
            biomarker_weight: 1.0,
        }
    }
}

impl ProfileRanker {
    /// Highest ranked `n` profiles; ties broken by profile id for stable output
    pub fn top_n(&self, profiles: &ProfileMap, n: usize) -> Vec<RankedProfile> {
        let mut ranked: Vec<RankedProfile> = profiles
            .iter()
            .map(|(key, record)| {
                let score_count = record.scores.values().filter(|s| s.value.is_finite()).count();
                let biomarker_count = record.biomarkers.len();
                RankedProfile {
                    profile_id: record.display_id().unwrap_or(key.as_str()).to_string(),
                    department: record.department.clone(),
                    score_count,
                    biomarker_count,
                    rank_score: score_count as f64 * self.score_weight
                        + biomarker_count as f64 * self.biomarker_weight,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.rank_score
                .total_cmp(&a.rank_score)
                .then_with(|| a.profile_id.cmp(&b.profile_id))
        });
        ranked.truncate(n);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{BiomarkerEntry, ProfileRecord, ScoreEntry};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(ScoreBand::from_value(0.8), ScoreBand::Excellent);
        assert_eq!(ScoreBand::from_value(0.79), ScoreBand::High);
        assert_eq!(ScoreBand::from_value(0.6), ScoreBand::High);
        assert_eq!(ScoreBand::from_value(0.4), ScoreBand::Medium);
        assert_eq!(ScoreBand::from_value(0.2), ScoreBand::Low);
        assert_eq!(ScoreBand::from_value(0.19), ScoreBand::Minimal);
        assert_eq!(ScoreBand::from_value(0.0), ScoreBand::Minimal);
    }

    #[test]
    fn test_band_counts() {
        let mut counts = BandCounts::default();
        for v in [0.95, 0.85, 0.5, 0.1] {
            counts.record(v);
        }
        assert_eq!(counts.excellent, 2);
        assert_eq!(counts.medium, 1);
        assert_eq!(counts.minimal, 1);
        assert_eq!(counts.total(), 4);
    }

    fn record(id: &str, scores: usize, biomarkers: usize) -> ProfileRecord {
        let mut record = ProfileRecord::new(id);
        for i in 0..scores {
            record.scores.insert(
                format!("s{}", i),
                ScoreEntry {
                    value: 0.5,
                    state: String::new(),
                    factors: None,
                    updated_at: Utc::now(),
                },
            );
        }
        for i in 0..biomarkers {
            record.biomarkers.insert(
                format!("b_{}", i),
                BiomarkerEntry {
                    category: "b".to_string(),
                    biomarker_type: i.to_string(),
                    value: json!(1),
                    unit: None,
                    periodicity: None,
                    aggregation: None,
                    updated_at: Utc::now(),
                },
            );
        }
        record
    }

    #[test]
    fn test_top_n_weighting() {
        let mut profiles = ProfileMap::new();
        profiles.insert("a".into(), record("a", 1, 0)); // 2
        profiles.insert("b".into(), record("b", 0, 3)); // 3
        profiles.insert("c".into(), record("c", 2, 1)); // 5
        profiles.insert("d".into(), record("d", 1, 1)); // 3

        let top = ProfileRanker::default().top_n(&profiles, 3);
        let ids: Vec<&str> = top.iter().map(|p| p.profile_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "d"]);
        assert_eq!(top[0].rank_score, 5.0);
    }
}
