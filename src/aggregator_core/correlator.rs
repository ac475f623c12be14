//! Pairwise score correlation across the profile population

use crate::pipeline::types::ProfileMap;
use serde::{Deserialize, Serialize};

/// Pearson correlation between two score types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCorrelation {
    pub score_a: String,
    pub score_b: String,
    pub coefficient: f64,
    /// Profiles that carry both scores
    pub samples: usize,
}

pub struct ScoreCorrelator {
    min_samples: usize,
}

impl ScoreCorrelator {
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples: min_samples.max(2),
        }
    }

    /// Correlate every unordered pair of `score_types`.
    ///
    /// Only profiles with finite values for both types contribute. Pairs with
    /// fewer than `min_samples` profiles or zero variance are omitted.
    pub fn correlate(&self, profiles: &ProfileMap, score_types: &[&str]) -> Vec<ScoreCorrelation> {
        let mut correlations = Vec::new();

        for (i, a) in score_types.iter().enumerate() {
            for b in &score_types[i + 1..] {
                let (xs, ys): (Vec<f64>, Vec<f64>) = profiles
                    .values()
                    .filter_map(|record| {
                        let x = record.scores.get(*a)?.value;
                        let y = record.scores.get(*b)?.value;
                        (x.is_finite() && y.is_finite()).then_some((x, y))
                    })
                    .unzip();

                if xs.len() < self.min_samples {
                    continue;
                }

                if let Some(coefficient) = pearson(&xs, &ys) {
                    correlations.push(ScoreCorrelation {
                        score_a: a.to_string(),
                        score_b: b.to_string(),
                        coefficient,
                        samples: xs.len(),
                    });
                }
            }
        }

        correlations
    }
}

/// Pearson coefficient; None for mismatched/empty input or zero variance
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.is_empty() {
        return None;
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    Some((covariance / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}
