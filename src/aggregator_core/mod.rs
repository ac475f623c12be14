//! Aggregator Core - population statistics over the profile store
//!
//! # Architecture
//!
//! ```text
//! ProfileStore::load() snapshot (+ department overlay)
//!     ↓
//! StatisticsAggregator (coverage, averages, completeness, tallies)
//!     ├─ ScoreBand / BandCounts (distribution)
//!     ├─ ProfileRanker (top-N by data richness)
//!     └─ ScoreCorrelator (pairwise Pearson)
//!     ↓
//! PopulationStats → HTTP response or StatsSnapshot file
//! ```

pub mod correlator;
pub mod scorer;
pub mod statistics;
pub mod writer;

pub use correlator::{ScoreCorrelation, ScoreCorrelator};
pub use scorer::{BandCounts, ProfileRanker, RankedProfile, ScoreBand};
pub use statistics::{PopulationStats, StatisticsAggregator, PRIMARY_SCORE_TYPES};
pub use writer::{load_snapshot, write_snapshot, StatsSnapshot};
