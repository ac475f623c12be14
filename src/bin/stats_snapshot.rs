//! Stats Snapshot - one-shot population statistics export
//!
//! Loads the profile store once, overlays department assignments, and writes
//! `StatsSnapshot { generatedAt, stats }` to the configured stats file.
//!
//! Usage:
//!   cargo run --release --bin stats_snapshot
//!
//! Environment variables:
//!   WELLFLOW_DATA_DIR - directory for all state files (default: data)
//!   WELLFLOW_STATS_FILE - snapshot output path (default: <data>/stats_snapshot.json)
//!   WELLFLOW_TOP_N - profiles listed in the ranking (default: 10)

use chrono::Utc;
use dotenv::dotenv;
use log::info;
use wellflow::aggregator_core::{write_snapshot, StatisticsAggregator};
use wellflow::config::WebhookConfig;
use wellflow::departments::DepartmentDirectory;
use wellflow::persistence::ProfileStore;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = WebhookConfig::from_env();

    info!("📊 Computing population statistics");
    info!("   ├─ Store: {}", config.store_path.display());
    info!("   ├─ Departments: {}", config.departments_path.display());
    info!("   └─ Output: {}", config.stats_path.display());

    let store = ProfileStore::new(&config.store_path, &config.backup_path);
    let departments = DepartmentDirectory::new(&config.departments_path);
    let stats = StatisticsAggregator::new(config.top_n).compute_from_store(&store, &departments);

    info!("✅ {} profiles aggregated", stats.total_profiles);
    info!("   ├─ Data completeness: {:.1}%", stats.data_completeness * 100.0);
    info!(
        "   ├─ Completeness buckets: complete {} / partial {} / minimal {} / none {}",
        stats.profile_completeness.complete,
        stats.profile_completeness.partial,
        stats.profile_completeness.minimal,
        stats.profile_completeness.none
    );
    info!("   └─ Correlations reported: {}", stats.correlations.len());

    write_snapshot(&config.stats_path, &stats, Utc::now())?;
    Ok(())
}
