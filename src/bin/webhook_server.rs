//! Webhook Server - HTTP receiver for wellness integration events
//!
//! Usage:
//!   cargo run --release --bin webhook_server
//!
//! Environment variables:
//!   WELLFLOW_BIND - listen address (default: 127.0.0.1:3000)
//!   WELLFLOW_DATA_DIR - directory for all state files (default: data)
//!   WEBHOOK_SECRET - shared secret for X-Signature (default: unset)
//!   WEBHOOK_SIGNATURE_POLICY - warn | reject (default: warn)
//!   WELLFLOW_HISTORY_CAPACITY - retained history entries (default: 1000)

use dotenv::dotenv;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use wellflow::config::WebhookConfig;
use wellflow::server::{router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = WebhookConfig::from_env();

    info!("🚀 Wellflow webhook server");
    info!("   ├─ Bind: {}", config.bind_addr);
    info!("   ├─ Store: {}", config.store_path.display());
    info!("   ├─ Backup: {}", config.backup_path.display());
    info!("   ├─ History: {} (capacity {})", config.history_path.display(), config.history_capacity);
    info!("   ├─ Departments: {}", config.departments_path.display());
    info!("   ├─ Stats snapshot: {}", config.stats_path.display());
    info!(
        "   └─ Signatures: secret {}, policy {}",
        if config.webhook_secret.is_some() { "configured" } else { "NOT configured" },
        config.signature_policy.as_str()
    );

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState::from_config(&config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("✅ Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("🛑 Shutdown signal received, draining requests...");
        })
        .await?;

    info!("👋 Webhook server stopped");
    Ok(())
}
