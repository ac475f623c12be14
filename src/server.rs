//! HTTP surface for the webhook pipeline
//!
//! ## Routes
//!
//! - `POST /webhook` - ingest one event (`X-Event-Type`, `X-External-Id`, `X-Signature`)
//! - `GET /webhook` - `externalId=` single profile, `history=true` recent events,
//!   otherwise the profile list (`mode=raw` skips departments, `mode=stats` aggregates)
//! - `DELETE /webhook?confirm=true` - empty the store and history
//! - `GET /webhook/stats` - population statistics (`persist=true` writes the snapshot file)
//! - `GET /healthz` - liveness
//!
//! Store and history access is file I/O under a std mutex, so every handler
//! hands its work to the blocking pool.

use crate::aggregator_core::{write_snapshot, StatisticsAggregator};
use crate::config::WebhookConfig;
use crate::departments::DepartmentDirectory;
use crate::error::WebhookError;
use crate::history::{HistoryLog, HISTORY_READ_LIMIT};
use crate::persistence::ProfileStore;
use crate::pipeline::{SignatureVerifier, WebhookHeaders, WebhookProcessor, WebhookResponse};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared handler state, built once at startup
pub struct AppState {
    pub processor: WebhookProcessor,
    pub store: Arc<ProfileStore>,
    pub history: Arc<HistoryLog>,
    pub departments: DepartmentDirectory,
    pub aggregator: StatisticsAggregator,
    pub stats_path: PathBuf,
}

impl AppState {
    pub fn from_config(config: &WebhookConfig) -> Self {
        let store = Arc::new(ProfileStore::new(&config.store_path, &config.backup_path));
        let history = Arc::new(HistoryLog::open(&config.history_path, config.history_capacity));
        let processor = WebhookProcessor::new(
            store.clone(),
            history.clone(),
            SignatureVerifier::new(config.webhook_secret.clone()),
            config.signature_policy,
        );

        Self::new(
            processor,
            DepartmentDirectory::new(&config.departments_path),
            StatisticsAggregator::new(config.top_n),
            config.stats_path.clone(),
        )
    }

    /// Assemble state around an existing processor (store and history are shared with it)
    pub fn new(
        processor: WebhookProcessor,
        departments: DepartmentDirectory,
        aggregator: StatisticsAggregator,
        stats_path: PathBuf,
    ) -> Self {
        Self {
            store: processor.store().clone(),
            history: processor.history().clone(),
            processor,
            departments,
            aggregator,
            stats_path,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/webhook",
            get(read_webhook).post(receive_webhook).delete(clear_webhook),
        )
        .route("/webhook/stats", get(read_stats))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadParams {
    pub external_id: Option<String>,
    pub history: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmParams {
    pub confirm: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub persist: Option<String>,
}

fn flag(value: &Option<String>) -> bool {
    matches!(
        value.as_deref().map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "yes")
    )
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn status_of(err: &WebhookError) -> StatusCode {
    StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn error_body(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "success": false, "error": message.into() })))
}

async fn blocking<T, F>(f: F) -> Result<T, WebhookError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WebhookError::Internal(e.to_string()))
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match blocking(move || state.store.load().len()).await {
        Ok(profiles) => (StatusCode::OK, Json(json!({ "status": "ok", "profiles": profiles }))),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<WebhookResponse>) {
    let webhook_headers = WebhookHeaders {
        event_type: header(&headers, "x-event-type"),
        external_id: header(&headers, "x-external-id"),
        signature: header(&headers, "x-signature"),
    };

    log::debug!(
        "📨 Webhook received (event type: {:?}, {} bytes)",
        webhook_headers.event_type,
        body.len()
    );

    let result = blocking(move || state.processor.handle(&webhook_headers, &body))
        .await
        .and_then(|inner| inner);

    match result {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => {
            if e.http_status() >= 500 {
                log::error!("❌ Webhook failed: {}", e);
            } else {
                log::warn!("⚠️  Webhook refused ({}): {}", e.kind(), e);
            }
            (status_of(&e), Json(WebhookResponse::failure(&e)))
        }
    }
}

async fn read_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadParams>,
) -> (StatusCode, Json<Value>) {
    let result = blocking(move || {
        if let Some(id) = params.external_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return match state.store.get(id.trim()) {
                Some(mut record) => {
                    state.departments.apply_record(id.trim(), &mut record);
                    (StatusCode::OK, json!({ "success": true, "profile": record }))
                }
                None => (
                    StatusCode::NOT_FOUND,
                    json!({ "success": false, "error": format!("Profile {} not found", id.trim()) }),
                ),
            };
        }

        if flag(&params.history) {
            let history = state.history.recent(HISTORY_READ_LIMIT);
            return (
                StatusCode::OK,
                json!({ "success": true, "count": history.len(), "total": state.history.len(), "history": history }),
            );
        }

        match params.mode.as_deref() {
            Some("stats") => {
                let stats = state.aggregator.compute_from_store(&state.store, &state.departments);
                (StatusCode::OK, json!({ "success": true, "stats": stats }))
            }
            Some("raw") => {
                let profiles: Vec<_> = state.store.load().into_values().collect();
                (
                    StatusCode::OK,
                    json!({ "success": true, "count": profiles.len(), "profiles": profiles }),
                )
            }
            _ => {
                let profiles = state.departments.merged_profiles(state.store.load());
                (
                    StatusCode::OK,
                    json!({ "success": true, "count": profiles.len(), "profiles": profiles }),
                )
            }
        }
    })
    .await;

    match result {
        Ok((status, body)) => (status, Json(body)),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn clear_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConfirmParams>,
) -> (StatusCode, Json<Value>) {
    if !flag(&params.confirm) {
        return error_body(
            StatusCode::BAD_REQUEST,
            "Refusing to clear profile data without confirm=true",
        );
    }

    let result = blocking(move || -> Result<(), WebhookError> {
        state.store.clear()?;
        state.history.clear()?;
        Ok(())
    })
    .await
    .and_then(|inner| inner);

    match result {
        Ok(()) => {
            log::warn!("🗑️  Profile store and webhook history cleared");
            (
                StatusCode::OK,
                Json(json!({ "success": true, "message": "All profile data and history cleared" })),
            )
        }
        Err(e) => {
            log::error!("❌ Clear failed: {}", e);
            error_body(status_of(&e), e.to_string())
        }
    }
}

async fn read_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsParams>,
) -> (StatusCode, Json<Value>) {
    let persist = flag(&params.persist);

    let result = blocking(move || -> Result<Value, WebhookError> {
        let stats = state.aggregator.compute_from_store(&state.store, &state.departments);
        if persist {
            write_snapshot(&state.stats_path, &stats, Utc::now())?;
        }
        Ok(json!({ "success": true, "persisted": persist, "stats": stats }))
    })
    .await
    .and_then(|inner| inner);

    match result {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => {
            log::error!("❌ Statistics failed: {}", e);
            error_body(status_of(&e), e.to_string())
        }
    }
}
