//! Webhook Processor - orchestration for one inbound event
//!
//! ## Flow
//!
//! ```text
//! raw body + headers
//!     ↓
//! SignatureVerifier::check()  (policy decides warn vs reject)
//!     ↓
//! serde_json parse            (PayloadUnparsable)
//!     ↓
//! classify()                  (MissingIdentifier / Unrecognized)
//!     ↓
//! ProfileStore::update(apply_event)   one critical section per event
//!     ↓
//! HistoryLog::append()        (failure logged, never propagated)
//!     ↓
//! WebhookResponse
//! ```
//!
//! The processor is synchronous. The HTTP layer runs it on the blocking pool.

use super::classifier::{classify, ClassifiedEvent, WebhookHeaders};
use super::merge::{self, MergeOutcome};
use super::signature::{SignatureCheck, SignatureVerifier};
use super::types::{HeaderSummary, HistoryEntry};
use crate::config::SignaturePolicy;
use crate::error::WebhookError;
use crate::history::HistoryLog;
use crate::persistence::ProfileStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Body returned to the webhook sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default)]
    pub profiles_processed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl WebhookResponse {
    fn processed(event: &ClassifiedEvent, outcome: &MergeOutcome) -> Self {
        let message = match event.profile_id() {
            Some(id) => format!("Processed {} for {}", event.event_name(), id),
            None => format!(
                "Processed {} ({} profiles)",
                event.event_name(),
                outcome.profiles_processed
            ),
        };

        Self {
            success: true,
            message: Some(message),
            error: None,
            event: Some(event.event_name().to_string()),
            profiles_processed: outcome.profiles_processed,
            warnings: outcome.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Error body for a failed request
    pub fn failure(err: &WebhookError) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(err.to_string()),
            event: None,
            profiles_processed: 0,
            warnings: Vec::new(),
        }
    }
}

pub struct WebhookProcessor {
    store: Arc<ProfileStore>,
    history: Arc<HistoryLog>,
    verifier: SignatureVerifier,
    policy: SignaturePolicy,
    now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<ProfileStore>,
        history: Arc<HistoryLog>,
        verifier: SignatureVerifier,
        policy: SignaturePolicy,
    ) -> Self {
        Self::new_with_clock(store, history, verifier, policy, Box::new(Utc::now))
    }

    /// Create a processor with a custom clock
    ///
    /// Used for testing with deterministic timestamps.
    pub fn new_with_clock(
        store: Arc<ProfileStore>,
        history: Arc<HistoryLog>,
        verifier: SignatureVerifier,
        policy: SignaturePolicy,
        now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Self {
        Self {
            store,
            history,
            verifier,
            policy,
            now_fn,
        }
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }

    /// Verify, classify, merge and record one event
    pub fn handle(&self, headers: &WebhookHeaders, raw_body: &str) -> Result<WebhookResponse, WebhookError> {
        let now = (self.now_fn)();

        let signature = self.verifier.check(raw_body, headers.signature.as_deref());
        if signature == SignatureCheck::Invalid {
            match self.policy {
                SignaturePolicy::Reject => {
                    log::warn!("🚫 Rejecting webhook with invalid signature");
                    return Err(WebhookError::SignatureInvalid);
                }
                SignaturePolicy::Warn => {
                    log::warn!("⚠️  Invalid webhook signature, processing anyway (policy=warn)");
                }
            }
        }

        let payload: Value = serde_json::from_str(raw_body).map_err(WebhookError::PayloadUnparsable)?;
        let event = classify(headers, &payload)?;

        let summary = HeaderSummary {
            event_type: headers.event_type.clone(),
            external_id: headers.external_id.clone(),
            has_signature: signature != SignatureCheck::Skipped,
            signature_valid: signature == SignatureCheck::Valid,
        };

        if event == ClassifiedEvent::Unrecognized {
            log::warn!("⚠️  Unrecognized webhook payload (event type header: {:?})", headers.event_type);
            self.record_history(&event, headers, payload, summary, now);
            return Err(WebhookError::Unrecognized);
        }

        let outcome = self
            .store
            .update(|profiles| merge::apply_event(profiles, &event, now))?;

        log::info!(
            "✅ {} merged: {} profile(s), {} warning(s)",
            event.event_name(),
            outcome.profiles_processed,
            outcome.warnings.len()
        );

        let response = WebhookResponse::processed(&event, &outcome);
        self.record_history(&event, headers, payload, summary, now);
        Ok(response)
    }

    fn record_history(
        &self,
        event: &ClassifiedEvent,
        headers: &WebhookHeaders,
        payload: Value,
        header_summary: HeaderSummary,
        now: DateTime<Utc>,
    ) {
        let entry = HistoryEntry {
            timestamp: now,
            event_type: event.event_name().to_string(),
            external_id: event
                .profile_id()
                .map(str::to_string)
                .or_else(|| headers.external_id.clone()),
            payload,
            header_summary,
        };

        if let Err(e) = self.history.append(entry) {
            log::error!("❌ Failed to append webhook history {}: {}", self.history.path().display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::path::Path;
    use tempfile::tempdir;

    const SECRET: &str = "test-secret";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn processor(dir: &Path, policy: SignaturePolicy) -> WebhookProcessor {
        let store = Arc::new(ProfileStore::new(
            dir.join("profiles.json"),
            dir.join("profiles.backup.json"),
        ));
        let history = Arc::new(HistoryLog::open(dir.join("history.json"), 1000));
        WebhookProcessor::new_with_clock(
            store,
            history,
            SignatureVerifier::new(Some(SECRET.to_string())),
            policy,
            Box::new(fixed_now),
        )
    }

    fn score_headers() -> WebhookHeaders {
        WebhookHeaders {
            event_type: Some("ScoreCreatedIntegrationEvent".to_string()),
            ..WebhookHeaders::default()
        }
    }

    #[test]
    fn test_score_last_write_wins() {
        // Test: two ScoreCreated events for P1/sleep, 0.4 then 0.6
        let dir = tempdir().unwrap();
        let processor = processor(dir.path(), SignaturePolicy::Warn);

        for value in [0.4, 0.6] {
            let body = json!({"externalId": "P1", "type": "sleep", "score": value}).to_string();
            let response = processor.handle(&score_headers(), &body).unwrap();
            assert!(response.success);
            assert_eq!(response.event.as_deref(), Some("ScoreCreated"));
            assert_eq!(response.profiles_processed, 1);
        }

        let record = processor.store().get("P1").unwrap();
        assert_eq!(record.scores["sleep"].value, 0.6);
        assert_eq!(record.last_updated, Some(fixed_now()));
        assert_eq!(processor.history().len(), 2);
    }

    #[test]
    fn test_missing_identifier_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let processor = processor(dir.path(), SignaturePolicy::Warn);

        let body = json!({"type": "sleep", "score": 0.5}).to_string();
        let err = processor.handle(&score_headers(), &body).unwrap_err();

        assert!(matches!(err, WebhookError::MissingIdentifier { .. }));
        assert_eq!(err.http_status(), 400);
        assert!(!processor.store().primary_path().exists());
        assert!(processor.store().load().is_empty());
    }

    #[test]
    fn test_invalid_signature_rejected_under_reject_policy() {
        let dir = tempdir().unwrap();
        let processor = processor(dir.path(), SignaturePolicy::Reject);

        let headers = WebhookHeaders {
            signature: Some("bm90LXRoZS1zaWduYXR1cmU=".to_string()),
            ..score_headers()
        };
        let body = json!({"externalId": "P1", "type": "sleep", "score": 0.5}).to_string();
        let err = processor.handle(&headers, &body).unwrap_err();

        assert!(matches!(err, WebhookError::SignatureInvalid));
        assert!(processor.store().load().is_empty());
        assert!(processor.history().is_empty());
    }

    #[test]
    fn test_invalid_signature_processed_under_warn_policy() {
        let dir = tempdir().unwrap();
        let processor = processor(dir.path(), SignaturePolicy::Warn);

        let headers = WebhookHeaders {
            signature: Some("bm90LXRoZS1zaWduYXR1cmU=".to_string()),
            ..score_headers()
        };
        let body = json!({"externalId": "P1", "type": "sleep", "score": 0.5}).to_string();
        processor.handle(&headers, &body).unwrap();

        let entry = &processor.history().recent(1)[0];
        assert!(entry.header_summary.has_signature);
        assert!(!entry.header_summary.signature_valid);
    }

    #[test]
    fn test_valid_signature_recorded() {
        let dir = tempdir().unwrap();
        let processor = processor(dir.path(), SignaturePolicy::Reject);

        let body = json!({"externalId": "P1", "type": "sleep", "score": 0.5}).to_string();
        let headers = WebhookHeaders {
            signature: SignatureVerifier::new(Some(SECRET.to_string())).sign(&body),
            ..score_headers()
        };
        processor.handle(&headers, &body).unwrap();

        let entry = &processor.history().recent(1)[0];
        assert!(entry.header_summary.signature_valid);
        assert_eq!(entry.external_id.as_deref(), Some("P1"));
        assert_eq!(entry.event_type, "ScoreCreated");
    }

    #[test]
    fn test_unparsable_body() {
        let dir = tempdir().unwrap();
        let processor = processor(dir.path(), SignaturePolicy::Warn);

        let err = processor.handle(&score_headers(), "{not json").unwrap_err();
        assert!(matches!(err, WebhookError::PayloadUnparsable(_)));
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn test_unrecognized_is_recorded_but_not_merged() {
        let dir = tempdir().unwrap();
        let processor = processor(dir.path(), SignaturePolicy::Warn);

        let err = processor
            .handle(&WebhookHeaders::default(), &json!({}).to_string())
            .unwrap_err();
        assert!(matches!(err, WebhookError::Unrecognized));
        assert!(processor.store().load().is_empty());
        assert_eq!(processor.history().recent(1)[0].event_type, "Unrecognized");
    }

    #[test]
    fn test_batch_reports_skipped_profiles() {
        let dir = tempdir().unwrap();
        let processor = processor(dir.path(), SignaturePolicy::Warn);

        let body = json!({
            "profiles": [
                {"externalId": "A", "role": "nurse"},
                {"role": "ghost"},
                {"externalId": "B"}
            ]
        })
        .to_string();
        let response = processor.handle(&WebhookHeaders::default(), &body).unwrap();

        assert_eq!(response.event.as_deref(), Some("BatchProfileUpdate"));
        assert_eq!(response.profiles_processed, 2);
        assert_eq!(response.warnings.len(), 1);
        assert_eq!(processor.store().load().len(), 2);
    }

    #[test]
    fn test_history_failure_does_not_fail_request() {
        let dir = tempdir().unwrap();
        let store = Arc::new(ProfileStore::new(
            dir.path().join("profiles.json"),
            dir.path().join("profiles.backup.json"),
        ));
        // History path is a directory, so every append fails to write
        let history_dir = dir.path().join("history.json");
        std::fs::create_dir(&history_dir).unwrap();
        let history = Arc::new(HistoryLog::open(&history_dir, 1000));
        let processor = WebhookProcessor::new_with_clock(
            store,
            history,
            SignatureVerifier::new(None),
            SignaturePolicy::Warn,
            Box::new(fixed_now),
        );

        let body = json!({"externalId": "P1", "type": "sleep", "score": 0.7}).to_string();
        let response = processor.handle(&score_headers(), &body).unwrap();

        assert!(response.success);
        assert_eq!(processor.store().get("P1").unwrap().scores["sleep"].value, 0.7);
        assert!(history_dir.is_dir());
    }

    #[test]
    fn test_store_failure_is_store_write_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        let store = Arc::new(ProfileStore::new(
            blocker.join("profiles.json"),
            blocker.join("profiles.backup.json"),
        ));
        let history = Arc::new(HistoryLog::open(dir.path().join("history.json"), 1000));
        let processor = WebhookProcessor::new_with_clock(
            store,
            history,
            SignatureVerifier::new(None),
            SignaturePolicy::Warn,
            Box::new(fixed_now),
        );

        let body = json!({"externalId": "P1", "type": "sleep", "score": 0.7}).to_string();
        let err = processor.handle(&score_headers(), &body).unwrap_err();

        assert!(matches!(err, WebhookError::StoreWriteFailure(_)));
        assert_eq!(err.http_status(), 500);
        assert!(processor.history().is_empty());
    }

    #[test]
    fn test_failure_body_shape() {
        let body = serde_json::to_value(WebhookResponse::failure(&WebhookError::Unrecognized)).unwrap();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Unrecognized webhook event"));
        assert!(body.get("message").is_none());
    }
}
