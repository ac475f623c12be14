//! Event classification
//!
//! Turns headers + parsed payload into a `ClassifiedEvent`. This is the only
//! place that inspects payload shape; the merge engine works on the typed
//! variant it produces.
//!
//! Precedence:
//! 1. `X-Event-Type` header naming an integration event
//! 2. `profiles` array (or a bare top-level array) -> batch update
//! 3. integration shape sniffing (`type`+`score`, `category`+`type`+`value`, ...)
//! 4. object with a resolvable identifier -> single profile upsert
//!
//! Profile identifier resolution: header external-id -> `externalId` -> `profileId`.

use crate::error::WebhookError;
use serde_json::{Map, Value};

/// Header values relevant to routing (case already folded by the HTTP layer)
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    pub event_type: Option<String>,
    pub external_id: Option<String>,
    pub signature: Option<String>,
}

/// Integration event subtypes pushed by the wellness provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrationKind {
    ScoreCreated,
    ArchetypeCreated,
    BiomarkerCreated,
    DataLogReceived,
}

impl IntegrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationKind::ScoreCreated => "ScoreCreated",
            IntegrationKind::ArchetypeCreated => "ArchetypeCreated",
            IntegrationKind::BiomarkerCreated => "BiomarkerCreated",
            IntegrationKind::DataLogReceived => "DataLogReceived",
        }
    }

    /// Parse an event-type header value.
    ///
    /// Accepts `ScoreCreatedIntegrationEvent`, `ScoreCreated`, `score_created`,
    /// `score.created` and similar spellings.
    pub fn from_header(value: &str) -> Option<Self> {
        let folded: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let folded = folded
            .strip_suffix("integrationevent")
            .or_else(|| folded.strip_suffix("event"))
            .unwrap_or(folded.as_str());

        match folded {
            "scorecreated" | "score" => Some(IntegrationKind::ScoreCreated),
            "archetypecreated" | "archetype" => Some(IntegrationKind::ArchetypeCreated),
            "biomarkercreated" | "biomarker" => Some(IntegrationKind::BiomarkerCreated),
            "datalogreceived" | "datalog" | "datalogs" => Some(IntegrationKind::DataLogReceived),
            _ => None,
        }
    }
}

/// Typed view of an inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedEvent {
    Integration {
        kind: IntegrationKind,
        profile_id: String,
        payload: Value,
    },
    BatchProfileUpdate {
        profiles: Vec<Value>,
    },
    SingleProfileUpsert {
        profile_id: String,
        fields: Map<String, Value>,
    },
    Unrecognized,
}

impl ClassifiedEvent {
    /// Name reported in responses and the history log
    pub fn event_name(&self) -> &'static str {
        match self {
            ClassifiedEvent::Integration { kind, .. } => kind.as_str(),
            ClassifiedEvent::BatchProfileUpdate { .. } => "BatchProfileUpdate",
            ClassifiedEvent::SingleProfileUpsert { .. } => "SingleProfileUpsert",
            ClassifiedEvent::Unrecognized => "Unrecognized",
        }
    }

    /// Identifier of the single profile this event targets, if any
    pub fn profile_id(&self) -> Option<&str> {
        match self {
            ClassifiedEvent::Integration { profile_id, .. }
            | ClassifiedEvent::SingleProfileUpsert { profile_id, .. } => Some(profile_id),
            _ => None,
        }
    }
}

/// Read a non-empty identifier from a JSON field (strings and integers)
pub fn id_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolve the profile identifier: header -> `externalId` -> `profileId`
pub fn resolve_profile_id(headers: &WebhookHeaders, payload: &Value) -> Option<String> {
    if let Some(id) = headers
        .external_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Some(id.to_string());
    }

    let object = payload.as_object()?;
    id_field(object, "externalId").or_else(|| id_field(object, "profileId"))
}

/// Classify an event. Fails only when an event needs an identifier and none
/// can be resolved.
pub fn classify(headers: &WebhookHeaders, payload: &Value) -> Result<ClassifiedEvent, WebhookError> {
    let header_kind = headers.event_type.as_deref().and_then(|value| {
        let kind = IntegrationKind::from_header(value);
        if kind.is_none() {
            log::debug!("Event type header '{}' not recognized, falling back to payload shape", value);
        }
        kind
    });

    if let Some(kind) = header_kind {
        return integration(kind, headers, payload);
    }

    if let Some(profiles) = batch_profiles(payload) {
        return Ok(ClassifiedEvent::BatchProfileUpdate { profiles });
    }

    let object = match payload.as_object() {
        Some(object) => object,
        None => return Ok(ClassifiedEvent::Unrecognized),
    };

    if let Some(kind) = sniff_integration_kind(object) {
        return integration(kind, headers, payload);
    }

    match resolve_profile_id(headers, payload) {
        Some(profile_id) => Ok(ClassifiedEvent::SingleProfileUpsert {
            profile_id,
            fields: object.clone(),
        }),
        // `{}` carries nothing to route; fields without an id are a sender error
        None if object.is_empty() => Ok(ClassifiedEvent::Unrecognized),
        None => Err(WebhookError::MissingIdentifier {
            event: "SingleProfileUpsert",
        }),
    }
}

fn integration(
    kind: IntegrationKind,
    headers: &WebhookHeaders,
    payload: &Value,
) -> Result<ClassifiedEvent, WebhookError> {
    let profile_id = resolve_profile_id(headers, payload)
        .ok_or(WebhookError::MissingIdentifier { event: kind.as_str() })?;

    Ok(ClassifiedEvent::Integration {
        kind,
        profile_id,
        payload: payload.clone(),
    })
}

fn batch_profiles(payload: &Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items.clone()),
        Value::Object(object) => match object.get("profiles") {
            Some(Value::Array(items)) => Some(items.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn sniff_integration_kind(object: &Map<String, Value>) -> Option<IntegrationKind> {
    let has = |key: &str| object.get(key).map_or(false, |v| !v.is_null());

    if matches!(object.get("logs"), Some(Value::Array(_))) {
        Some(IntegrationKind::DataLogReceived)
    } else if has("category") && has("type") && has("value") {
        Some(IntegrationKind::BiomarkerCreated)
    } else if has("type") && has("score") {
        Some(IntegrationKind::ScoreCreated)
    } else if has("name") && has("value") && has("dataType") {
        Some(IntegrationKind::ArchetypeCreated)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(event_type: Option<&str>, external_id: Option<&str>) -> WebhookHeaders {
        WebhookHeaders {
            event_type: event_type.map(str::to_string),
            external_id: external_id.map(str::to_string),
            signature: None,
        }
    }

    #[test]
    fn test_header_spellings() {
        assert_eq!(
            IntegrationKind::from_header("ScoreCreatedIntegrationEvent"),
            Some(IntegrationKind::ScoreCreated)
        );
        assert_eq!(
            IntegrationKind::from_header("biomarker_created"),
            Some(IntegrationKind::BiomarkerCreated)
        );
        assert_eq!(
            IntegrationKind::from_header("ArchetypeCreatedEvent"),
            Some(IntegrationKind::ArchetypeCreated)
        );
        assert_eq!(
            IntegrationKind::from_header("DataLogReceivedIntegrationEvent"),
            Some(IntegrationKind::DataLogReceived)
        );
        assert_eq!(IntegrationKind::from_header("ProfileDeleted"), None);
    }

    #[test]
    fn test_identifier_resolution_order() {
        let payload = json!({"externalId": "ext-1", "profileId": "prof-1"});

        assert_eq!(
            resolve_profile_id(&headers(None, Some("hdr-1")), &payload).as_deref(),
            Some("hdr-1")
        );
        assert_eq!(
            resolve_profile_id(&headers(None, None), &payload).as_deref(),
            Some("ext-1")
        );
        assert_eq!(
            resolve_profile_id(&headers(None, Some("  ")), &json!({"profileId": "prof-1"})).as_deref(),
            Some("prof-1")
        );
        assert_eq!(
            resolve_profile_id(&headers(None, None), &json!({"externalId": 42})).as_deref(),
            Some("42")
        );
        assert_eq!(resolve_profile_id(&headers(None, None), &json!({"externalId": ""})), None);
    }

    #[test]
    fn test_header_event_type_wins() {
        let payload = json!({"externalId": "P1", "type": "sleep", "score": 0.5});
        let event = classify(&headers(Some("ScoreCreatedIntegrationEvent"), None), &payload).unwrap();

        match event {
            ClassifiedEvent::Integration { kind, profile_id, .. } => {
                assert_eq!(kind, IntegrationKind::ScoreCreated);
                assert_eq!(profile_id, "P1");
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_integration_without_identifier_is_error() {
        let payload = json!({"type": "sleep", "score": 0.5});
        let err = classify(&headers(Some("ScoreCreated"), None), &payload).unwrap_err();
        assert!(matches!(err, WebhookError::MissingIdentifier { event: "ScoreCreated" }));

        // Same via shape sniffing
        let err = classify(&headers(None, None), &payload).unwrap_err();
        assert!(matches!(err, WebhookError::MissingIdentifier { .. }));
    }

    #[test]
    fn test_shape_sniffing() {
        let h = headers(None, Some("P1"));

        let biomarker = json!({"category": "activity", "type": "steps", "value": 8000});
        assert_eq!(classify(&h, &biomarker).unwrap().event_name(), "BiomarkerCreated");

        let score = json!({"type": "sleep", "score": 0.7});
        assert_eq!(classify(&h, &score).unwrap().event_name(), "ScoreCreated");

        let archetype = json!({"name": "chronotype", "value": "night_owl", "dataType": "string"});
        assert_eq!(classify(&h, &archetype).unwrap().event_name(), "ArchetypeCreated");

        let logs = json!({"logType": "sleep", "logs": []});
        assert_eq!(classify(&h, &logs).unwrap().event_name(), "DataLogReceived");
    }

    #[test]
    fn test_batch_detection() {
        let payload = json!({"profiles": [{"externalId": "A"}, {"externalId": "B"}]});
        match classify(&headers(None, None), &payload).unwrap() {
            ClassifiedEvent::BatchProfileUpdate { profiles } => assert_eq!(profiles.len(), 2),
            other => panic!("unexpected classification: {:?}", other),
        }

        let bare = json!([{"externalId": "A"}]);
        assert_eq!(classify(&headers(None, None), &bare).unwrap().event_name(), "BatchProfileUpdate");
    }

    #[test]
    fn test_single_profile_upsert() {
        let payload = json!({"profileId": "P9", "accountId": "acct", "team": "red"});
        match classify(&headers(None, None), &payload).unwrap() {
            ClassifiedEvent::SingleProfileUpsert { profile_id, fields } => {
                assert_eq!(profile_id, "P9");
                assert_eq!(fields.get("team"), Some(&json!("red")));
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_and_missing() {
        assert_eq!(
            classify(&headers(None, None), &json!("hello")).unwrap(),
            ClassifiedEvent::Unrecognized
        );
        assert_eq!(classify(&headers(None, None), &json!({})).unwrap(), ClassifiedEvent::Unrecognized);

        let err = classify(&headers(None, None), &json!({"team": "red"})).unwrap_err();
        assert!(matches!(err, WebhookError::MissingIdentifier { event: "SingleProfileUpsert" }));
    }
}
