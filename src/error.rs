//! Error types for the webhook pipeline
//!
//! Two classes of condition are kept apart:
//! - `WebhookError` fails the whole request (surfaced to the sender)
//! - `FieldWarning` (see `pipeline::merge`) skips one field and is only logged

/// Failure while reading or writing one of the JSON state files
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Serialization(e) => Some(e),
        }
    }
}

/// Request-level failure of webhook ingestion
#[derive(Debug)]
pub enum WebhookError {
    /// Signature present but did not verify, and policy is `reject`
    SignatureInvalid,
    /// Body is not valid JSON
    PayloadUnparsable(serde_json::Error),
    /// Event needs a profile identifier and none could be resolved
    MissingIdentifier { event: &'static str },
    /// Payload matched none of the recognized event shapes
    Unrecognized,
    /// Persisting the merged store failed
    StoreWriteFailure(StoreError),
    /// Blocking worker died before producing a result
    Internal(String),
}

impl WebhookError {
    /// HTTP status code reported to the sender
    pub fn http_status(&self) -> u16 {
        match self {
            WebhookError::SignatureInvalid => 401,
            WebhookError::MissingIdentifier { .. } | WebhookError::Unrecognized => 400,
            WebhookError::PayloadUnparsable(_)
            | WebhookError::StoreWriteFailure(_)
            | WebhookError::Internal(_) => 500,
        }
    }

    /// Short machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookError::SignatureInvalid => "SignatureInvalid",
            WebhookError::PayloadUnparsable(_) => "PayloadUnparsable",
            WebhookError::MissingIdentifier { .. } => "MissingIdentifier",
            WebhookError::Unrecognized => "Unrecognized",
            WebhookError::StoreWriteFailure(_) => "StoreWriteFailure",
            WebhookError::Internal(_) => "Internal",
        }
    }
}

impl From<StoreError> for WebhookError {
    fn from(err: StoreError) -> Self {
        WebhookError::StoreWriteFailure(err)
    }
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::SignatureInvalid => write!(f, "Webhook signature verification failed"),
            WebhookError::PayloadUnparsable(e) => write!(f, "Unable to parse webhook payload: {}", e),
            WebhookError::MissingIdentifier { event } => {
                write!(f, "No externalId or profileId found for {} event", event)
            }
            WebhookError::Unrecognized => write!(f, "Unrecognized webhook event"),
            WebhookError::StoreWriteFailure(e) => write!(f, "Failed to persist profile store: {}", e),
            WebhookError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for WebhookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WebhookError::PayloadUnparsable(e) => Some(e),
            WebhookError::StoreWriteFailure(e) => Some(e),
            _ => None,
        }
    }
}
