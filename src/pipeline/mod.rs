//! # Webhook Ingestion Pipeline
//!
//! Turns one inbound wellness event into a durable profile update.
//!
//! ## Architecture
//!
//! ```text
//! POST /webhook
//!     ↓
//! SignatureVerifier  (HMAC-SHA256, base64, constant-time compare)
//!     ↓
//! classify()         → ClassifiedEvent (sum type, only place that sniffs shape)
//!     ↓
//! merge::apply_event (last-write-wins per keyed entry, data logs appended)
//!     ↓
//! ProfileStore       (full-map JSON file, backup rotation, one mutex)
//!     ↓
//! HistoryLog         (bounded, newest first)
//! ```
//!
//! ## Module Organization
//!
//! - `types` - profile records and history envelopes
//! - `signature` - shared-secret verification
//! - `classifier` - event classification and identifier resolution
//! - `merge` - state merge rules and field warnings
//! - `engine` - `WebhookProcessor` orchestration

pub mod types;
pub mod signature;
pub mod classifier;
pub mod merge;
pub mod engine;

// Re-export commonly used types
pub use types::{ProfileMap, ProfileRecord, HistoryEntry, HeaderSummary};
pub use signature::{SignatureCheck, SignatureVerifier};
pub use classifier::{classify, ClassifiedEvent, IntegrationKind, WebhookHeaders};
pub use merge::{FieldWarning, MergeOutcome};
pub use engine::{WebhookProcessor, WebhookResponse};
