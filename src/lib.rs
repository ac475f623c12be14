//! Wellflow - wellness webhook ingestion and population statistics
//!
//! An HTTP receiver accepts signed wellness events, merges them into a
//! file-backed profile store, keeps a bounded audit history, and computes
//! population statistics on demand.

pub mod aggregator_core;
pub mod config;
pub mod departments;
pub mod error;
pub mod history;
pub mod persistence;
pub mod pipeline;
pub mod server;

pub use config::{SignaturePolicy, WebhookConfig};
pub use error::{StoreError, WebhookError};
