//! Webhook runtime configuration from environment variables

use crate::history::DEFAULT_HISTORY_CAPACITY;
use std::env;
use std::path::{Path, PathBuf};

/// What to do with a request whose signature is present but wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePolicy {
    /// Log and process anyway
    Warn,
    /// Refuse with 401
    Reject,
}

impl SignaturePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "warn" | "log" | "permissive" => Some(SignaturePolicy::Warn),
            "reject" | "strict" | "enforce" => Some(SignaturePolicy::Reject),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignaturePolicy::Warn => "warn",
            SignaturePolicy::Reject => "reject",
        }
    }
}

/// Configuration for the webhook server and snapshot tooling
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Socket address for the HTTP listener
    pub bind_addr: String,

    /// Primary profile store file
    pub store_path: PathBuf,

    /// Backup copy of the last good primary
    pub backup_path: PathBuf,

    /// Bounded event history file
    pub history_path: PathBuf,

    /// Population statistics snapshot file
    pub stats_path: PathBuf,

    /// Externally managed profile -> department assignments
    pub departments_path: PathBuf,

    /// Shared secret for X-Signature verification
    pub webhook_secret: Option<String>,

    pub signature_policy: SignaturePolicy,

    /// Maximum retained history entries
    pub history_capacity: usize,

    /// Profiles listed in the statistics ranking
    pub top_n: usize,
}

impl WebhookConfig {
    /// Defaults with every file under `data_dir`
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            store_path: data_dir.join("profiles.json"),
            backup_path: data_dir.join("profiles.backup.json"),
            history_path: data_dir.join("webhook_history.json"),
            stats_path: data_dir.join("stats_snapshot.json"),
            departments_path: data_dir.join("departments.json"),
            webhook_secret: None,
            signature_policy: SignaturePolicy::Warn,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            top_n: 10,
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `WELLFLOW_BIND` (default: 127.0.0.1:3000)
    /// - `WELLFLOW_DATA_DIR` (default: data)
    /// - `WELLFLOW_STORE_FILE` / `WELLFLOW_BACKUP_FILE` / `WELLFLOW_HISTORY_FILE`
    ///   / `WELLFLOW_STATS_FILE` / `WELLFLOW_DEPARTMENTS_FILE` (default: under data dir)
    /// - `WEBHOOK_SECRET` (default: unset, signatures cannot verify)
    /// - `WEBHOOK_SIGNATURE_POLICY` (default: warn)
    /// - `WELLFLOW_HISTORY_CAPACITY` (default: 1000)
    /// - `WELLFLOW_TOP_N` (default: 10)
    pub fn from_env() -> Self {
        let data_dir = env::var("WELLFLOW_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        let mut config = Self::with_data_dir(&data_dir);

        if let Ok(bind) = env::var("WELLFLOW_BIND") {
            config.bind_addr = bind;
        }

        let path_override = |var: &str, current: &mut PathBuf| {
            if let Ok(path) = env::var(var) {
                if !path.trim().is_empty() {
                    *current = PathBuf::from(path);
                }
            }
        };
        path_override("WELLFLOW_STORE_FILE", &mut config.store_path);
        path_override("WELLFLOW_BACKUP_FILE", &mut config.backup_path);
        path_override("WELLFLOW_HISTORY_FILE", &mut config.history_path);
        path_override("WELLFLOW_STATS_FILE", &mut config.stats_path);
        path_override("WELLFLOW_DEPARTMENTS_FILE", &mut config.departments_path);

        config.webhook_secret = env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty());

        if let Ok(policy) = env::var("WEBHOOK_SIGNATURE_POLICY") {
            config.signature_policy = SignaturePolicy::from_str(&policy).unwrap_or_else(|| {
                log::warn!("Invalid WEBHOOK_SIGNATURE_POLICY '{}', defaulting to warn", policy);
                SignaturePolicy::Warn
            });
        }

        config.history_capacity = env::var("WELLFLOW_HISTORY_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_HISTORY_CAPACITY);

        config.top_n = env::var("WELLFLOW_TOP_N")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        config
    }
}
