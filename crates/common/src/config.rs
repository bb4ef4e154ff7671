//! Bot configuration types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::SubscriberRule;

/// Top-level bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Per-source recent-history cache.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Duplicate-period fast path.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Notification delivery.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Durable outcome storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Directory for the notification journal.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: String,

    /// Display labels keyed by source id (overrides transport-supplied names).
    #[serde(default)]
    pub sources: BTreeMap<String, String>,

    /// Subscriber alert rules.
    #[serde(default)]
    pub rules: Vec<SubscriberRule>,
}

/// Recent-history cache parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Max outcomes kept per source (`H`).
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,

    /// Sliding expiry for an inactive source (seconds).
    #[serde(default = "default_history_ttl")]
    pub ttl_secs: u64,

    /// How often expired entries are swept (seconds).
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

/// Deduplication window parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Number of period ids remembered before the window is cleared.
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,
}

/// Notification delivery parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-delivery timeout (seconds). A timeout counts as a delivery failure.
    #[serde(default = "default_dispatch_timeout")]
    pub timeout_secs: u64,

    /// Optional webhook receiving `{destination, text}` JSON. Empty disables it.
    #[serde(default)]
    pub webhook_url: String,
}

/// Durable storage parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_history_capacity() -> usize {
    50
}
fn default_history_ttl() -> u64 {
    2 * 60 * 60
}
fn default_purge_interval() -> u64 {
    300
}

fn default_dedup_capacity() -> usize {
    10_000
}

fn default_dispatch_timeout() -> u64 {
    10
}

fn default_db_path() -> String {
    "streak-bot.db".into()
}

fn default_journal_dir() -> String {
    "journal".into()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
            ttl_secs: default_history_ttl(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: default_dedup_capacity(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_dispatch_timeout(),
            webhook_url: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            dedup: DedupConfig::default(),
            dispatch: DispatchConfig::default(),
            storage: StorageConfig::default(),
            journal_dir: default_journal_dir(),
            sources: BTreeMap::new(),
            rules: Vec::new(),
        }
    }
}

impl BotConfig {
    /// Display label for a source, falling back to the transport's name.
    pub fn source_label<'a>(&'a self, source_id: &str, fallback: &'a str) -> &'a str {
        self.sources
            .get(source_id)
            .map(String::as_str)
            .unwrap_or(fallback)
    }
}
