//! Interfaces to the engine's external collaborators.

use async_trait::async_trait;
use common::{Notification, Outcome, Result, SubscriberRule};

/// Durable outcome history. Owns uniqueness on `period_id`.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Insert `outcome` unless its period is already stored.
    /// Returns `true` if a new row was written.
    async fn insert_if_absent(&self, outcome: &Outcome) -> Result<bool>;

    /// Up to `limit` outcomes for `source_id`, newest first.
    async fn load_recent(&self, source_id: &str, limit: usize) -> Result<Vec<Outcome>>;
}

/// Subscriber configuration.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Rules that may apply to `source_id` (scoped to it or unscoped).
    async fn list_active_rules(&self, source_id: &str) -> Result<Vec<SubscriberRule>>;
}

/// Outbound delivery. Rendering the notification is the implementor's job.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}
