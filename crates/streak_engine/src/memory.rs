//! In-process collaborators: a map-backed outcome store and a rule list
//! loaded from configuration.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use common::{Outcome, Result, SubscriberRule};

use crate::ports::{OutcomeStore, RuleSource};

/// Outcome store held entirely in memory. Same uniqueness and ordering
/// contract as the SQLite store, nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryOutcomeStore {
    by_period: RwLock<HashMap<String, Outcome>>,
}

impl MemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_period.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OutcomeStore for MemoryOutcomeStore {
    async fn insert_if_absent(&self, outcome: &Outcome) -> Result<bool> {
        let mut map = self.by_period.write().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(&outcome.period_id) {
            return Ok(false);
        }
        map.insert(outcome.period_id.clone(), outcome.clone());
        Ok(true)
    }

    async fn load_recent(&self, source_id: &str, limit: usize) -> Result<Vec<Outcome>> {
        let map = self.by_period.read().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<Outcome> = map
            .values()
            .filter(|o| o.source_id == source_id)
            .cloned()
            .collect();
        rows.sort_by(Outcome::recency_cmp);
        rows.truncate(limit);
        Ok(rows)
    }
}

/// Fixed rule set, typically the `rules` section of the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticRuleSource {
    rules: Vec<SubscriberRule>,
}

impl StaticRuleSource {
    pub fn new(rules: Vec<SubscriberRule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[async_trait]
impl RuleSource for StaticRuleSource {
    async fn list_active_rules(&self, source_id: &str) -> Result<Vec<SubscriberRule>> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.applies_to(source_id))
            .cloned()
            .collect())
    }
}
