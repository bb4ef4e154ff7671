//! Per-source recent-history cache.
//!
//! Uses `DashMap` so ingestion for different sources never contends on a
//! single lock; operations on one key are exclusive. Entries are bounded to
//! `capacity` outcomes, kept newest-first, and expire after `ttl` without
//! activity (sliding: `get`, `put` and `hydrate` all refresh it).

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::Outcome;
use dashmap::DashMap;
use tracing::debug;

use crate::clock::Clock;

/// A cached history with its last-activity time.
#[derive(Debug, Clone)]
struct HistoryEntry {
    /// Newest first, unique by `period_id`.
    outcomes: VecDeque<Outcome>,
    touched_at: DateTime<Utc>,
}

impl HistoryEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            outcomes: VecDeque::new(),
            touched_at: now,
        }
    }

    fn is_stale(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.touched_at > ttl
    }

    /// Insert in recency order, replacing any entry for the same period.
    fn insert(&mut self, outcome: Outcome, capacity: usize) {
        self.outcomes.retain(|o| o.period_id != outcome.period_id);
        let at = self
            .outcomes
            .iter()
            .position(|o| outcome.recency_cmp(o) != Ordering::Greater)
            .unwrap_or(self.outcomes.len());
        self.outcomes.insert(at, outcome);
        self.outcomes.truncate(capacity);
    }
}

/// Bounded, expiring, newest-first outcome history keyed by source id.
pub struct HistoryCache {
    entries: DashMap<String, HistoryEntry>,
    capacity: usize,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl HistoryCache {
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            clock,
        }
    }

    /// Max outcomes kept per source.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The cached history for `source_id`, newest first. `None` on a miss,
    /// including an entry that has expired.
    pub fn get(&self, source_id: &str) -> Option<Vec<Outcome>> {
        let now = self.clock.now();
        {
            let mut entry = self.entries.get_mut(source_id)?;
            if !entry.is_stale(now, self.ttl) {
                entry.touched_at = now;
                return Some(entry.outcomes.iter().cloned().collect());
            }
        }
        // Guard dropped above; removing while holding it would deadlock the shard.
        self.entries
            .remove_if(source_id, |_, e| e.is_stale(now, self.ttl));
        debug!("{}: history entry expired", source_id);
        None
    }

    /// Write-through of a newly accepted outcome.
    pub fn put(&self, outcome: Outcome) {
        let now = self.clock.now();
        let mut entry = self
            .entries
            .entry(outcome.source_id.clone())
            .or_insert_with(|| HistoryEntry::new(now));
        if entry.is_stale(now, self.ttl) {
            entry.outcomes.clear();
        }
        entry.insert(outcome, self.capacity);
        entry.touched_at = now;
    }

    /// Merge outcomes loaded from durable storage into the entry for
    /// `source_id`, keeping at most `capacity` of the newest.
    pub fn hydrate(&self, source_id: &str, outcomes: Vec<Outcome>) {
        let now = self.clock.now();
        let mut entry = self
            .entries
            .entry(source_id.to_string())
            .or_insert_with(|| HistoryEntry::new(now));
        if entry.is_stale(now, self.ttl) {
            entry.outcomes.clear();
        }
        for outcome in outcomes.into_iter().filter(|o| o.source_id == source_id) {
            entry.insert(outcome, self.capacity);
        }
        entry.touched_at = now;
    }

    /// Whether `source_id` has a live entry. Does not refresh its TTL.
    pub fn contains(&self, source_id: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(source_id)
            .is_some_and(|e| !e.is_stale(now, self.ttl))
    }

    pub fn invalidate(&self, source_id: &str) {
        self.entries.remove(source_id);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_stale(now, self.ttl));
        before.saturating_sub(self.entries.len())
    }

    /// Number of cached sources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use common::Face;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 18, 12, 0, 0).unwrap()
    }

    fn outcome(source: &str, period: u32, face: u8) -> Outcome {
        Outcome {
            period_id: format!("20240518{:03}", period),
            face: Face::new(face).unwrap(),
            source_id: source.into(),
            source_name: source.into(),
            observed_at: start() + chrono::Duration::minutes(period as i64),
            sequence_hint: Some(period as i64),
        }
    }

    fn cache(capacity: usize) -> (HistoryCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = HistoryCache::new(capacity, Duration::from_secs(7200), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_miss_on_unknown_source() {
        let (cache, _) = cache(5);
        assert!(cache.get("g1").is_none());
    }

    #[test]
    fn test_put_prepends_and_truncates() {
        let (cache, _) = cache(3);
        for p in 1..=5 {
            let prev = cache.get("g1").map(|h| h.len()).unwrap_or(0);
            let o = outcome("g1", p, 1 + (p % 6) as u8);
            cache.put(o.clone());
            let history = cache.get("g1").unwrap();
            assert_eq!(history[0], o);
            assert_eq!(history.len(), (prev + 1).min(3));
        }
        let periods: Vec<_> = cache.get("g1").unwrap().into_iter().map(|o| o.period_id).collect();
        assert_eq!(periods, vec!["20240518005", "20240518004", "20240518003"]);
    }

    #[test]
    fn test_put_same_period_does_not_duplicate() {
        let (cache, _) = cache(5);
        cache.put(outcome("g1", 1, 2));
        cache.put(outcome("g1", 1, 2));
        assert_eq!(cache.get("g1").unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_order_put_keeps_recency_order() {
        let (cache, _) = cache(5);
        cache.put(outcome("g1", 3, 1));
        cache.put(outcome("g1", 1, 1));
        cache.put(outcome("g1", 2, 1));
        let periods: Vec<_> = cache.get("g1").unwrap().into_iter().map(|o| o.period_id).collect();
        assert_eq!(periods, vec!["20240518003", "20240518002", "20240518001"]);
    }

    #[test]
    fn test_hydrate_caps_and_merges() {
        let (cache, _) = cache(4);
        cache.put(outcome("g1", 10, 6));
        let loaded: Vec<_> = (1..=9).rev().map(|p| outcome("g1", p, 3)).collect();
        cache.hydrate("g1", loaded);
        let history = cache.get("g1").unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].period_id, "20240518010");
        assert_eq!(history[3].period_id, "20240518007");
    }

    #[test]
    fn test_sliding_expiry() {
        let (cache, clock) = cache(5);
        cache.put(outcome("g1", 1, 1));

        clock.advance(chrono::Duration::minutes(90));
        assert!(cache.get("g1").is_some(), "access refreshes expiry");

        clock.advance(chrono::Duration::minutes(90));
        assert!(cache.get("g1").is_some());

        clock.advance(chrono::Duration::minutes(121));
        assert!(cache.get("g1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_on_expired_entry_starts_fresh() {
        let (cache, clock) = cache(5);
        cache.put(outcome("g1", 1, 1));
        cache.put(outcome("g1", 2, 1));
        clock.advance(chrono::Duration::hours(3));
        cache.put(outcome("g1", 3, 1));
        assert_eq!(cache.get("g1").unwrap().len(), 1);
    }

    #[test]
    fn test_contains_does_not_refresh_expiry() {
        let (cache, clock) = cache(5);
        cache.put(outcome("g1", 1, 1));
        clock.advance(chrono::Duration::minutes(90));
        assert!(cache.contains("g1"));

        clock.advance(chrono::Duration::minutes(31));
        assert!(!cache.contains("g1"));
        assert!(!cache.contains("g2"));
    }

    #[test]
    fn test_purge_and_invalidate() {
        let (cache, clock) = cache(5);
        cache.put(outcome("g1", 1, 1));
        clock.advance(chrono::Duration::hours(1));
        cache.put(outcome("g2", 1, 1));
        clock.advance(chrono::Duration::minutes(90));

        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.get("g2").is_some());

        cache.invalidate("g2");
        assert!(cache.get("g2").is_none());
    }
}
