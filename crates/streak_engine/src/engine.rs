//! Rule engine — the ingestion and evaluation pipeline.
//!
//! For each inbound message: parse, drop duplicates, persist, write through
//! to the history cache, evaluate streaks and build one notification per
//! rule whose threshold is crossed. Work for a single source is serialized;
//! different sources proceed independently. Delivery runs on spawned tasks
//! so a slow notifier never holds up ingestion.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::config::BotConfig;
use common::{Classification, Notification, Outcome, RawMessage, Result, SubscriberRule, Trigger};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::HistoryCache;
use crate::clock::Clock;
use crate::dedup::DedupWindow;
use crate::parser::{parse, Rejection};
use crate::ports::{Notifier, OutcomeStore, RuleSource};
use crate::streak::{self, StreakReport, MIN_SAMPLES};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestStatus {
    /// Not an outcome message.
    Rejected(Rejection),
    /// Period already ingested.
    Duplicate,
    /// Could not be persisted; a retry of the same message may succeed.
    Failed,
    /// New outcome; `notifications` were handed to the notifier.
    Accepted { notifications: usize },
}

impl IngestStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestStatus::Accepted { .. })
    }
}

/// Ingestion counters, shared with dispatch tasks.
#[derive(Debug, Default)]
pub struct IngestStats {
    accepted: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    queued: AtomicU64,
    delivered: AtomicU64,
    delivery_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub failed: u64,
    /// Notifications handed to dispatch.
    pub queued: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
}

impl StatsSnapshot {
    /// Deliveries neither completed nor failed yet.
    pub fn in_flight(&self) -> u64 {
        self.queued
            .saturating_sub(self.delivered + self.delivery_failures)
    }
}

impl IngestStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Classifications whose current run reaches `rule.threshold`, longest first.
pub fn collect_triggers(rule: &SubscriberRule, report: &StreakReport) -> Vec<Trigger> {
    let mut triggers: Vec<Trigger> = Classification::ALL
        .into_iter()
        .filter(|c| rule.watches(*c))
        .map(|c| Trigger {
            classification: c,
            run: report.match_run(c),
        })
        .filter(|t| t.run > 0 && t.run >= rule.threshold)
        .collect();
    // Stable: equal runs keep classification order.
    triggers.sort_by_key(|t| Reverse(t.run));
    triggers
}

/// The streak engine that ingests outcomes and raises notifications.
pub struct RuleEngine {
    store: Arc<dyn OutcomeStore>,
    rules: Arc<dyn RuleSource>,
    notifier: Arc<dyn Notifier>,
    cache: Arc<HistoryCache>,
    dedup: DedupWindow,
    source_locks: DashMap<String, Arc<Mutex<()>>>,
    dispatch_timeout: Duration,
    stats: Arc<IngestStats>,
}

impl RuleEngine {
    pub fn new(
        config: &BotConfig,
        store: Arc<dyn OutcomeStore>,
        rules: Arc<dyn RuleSource>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = HistoryCache::new(
            config.history.capacity,
            Duration::from_secs(config.history.ttl_secs),
            clock,
        );
        Self {
            store,
            rules,
            notifier,
            cache: Arc::new(cache),
            dedup: DedupWindow::new(config.dedup.capacity),
            source_locks: DashMap::new(),
            dispatch_timeout: Duration::from_secs(config.dispatch.timeout_secs.max(1)),
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn cache(&self) -> &Arc<HistoryCache> {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn source_lock(&self, source_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(&self.source_locks.entry(source_id.to_string()).or_default())
    }

    /// Drop the locks of sources that are neither cached nor mid-ingest.
    /// Returns how many were removed.
    pub fn prune_idle_locks(&self) -> usize {
        let before = self.source_locks.len();
        self.source_locks.retain(|source_id, lock| {
            Arc::strong_count(lock) > 1 || self.cache.contains(source_id)
        });
        before - self.source_locks.len()
    }

    /// Ingest one transport message.
    ///
    /// Must run inside a Tokio runtime: notifications are delivered on
    /// spawned tasks.
    pub async fn ingest(&self, msg: &RawMessage) -> IngestStatus {
        let outcome = match parse(msg) {
            Ok(o) => o,
            Err(rejection) => {
                debug!("{}: skipped message ({})", msg.source_id, rejection);
                IngestStats::bump(&self.stats.rejected);
                return IngestStatus::Rejected(rejection);
            }
        };

        let lock = self.source_lock(&outcome.source_id);
        let notifications = {
            let _guard = lock.lock().await;

            if self.dedup.seen(&outcome.period_id) {
                debug!("{}: duplicate period {}", outcome.source_id, outcome.period_id);
                IngestStats::bump(&self.stats.duplicates);
                return IngestStatus::Duplicate;
            }

            match self.store.insert_if_absent(&outcome).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        "{}: period {} already stored",
                        outcome.source_id, outcome.period_id
                    );
                    self.dedup.mark_seen(&outcome.period_id);
                    IngestStats::bump(&self.stats.duplicates);
                    return IngestStatus::Duplicate;
                }
                Err(e) => {
                    error!(
                        "{}: failed to persist period {}: {}",
                        outcome.source_id, outcome.period_id, e
                    );
                    IngestStats::bump(&self.stats.failed);
                    return IngestStatus::Failed;
                }
            }

            self.dedup.mark_seen(&outcome.period_id);
            self.cache.put(outcome.clone());
            IngestStats::bump(&self.stats.accepted);
            debug!(
                "{}: accepted period {} face={}",
                outcome.source_id, outcome.period_id, outcome.face
            );

            match self.evaluate_outcome(&outcome).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(
                        "{}: evaluation for period {} aborted: {}",
                        outcome.source_id, outcome.period_id, e
                    );
                    Vec::new()
                }
            }
        };

        let count = notifications.len();
        for notification in notifications {
            self.dispatch(notification);
        }
        IngestStatus::Accepted {
            notifications: count,
        }
    }

    /// Evaluate the history of `outcome`'s source and build notifications
    /// for every rule that crosses its threshold. Does not deliver them.
    ///
    /// Callers serialize per source; [`RuleEngine::ingest`] does.
    pub async fn evaluate_outcome(&self, outcome: &Outcome) -> Result<Vec<Notification>> {
        let source_id = outcome.source_id.as_str();

        let history = match self.cache.get(source_id) {
            Some(h) if h.len() >= MIN_SAMPLES => h,
            _ => {
                let loaded = match self.store.load_recent(source_id, self.cache.capacity()).await {
                    Ok(loaded) => loaded,
                    Err(e) => {
                        // Leave the source cold so the next outcome hydrates again.
                        self.cache.invalidate(source_id);
                        return Err(e);
                    }
                };
                debug!("{}: hydrated {} outcomes", source_id, loaded.len());
                self.cache.hydrate(source_id, loaded);
                self.cache.get(source_id).unwrap_or_default()
            }
        };

        if history.len() < MIN_SAMPLES {
            debug!("{}: not enough history yet ({})", source_id, history.len());
            return Ok(Vec::new());
        }

        let report = streak::evaluate(&history);
        let rules = self.rules.list_active_rules(source_id).await?;

        let mut notifications = Vec::new();
        for rule in rules.iter().filter(|r| r.applies_to(source_id)) {
            let triggers = collect_triggers(rule, &report);
            if triggers.is_empty() {
                continue;
            }

            info!(
                "TRIGGER: {} period {} → {} [{}]",
                source_id,
                outcome.period_id,
                rule.subscriber_id,
                triggers
                    .iter()
                    .map(|t| format!("{}×{}", t.classification, t.run))
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let mut notification = Notification {
                id: Uuid::new_v4(),
                subscriber_id: rule.subscriber_id.clone(),
                destination: rule.destination().to_string(),
                source_id: outcome.source_id.clone(),
                source_name: outcome.source_name.clone(),
                outcome: outcome.clone(),
                triggers,
                recent: Vec::new(),
            };
            let longest = (notification.longest_run() as usize).min(history.len());
            notification.recent = history[..longest].to_vec();
            notifications.push(notification);
        }

        Ok(notifications)
    }

    /// Fire-and-forget delivery bounded by the dispatch timeout.
    fn dispatch(&self, notification: Notification) {
        IngestStats::bump(&self.stats.queued);
        let notifier = Arc::clone(&self.notifier);
        let stats = Arc::clone(&self.stats);
        let timeout = self.dispatch_timeout;

        tokio::spawn(async move {
            let destination = notification.destination.clone();
            match tokio::time::timeout(timeout, notifier.deliver(&notification)).await {
                Ok(Ok(())) => {
                    IngestStats::bump(&stats.delivered);
                    debug!("delivered {} to {}", notification.id, destination);
                }
                Ok(Err(e)) => {
                    IngestStats::bump(&stats.delivery_failures);
                    warn!("delivery of {} to {} failed: {}", notification.id, destination, e);
                }
                Err(_) => {
                    IngestStats::bump(&stats.delivery_failures);
                    warn!(
                        "delivery of {} to {} timed out after {}ms",
                        notification.id,
                        destination,
                        timeout.as_millis()
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::{MemoryOutcomeStore, StaticRuleSource};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use common::{Error, Face};
    use std::sync::atomic::AtomicBool;
    use tokio::sync::mpsc;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 18, 12, 0, 0).unwrap()
    }

    fn rule(id: &str, threshold: u32, watch: Option<Vec<Classification>>) -> SubscriberRule {
        SubscriberRule {
            subscriber_id: id.into(),
            destination: String::new(),
            source_id: None,
            threshold,
            enabled: true,
            watch,
        }
    }

    fn message(source: &str, period: u32, face: u8) -> RawMessage {
        RawMessage {
            text: format!("Period: 20240518{:03}\nResult: {}", period, face),
            source_id: source.into(),
            source_name: "Lucky Dice".into(),
            event_id: Some(period as i64),
            received_at: start() + chrono::Duration::minutes(period as i64),
        }
    }

    /// Sends every delivered notification into a channel; fails for one destination.
    struct RecordingNotifier {
        tx: mpsc::UnboundedSender<Notification>,
        broken: Option<String>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, notification: &Notification) -> Result<()> {
            if self.broken.as_deref() == Some(notification.destination.as_str()) {
                return Err(Error::Dispatch {
                    destination: notification.destination.clone(),
                    message: "unreachable".into(),
                });
            }
            let _ = self.tx.send(notification.clone());
            Ok(())
        }
    }

    /// Store whose writes or reads can be made to fail, and recover.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryOutcomeStore,
        fail_inserts: AtomicBool,
        fail_loads: AtomicBool,
    }

    #[async_trait]
    impl OutcomeStore for FlakyStore {
        async fn insert_if_absent(&self, outcome: &Outcome) -> Result<bool> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk full".into()));
            }
            self.inner.insert_if_absent(outcome).await
        }

        async fn load_recent(&self, source_id: &str, limit: usize) -> Result<Vec<Outcome>> {
            if self.fail_loads.load(Ordering::SeqCst) {
                return Err(Error::Storage("connection reset".into()));
            }
            self.inner.load_recent(source_id, limit).await
        }
    }

    struct Harness {
        engine: RuleEngine,
        store: Arc<MemoryOutcomeStore>,
        rx: mpsc::UnboundedReceiver<Notification>,
    }

    fn harness_with(rules: Vec<SubscriberRule>, broken: Option<&str>) -> Harness {
        let store = Arc::new(MemoryOutcomeStore::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = RecordingNotifier {
            tx,
            broken: broken.map(String::from),
        };
        let engine = RuleEngine::new(
            &BotConfig::default(),
            store.clone(),
            Arc::new(StaticRuleSource::new(rules)),
            Arc::new(notifier),
            Arc::new(ManualClock::new(start())),
        );
        Harness { engine, store, rx }
    }

    fn harness(rules: Vec<SubscriberRule>) -> Harness {
        harness_with(rules, None)
    }

    async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Option<Notification> {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_rejects_noise() {
        let h = harness(vec![]);
        let mut msg = message("g1", 1, 3);
        msg.text = "gm".into();
        assert_eq!(
            h.engine.ingest(&msg).await,
            IngestStatus::Rejected(Rejection::MissingPeriod)
        );
        assert_eq!(h.engine.stats().rejected, 1);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_ingest_evaluates_once() {
        let mut h = harness(vec![rule("alice", 2, Some(vec![Classification::High]))]);
        h.engine.ingest(&message("g1", 1, 6)).await;

        let first = h.engine.ingest(&message("g1", 2, 5)).await;
        let second = h.engine.ingest(&message("g1", 2, 5)).await;

        assert_eq!(first, IngestStatus::Accepted { notifications: 1 });
        assert_eq!(second, IngestStatus::Duplicate);
        assert_eq!(h.store.len(), 2);
        assert!(next_delivery(&mut h.rx).await.is_some());
        assert!(next_delivery(&mut h.rx).await.is_none());

        let stats = h.engine.stats();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.duplicates, 1);
    }

    #[tokio::test]
    async fn test_store_is_authoritative_for_duplicates() {
        let h = harness(vec![]);
        let msg = message("g1", 1, 4);
        assert!(h.engine.ingest(&msg).await.is_accepted());

        // A second engine has an empty dedup window but shares the store.
        let (tx, _rx) = mpsc::unbounded_channel();
        let other = RuleEngine::new(
            &BotConfig::default(),
            h.store.clone(),
            Arc::new(StaticRuleSource::default()),
            Arc::new(RecordingNotifier { tx, broken: None }),
            Arc::new(ManualClock::new(start())),
        );
        assert_eq!(other.ingest(&msg).await, IngestStatus::Duplicate);
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn test_first_outcome_is_not_meaningful() {
        let h = harness(vec![rule("alice", 1, None)]);
        assert_eq!(
            h.engine.ingest(&message("g1", 1, 6)).await,
            IngestStatus::Accepted { notifications: 0 }
        );
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let h = harness(vec![rule("alice", 3, Some(vec![Classification::High]))]);
        assert_eq!(
            h.engine.ingest(&message("g1", 1, 6)).await,
            IngestStatus::Accepted { notifications: 0 }
        );
        assert_eq!(
            h.engine.ingest(&message("g1", 2, 5)).await,
            IngestStatus::Accepted { notifications: 0 }
        );
        assert_eq!(
            h.engine.ingest(&message("g1", 3, 4)).await,
            IngestStatus::Accepted { notifications: 1 }
        );
    }

    #[tokio::test]
    async fn test_multiple_triggers_share_one_notification() {
        let h = harness(vec![rule(
            "alice",
            5,
            Some(vec![Classification::High, Classification::Alternation]),
        )]);
        // Oldest to newest: 6 5 4 5 6 (all high, parity alternates).
        for (period, face) in [(1, 6), (2, 5), (3, 4), (4, 5)] {
            h.engine.ingest(&message("g1", period, face)).await;
        }
        let msg = message("g1", 5, 6);
        let outcome = parse(&msg).unwrap();
        assert!(h.engine.store.insert_if_absent(&outcome).await.unwrap());
        h.engine.cache().put(outcome.clone());

        let notifications = h.engine.evaluate_outcome(&outcome).await.unwrap();
        assert_eq!(notifications.len(), 1);
        let n = &notifications[0];
        assert_eq!(
            n.triggers,
            vec![
                Trigger { classification: Classification::High, run: 5 },
                Trigger { classification: Classification::Alternation, run: 5 },
            ]
        );
        assert_eq!(n.recent.len(), 5);
        assert_eq!(n.recent[0], outcome);
        assert_eq!(n.destination, "alice");
    }

    #[tokio::test]
    async fn test_each_rule_notifies_independently() {
        let scoped = SubscriberRule {
            source_id: Some("g1".into()),
            ..rule("alice", 2, Some(vec![Classification::Low]))
        };
        let elsewhere = SubscriberRule {
            source_id: Some("g2".into()),
            ..rule("carol", 2, None)
        };
        let h = harness(vec![
            rule("alice", 3, Some(vec![Classification::Low])),
            scoped,
            elsewhere,
        ]);
        for (period, face) in [(1, 1), (2, 2)] {
            h.engine.ingest(&message("g1", period, face)).await;
        }
        let outcome = parse(&message("g1", 3, 3)).unwrap();
        h.engine.store.insert_if_absent(&outcome).await.unwrap();
        h.engine.cache().put(outcome.clone());

        let notifications = h.engine.evaluate_outcome(&outcome).await.unwrap();
        assert_eq!(notifications.len(), 2);
        assert!(notifications.iter().all(|n| n.subscriber_id == "alice"));
    }

    #[tokio::test]
    async fn test_hydrates_from_store_on_cold_cache() {
        let mut h = harness(vec![rule("alice", 4, Some(vec![Classification::Odd]))]);
        for period in 1..=3 {
            let outcome = parse(&message("g1", period, 3)).unwrap();
            h.store.insert_if_absent(&outcome).await.unwrap();
        }
        assert!(h.engine.cache().get("g1").is_none());

        let status = h.engine.ingest(&message("g1", 4, 5)).await;
        assert_eq!(status, IngestStatus::Accepted { notifications: 1 });
        assert_eq!(h.engine.cache().get("g1").map(|v| v.len()), Some(4));

        let delivered = next_delivery(&mut h.rx).await.unwrap();
        assert_eq!(delivered.triggers[0].run, 4);
    }

    #[tokio::test]
    async fn test_failing_destination_does_not_block_others() {
        let broken = SubscriberRule {
            destination: "broken".into(),
            ..rule("bob", 2, None)
        };
        let mut h = harness_with(vec![broken, rule("alice", 2, None)], Some("broken"));
        h.engine.ingest(&message("g1", 1, 2)).await;
        let status = h.engine.ingest(&message("g1", 2, 2)).await;
        assert_eq!(status, IngestStatus::Accepted { notifications: 2 });

        let delivered = next_delivery(&mut h.rx).await.unwrap();
        assert_eq!(delivered.subscriber_id, "alice");

        // Both dispatch tasks settle shortly after the send.
        for _ in 0..50 {
            let stats = h.engine.stats();
            if stats.delivery_failures == 1 && stats.delivered == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let stats = h.engine.stats();
        assert_eq!(stats.delivery_failures, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_storage_failures_are_isolated() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = Arc::new(FlakyStore {
            fail_inserts: AtomicBool::new(true),
            ..FlakyStore::default()
        });
        let engine = RuleEngine::new(
            &BotConfig::default(),
            store,
            Arc::new(StaticRuleSource::new(vec![rule("alice", 1, None)])),
            Arc::new(RecordingNotifier { tx, broken: None }),
            Arc::new(ManualClock::new(start())),
        );
        let msg = message("g1", 1, 6);
        assert_eq!(engine.ingest(&msg).await, IngestStatus::Failed);
        // Not marked seen: a retry goes back to the store.
        assert_eq!(engine.ingest(&msg).await, IngestStatus::Failed);
        assert_eq!(engine.stats().failed, 2);
    }

    #[tokio::test]
    async fn test_hydration_failure_aborts_evaluation_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = Arc::new(FlakyStore {
            fail_loads: AtomicBool::new(true),
            ..FlakyStore::default()
        });
        for period in 1..=5 {
            let outcome = parse(&message("g1", period, 6)).unwrap();
            store.inner.insert_if_absent(&outcome).await.unwrap();
        }
        let engine = RuleEngine::new(
            &BotConfig::default(),
            store.clone(),
            Arc::new(StaticRuleSource::new(vec![rule(
                "alice",
                5,
                Some(vec![Classification::High]),
            )])),
            Arc::new(RecordingNotifier { tx, broken: None }),
            Arc::new(ManualClock::new(start())),
        );

        let status = engine.ingest(&message("g1", 6, 6)).await;
        assert_eq!(status, IngestStatus::Accepted { notifications: 0 });
        assert_eq!(store.inner.len(), 6);
        assert!(engine.cache().get("g1").is_none(), "left cold for a retry");

        // The next outcome hydrates again and sees the whole run.
        store.fail_loads.store(false, Ordering::SeqCst);
        let status = engine.ingest(&message("g1", 7, 5)).await;
        assert_eq!(status, IngestStatus::Accepted { notifications: 1 });
        assert_eq!(engine.cache().get("g1").map(|h| h.len()), Some(7));

        let delivered = next_delivery(&mut rx).await.unwrap();
        assert_eq!(delivered.triggers[0].run, 7);
        assert_eq!(delivered.recent.len(), 7);
    }

    #[tokio::test]
    async fn test_prune_idle_locks_keeps_cached_sources() {
        let h = harness(vec![]);
        h.engine.ingest(&message("g1", 1, 3)).await;
        h.engine.ingest(&message("g2", 2, 3)).await;
        assert_eq!(h.engine.prune_idle_locks(), 0);

        h.engine.cache().invalidate("g2");
        assert_eq!(h.engine.prune_idle_locks(), 1);
        assert_eq!(h.engine.prune_idle_locks(), 0);

        // A pruned source gets a fresh lock on its next message.
        assert!(h.engine.ingest(&message("g2", 3, 3)).await.is_accepted());
        assert_eq!(h.engine.source_locks.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_same_period_accepted_once() {
        let h = harness(vec![]);
        let engine = Arc::new(h.engine);
        let msg = message("g1", 1, 6);
        let (a, b) = tokio::join!(engine.ingest(&msg), engine.ingest(&msg));
        let accepted = [a, b].iter().filter(|s| s.is_accepted()).count();
        assert_eq!(accepted, 1);
        assert_eq!(h.store.len(), 1);
    }

    #[test]
    fn test_collect_triggers_respects_watch_list() {
        let history: Vec<Outcome> = [6u8, 6, 6]
            .iter()
            .enumerate()
            .map(|(i, f)| Outcome {
                period_id: format!("p{}", i),
                face: Face::new(*f).unwrap(),
                source_id: "g1".into(),
                source_name: "g1".into(),
                observed_at: start() - chrono::Duration::minutes(i as i64),
                sequence_hint: None,
            })
            .collect();
        let report = streak::evaluate(&history);

        let all = collect_triggers(&rule("a", 3, None), &report);
        let classes: Vec<_> = all.iter().map(|t| t.classification).collect();
        assert_eq!(
            classes,
            vec![Classification::High, Classification::Even, Classification::HighEven]
        );

        let only_low = collect_triggers(&rule("a", 3, Some(vec![Classification::Low])), &report);
        assert!(only_low.is_empty());
    }
}
