//! Deduplication window over recently accepted period ids.
//!
//! A fast path only: the durable store's uniqueness constraint is the
//! authority. When the set outgrows its capacity it is cleared in one go,
//! which can let an old period be evaluated again but never drops a new one.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::debug;

#[derive(Debug)]
pub struct DedupWindow {
    capacity: usize,
    seen: Mutex<HashSet<String>>,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Whether `period_id` was marked since the last clear.
    pub fn seen(&self, period_id: &str) -> bool {
        self.lock().contains(period_id)
    }

    /// Remember `period_id`, clearing the whole window first if it is full.
    pub fn mark_seen(&self, period_id: &str) {
        let mut seen = self.lock();
        if seen.contains(period_id) {
            return;
        }
        if seen.len() >= self.capacity {
            debug!("dedup window full ({} ids), clearing", seen.len());
            seen.clear();
        }
        seen.insert(period_id.to_string());
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // A poisoned set is still a valid set.
        self.seen.lock().unwrap_or_else(|e| e.into_inner())
    }
}
