//! Streak detection engine.
//!
//! Parses outcome messages, filters duplicates, keeps a bounded per-source
//! history and raises notifications when a classification's run crosses a
//! subscriber threshold.

pub mod cache;
pub mod clock;
pub mod dedup;
pub mod engine;
pub mod memory;
pub mod parser;
pub mod ports;
pub mod router;
pub mod streak;

pub use cache::HistoryCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::DedupWindow;
pub use engine::{collect_triggers, IngestStats, IngestStatus, RuleEngine, StatsSnapshot};
pub use memory::{MemoryOutcomeStore, StaticRuleSource};
pub use parser::{parse, Rejection};
pub use ports::{Notifier, OutcomeStore, RuleSource};
pub use router::SourceRouter;
pub use streak::{evaluate, StreakReport, StreakResult};
