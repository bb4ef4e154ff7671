//! Domain types shared across the bot.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Faces ─────────────────────────────────────────────────────────────

/// A single face value in `Face::MIN..=Face::MAX`.
///
/// Construction is checked, so any `Face` in hand is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Face(u8);

impl Face {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 6;
    /// Faces at or above this value are "high".
    pub const MIDPOINT: u8 = 4;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_high(self) -> bool {
        self.0 >= Self::MIDPOINT
    }

    pub fn is_low(self) -> bool {
        !self.is_high()
    }

    pub fn is_odd(self) -> bool {
        self.0 % 2 == 1
    }

    pub fn is_even(self) -> bool {
        !self.is_odd()
    }
}

impl TryFrom<u8> for Face {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Face::new(value)
            .ok_or_else(|| format!("face {} outside {}..={}", value, Face::MIN, Face::MAX))
    }
}

impl From<Face> for u8 {
    fn from(face: Face) -> Self {
        face.0
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Classifications ───────────────────────────────────────────────────

/// Binary partitions of the face alphabet used by the alternation metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    HighLow,
    OddEven,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::HighLow, Partition::OddEven];

    /// Which side of the partition `face` falls on.
    pub fn side(self, face: Face) -> bool {
        match self {
            Partition::HighLow => face.is_high(),
            Partition::OddEven => face.is_odd(),
        }
    }
}

/// The closed set of patterns a subscriber can be alerted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    High,
    Low,
    Odd,
    Even,
    HighOdd,
    HighEven,
    LowOdd,
    LowEven,
    /// Consecutive outcomes toggling sides of a [`Partition`]. Not a per-face predicate.
    Alternation,
}

fn high_odd(face: Face) -> bool {
    face.is_high() && face.is_odd()
}

fn high_even(face: Face) -> bool {
    face.is_high() && face.is_even()
}

fn low_odd(face: Face) -> bool {
    face.is_low() && face.is_odd()
}

fn low_even(face: Face) -> bool {
    face.is_low() && face.is_even()
}

impl Classification {
    pub const ALL: [Classification; 9] = [
        Classification::High,
        Classification::Low,
        Classification::Odd,
        Classification::Even,
        Classification::HighOdd,
        Classification::HighEven,
        Classification::LowOdd,
        Classification::LowEven,
        Classification::Alternation,
    ];

    /// Per-face membership test. `None` for `Alternation`, whose membership
    /// depends on neighbouring outcomes.
    pub fn predicate(self) -> Option<fn(Face) -> bool> {
        match self {
            Classification::High => Some(Face::is_high),
            Classification::Low => Some(Face::is_low),
            Classification::Odd => Some(Face::is_odd),
            Classification::Even => Some(Face::is_even),
            Classification::HighOdd => Some(high_odd),
            Classification::HighEven => Some(high_even),
            Classification::LowOdd => Some(low_odd),
            Classification::LowEven => Some(low_even),
            Classification::Alternation => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Classification::High => "high",
            Classification::Low => "low",
            Classification::Odd => "odd",
            Classification::Even => "even",
            Classification::HighOdd => "high-odd",
            Classification::HighEven => "high-even",
            Classification::LowOdd => "low-odd",
            Classification::LowEven => "low-even",
            Classification::Alternation => "alternation",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────

/// Raw inbound text as handed over by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub text: String,
    pub source_id: String,
    #[serde(default)]
    pub source_name: String,
    /// Transport-assigned message id, if any.
    #[serde(default)]
    pub event_id: Option<i64>,
    pub received_at: DateTime<Utc>,
}

/// One observed, validated outcome. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub period_id: String,
    pub face: Face,
    pub source_id: String,
    pub source_name: String,
    pub observed_at: DateTime<Utc>,
    /// External ordinal used only to break `observed_at` ties.
    pub sequence_hint: Option<i64>,
}

impl Outcome {
    /// Newest-first ordering: later `observed_at` sorts first, ties broken
    /// by higher `sequence_hint`.
    pub fn recency_cmp(&self, other: &Outcome) -> Ordering {
        other
            .observed_at
            .cmp(&self.observed_at)
            .then_with(|| other.sequence_hint.cmp(&self.sequence_hint))
    }
}

// ── Subscriber Rules ──────────────────────────────────────────────────

/// A subscriber's alert threshold. Owned by the configuration collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberRule {
    pub subscriber_id: String,
    /// Where notifications go. Empty means the subscriber id itself.
    #[serde(default)]
    pub destination: String,
    /// Restrict the rule to one source. `None` applies to every source.
    #[serde(default)]
    pub source_id: Option<String>,
    pub threshold: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Restrict the rule to these classifications. `None` watches all.
    #[serde(default)]
    pub watch: Option<Vec<Classification>>,
}

fn default_true() -> bool {
    true
}

impl SubscriberRule {
    pub fn destination(&self) -> &str {
        if self.destination.is_empty() {
            &self.subscriber_id
        } else {
            &self.destination
        }
    }

    pub fn applies_to(&self, source_id: &str) -> bool {
        self.enabled
            && self
                .source_id
                .as_deref()
                .map_or(true, |scope| scope == source_id)
    }

    pub fn watches(&self, classification: Classification) -> bool {
        self.watch
            .as_ref()
            .map_or(true, |list| list.contains(&classification))
    }
}

// ── Notifications ─────────────────────────────────────────────────────

/// One classification that crossed a rule's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub classification: Classification,
    pub run: u32,
}

/// Everything a notifier needs to render and deliver one alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub subscriber_id: String,
    pub destination: String,
    pub source_id: String,
    pub source_name: String,
    /// The outcome whose arrival produced this notification.
    pub outcome: Outcome,
    /// Every crossing classification, longest run first.
    pub triggers: Vec<Trigger>,
    /// Newest-first history covering the longest triggered run.
    pub recent: Vec<Outcome>,
}

impl Notification {
    pub fn longest_run(&self) -> u32 {
        self.triggers.iter().map(|t| t.run).max().unwrap_or(0)
    }
}
