//! Streak evaluator.
//!
//! Pure function over a newest-first history. For every predicate
//! classification it reports the current run of matches ("hot") or the
//! current run of misses ("missing"); exactly one of the two is non-zero.
//! Alternation is measured per [`Partition`] and the longer run wins. It
//! has no absence run.

use std::collections::BTreeMap;

use common::{Classification, Face, Outcome, Partition};
use serde::Serialize;

/// Fewer outcomes than this never form a streak.
pub const MIN_SAMPLES: usize = 2;

/// Current run lengths for one classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreakResult {
    pub match_run: u32,
    pub absence_run: u32,
}

/// Per-classification results of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakReport {
    results: BTreeMap<Classification, StreakResult>,
    /// Partition that produced the alternation run.
    alternation_partition: Partition,
}

impl StreakReport {
    pub fn get(&self, classification: Classification) -> StreakResult {
        self.results
            .get(&classification)
            .copied()
            .unwrap_or_default()
    }

    pub fn match_run(&self, classification: Classification) -> u32 {
        self.get(classification).match_run
    }

    pub fn iter(&self) -> impl Iterator<Item = (Classification, StreakResult)> + '_ {
        self.results.iter().map(|(c, r)| (*c, *r))
    }

    pub fn alternation_partition(&self) -> Partition {
        self.alternation_partition
    }
}

fn run_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Leading run for a per-face predicate: `(match_run, absence_run)`.
fn predicate_run(history: &[Outcome], pred: fn(Face) -> bool) -> StreakResult {
    let Some(newest) = history.first() else {
        return StreakResult::default();
    };
    let hot = pred(newest.face);
    let run = run_count(history.iter().take_while(|o| pred(o.face) == hot).count());
    if hot {
        StreakResult {
            match_run: run,
            absence_run: 0,
        }
    } else {
        StreakResult {
            match_run: 0,
            absence_run: run,
        }
    }
}

/// Length of the toggling run on `partition`, seeded at 1 for the newest
/// outcome and stopping at the first repeated side.
fn alternation_run(history: &[Outcome], partition: Partition) -> u32 {
    let toggles = history
        .windows(2)
        .take_while(|pair| partition.side(pair[0].face) != partition.side(pair[1].face))
        .count();
    run_count(1 + toggles)
}

/// Evaluate every classification against `history` (newest first).
///
/// Total over all inputs. Histories shorter than [`MIN_SAMPLES`] report no
/// runs, except the alternation seed of 1.
pub fn evaluate(history: &[Outcome]) -> StreakReport {
    let mut results = BTreeMap::new();
    let mut best_partition = Partition::HighLow;

    if history.len() < MIN_SAMPLES {
        for classification in Classification::ALL {
            let result = if classification == Classification::Alternation {
                StreakResult {
                    match_run: 1,
                    absence_run: 0,
                }
            } else {
                StreakResult::default()
            };
            results.insert(classification, result);
        }
        return StreakReport {
            results,
            alternation_partition: best_partition,
        };
    }

    for classification in Classification::ALL {
        let result = match classification.predicate() {
            Some(pred) => predicate_run(history, pred),
            None => {
                let mut best = 0;
                for partition in Partition::ALL {
                    let run = alternation_run(history, partition);
                    if run > best {
                        best = run;
                        best_partition = partition;
                    }
                }
                StreakResult {
                    match_run: best,
                    absence_run: 0,
                }
            }
        };
        results.insert(classification, result);
    }

    StreakReport {
        results,
        alternation_partition: best_partition,
    }
}
