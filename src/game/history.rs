//! Round History
//!
//! Newest-first record of finished rounds, bounded so a long-running client
//! does not grow without limit.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of rounds kept.
pub const HISTORY_LIMIT: usize = 200;

/// One finished round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Crash multiplier.
    pub multiplier: f64,
    /// Seed revealed after the crash, if the server published it.
    pub seed: Option<String>,
    /// Commitment hash published while the round was open.
    #[serde(default)]
    pub commitment: Option<String>,
    /// When this client saw the crash. `None` for bulk-loaded history.
    pub recorded_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    /// Entry without a local timestamp.
    pub fn new(multiplier: f64, seed: Option<String>) -> Self {
        Self {
            multiplier,
            seed,
            commitment: None,
            recorded_at: None,
        }
    }

    /// Visual tier of the multiplier.
    pub fn tier(&self) -> Tier {
        Tier::of(self.multiplier)
    }

    /// Whether a seed is available for verification.
    pub fn is_revealed(&self) -> bool {
        self.seed.is_some()
    }
}

/// Coarse bucket used when listing results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Below 2x.
    Low,
    /// From 2x up to 10x.
    Medium,
    /// 10x and above.
    High,
}

impl Tier {
    /// Classify a multiplier.
    pub fn of(multiplier: f64) -> Tier {
        if multiplier >= 10.0 {
            Tier::High
        } else if multiplier >= 2.0 {
            Tier::Medium
        } else {
            Tier::Low
        }
    }
}

/// Bounded newest-first list of rounds.
#[derive(Debug, Clone)]
pub struct RoundHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl RoundHistory {
    /// Create an empty history holding at most `limit` rounds.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Record a newly crashed round at the front.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.limit);
    }

    /// Replace everything with a newest-first list from the server.
    pub fn replace<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = HistoryEntry>,
    {
        self.entries = entries.into_iter().take(self.limit).collect();
    }

    /// Most recent round.
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    /// Iterate newest-first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Rounds whose seed has been revealed, newest-first.
    pub fn revealed(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(|e| e.is_revealed())
    }

    /// Number of rounds held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no rounds are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capacity bound.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Copy out newest-first.
    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for RoundHistory {
    fn default() -> Self {
        Self::new(HISTORY_LIMIT)
    }
}
