//! Sequence Tracking
//!
//! Per-market bookkeeping of the last order-book sequence number. A frame is
//! in order when its sequence is exactly one past the last accepted value.
//! Anything else after the first observation is a gap; the new value is still
//! recorded so that tracking continues from it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Result of observing a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Frame carried no sequence number.
    Unsequenced,
    /// First sequence seen for this market.
    First,
    /// Exactly one past the previous value.
    InOrder,
    /// Anything other than previous + 1.
    Gap {
        /// Last accepted sequence.
        last: u64,
        /// Sequence that was received.
        received: u64,
    },
}

impl SequenceCheck {
    /// Whether this observation is a gap.
    #[must_use]
    pub const fn is_gap(self) -> bool {
        matches!(self, Self::Gap { .. })
    }
}

/// Last-seen sequence per market.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: RwLock<HashMap<String, u64>>,
    gaps: AtomicU64,
}

impl SequenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sequence` for `pair` and classify it against the previous one.
    pub fn observe(&self, pair: &str, sequence: Option<u64>) -> SequenceCheck {
        let Some(received) = sequence else {
            return SequenceCheck::Unsequenced;
        };

        let mut last = self.last.write();
        let check = match last.get(pair).copied() {
            None => SequenceCheck::First,
            Some(previous) if previous.checked_add(1) == Some(received) => SequenceCheck::InOrder,
            Some(previous) => SequenceCheck::Gap {
                last: previous,
                received,
            },
        };
        last.insert(pair.to_string(), received);
        drop(last);

        if check.is_gap() {
            self.gaps.fetch_add(1, Ordering::Relaxed);
        }
        check
    }

    /// Rebase `pair` to `sequence`, or forget it when `None`.
    pub fn reset(&self, pair: &str, sequence: Option<u64>) {
        let mut last = self.last.write();
        match sequence {
            Some(value) => {
                last.insert(pair.to_string(), value);
            }
            None => {
                last.remove(pair);
            }
        }
    }

    /// Last accepted sequence for `pair`.
    #[must_use]
    pub fn last(&self, pair: &str) -> Option<u64> {
        self.last.read().get(pair).copied()
    }

    /// Forget `pair` after a frame whose sequence could not be read.
    ///
    /// Counts as a gap. Returns the last sequence accepted before it.
    pub fn invalidate(&self, pair: &str) -> Option<u64> {
        let previous = self.last.write().remove(pair);
        self.gaps.fetch_add(1, Ordering::Relaxed);
        previous
    }

    /// Forget every market.
    pub fn clear(&self) {
        self.last.write().clear();
    }

    /// Gaps detected since creation.
    #[must_use]
    pub fn gap_count(&self) -> u64 {
        self.gaps.load(Ordering::Relaxed)
    }
}
