//! Per-symbol arrival sequence validation.

use serde::{Deserialize, Serialize};

/// Classification of one incoming sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Next expected number (or the baseline); already committed as last seen
    InOrder(u64),
    /// At or below the last number seen; drop as a no-op
    Duplicate { last: u64, received: u64 },
    /// Skipped ahead; last seen is left unchanged
    Gap { expected: u64, received: u64 },
    /// Unsequenced record after `u64::MAX`; nothing can be synthesized
    Exhausted { last: u64 },
}

/// Counters kept by the validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStats {
    pub in_order: u64,
    pub duplicates: u64,
    pub gaps: u64,
}

/// Tracks `last_sequence_number` for one symbol.
///
/// Records without a sequence number are assigned `last + 1`, so unsequenced
/// feeds never gap or duplicate. The first sequenced record after creation
/// or reset is accepted as the baseline.
#[derive(Debug, Clone, Default)]
pub struct SequenceValidator {
    last: Option<u64>,
    stats: SequenceStats,
}

impl SequenceValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a sequence number and commit it if in order.
    pub fn check(&mut self, sequence: Option<u64>) -> SequenceCheck {
        let received = match (sequence, self.last) {
            (Some(seq), _) => seq,
            (None, None) => 1,
            (None, Some(last)) => match last.checked_add(1) {
                Some(next) => next,
                None => return SequenceCheck::Exhausted { last },
            },
        };

        let verdict = match self.last {
            None => SequenceCheck::InOrder(received),
            Some(last) if received <= last => SequenceCheck::Duplicate { last, received },
            Some(last) if received == last + 1 => SequenceCheck::InOrder(received),
            Some(last) => SequenceCheck::Gap {
                expected: last + 1,
                received,
            },
        };

        match verdict {
            SequenceCheck::InOrder(seq) => {
                self.last = Some(seq);
                self.stats.in_order += 1;
            }
            SequenceCheck::Duplicate { .. } => self.stats.duplicates += 1,
            SequenceCheck::Gap { .. } => self.stats.gaps += 1,
            SequenceCheck::Exhausted { .. } => {}
        }

        verdict
    }

    /// Last committed sequence number.
    #[inline]
    pub fn last(&self) -> Option<u64> {
        self.last
    }

    /// Rebase onto a snapshot's sequence (`None` forgets the baseline).
    pub fn reset_to(&mut self, sequence: Option<u64>) {
        self.last = sequence;
    }

    #[inline]
    pub fn stats(&self) -> SequenceStats {
        self.stats
    }
}
