//! Snapshot production and cadence tracking.

use crate::config::SnapshotCadence;
use crate::events::SnapshotEvent;
use crate::lob::book::OrderBookState;
use crate::types::Side;

/// Builds `SnapshotEvent`s at a fixed depth and decides when the periodic
/// cadence is due.
#[derive(Debug, Clone)]
pub struct SnapshotEmitter {
    /// Levels per side (0 = full depth)
    depth: usize,
    cadence: SnapshotCadence,
    commands_since_last: u64,
    last_snapshot_ts: Option<i64>,
}

impl SnapshotEmitter {
    pub fn new(depth: usize, cadence: SnapshotCadence) -> Self {
        Self {
            depth,
            cadence,
            commands_since_last: 0,
            last_snapshot_ts: None,
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Restate the book at the configured depth.
    pub fn snapshot(
        &self,
        symbol: &str,
        ts: i64,
        book: &OrderBookState,
        sequence: u64,
    ) -> SnapshotEvent {
        SnapshotEvent {
            symbol: symbol.to_string(),
            ts,
            bids: book.depth(Side::Buy, self.depth),
            asks: book.depth(Side::Sell, self.depth),
            last_price: book.last_trade_price(),
            sequence,
        }
    }

    /// Count one applied command and report whether the cadence is due.
    ///
    /// The time cadence anchors on the first command it sees, so the first
    /// periodic snapshot comes one interval into the stream.
    pub fn on_command(&mut self, ts: i64) -> bool {
        self.commands_since_last += 1;
        match self.cadence {
            SnapshotCadence::Never => false,
            SnapshotCadence::EveryCommands(n) => self.commands_since_last >= n,
            SnapshotCadence::EveryNanos(interval) => match self.last_snapshot_ts {
                None => {
                    self.last_snapshot_ts = Some(ts);
                    false
                }
                Some(last) => ts.saturating_sub(last) >= interval,
            },
        }
    }

    /// Restart the cadence after any snapshot (periodic or not).
    pub fn mark_emitted(&mut self, ts: i64) {
        self.commands_since_last = 0;
        self.last_snapshot_ts = Some(ts);
    }

    pub fn reset(&mut self) {
        self.commands_since_last = 0;
        self.last_snapshot_ts = None;
    }
}
