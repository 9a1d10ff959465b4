//! Single-symbol reconstructor.
//!
//! Owns everything one symbol needs: lifecycle state, sequence validator,
//! normalizer, book, snapshot cadence, recovery buffer, warnings and stats.
//! Records are processed strictly in arrival order:
//!
//! 1. lifecycle gate (faulted symbols reject, gapped symbols hold)
//! 2. sequence check (duplicates are no-ops, gaps enter recovery)
//! 3. normalization (strict faults / lenient drops)
//! 4. apply to the book
//! 5. emit trade, update and any due periodic snapshot

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, RecoveryPolicy};
use crate::error::{ReconError, Result};
use crate::events::{MarketEvent, OrderBookUpdateEvent, SnapshotEvent, TradeEvent};
use crate::lob::book::{ApplyOutcome, OrderBookState};
use crate::lob::snapshot::SnapshotEmitter;
use crate::normalizer::EventNormalizer;
use crate::sequence::{SequenceCheck, SequenceValidator};
use crate::types::{BookLifecycle, Command, OrderSnapshot, RawRecord, RecoveryCause};
use crate::warnings::{WarningCategory, WarningTracker};

/// Statistics for monitoring one symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookStats {
    /// Commands that mutated the book
    pub commands_applied: u64,
    pub adds: u64,
    pub cancels: u64,
    pub trades: u64,

    /// Cancels/trades for ids that were not resting
    pub orders_not_found: u64,

    /// Records dropped as duplicate sequence numbers
    pub duplicates: u64,

    /// Sequence gaps detected
    pub gaps: u64,

    /// Lenient-mode drops
    pub malformed_dropped: u64,
    pub unknown_dropped: u64,

    /// Records held while recovering from a gap
    pub buffered: u64,

    /// Records lost because the recovery buffer was full
    pub buffer_overflows: u64,

    /// Records discarded while recovering under the Drop policy
    pub recovery_dropped: u64,

    /// Buffered records replayed after a snapshot
    pub replayed: u64,

    /// Records rejected because the symbol was faulted
    pub rejected: u64,

    /// Fatal faults (invariant breach or strict normalization error)
    pub faults: u64,

    pub snapshots_emitted: u64,

    /// Explicit resets and snapshot loads
    pub resets: u64,

    /// Last event timestamp applied (nanoseconds since epoch)
    pub last_timestamp: Option<i64>,
}

/// Result of loading an order-level snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotLoad {
    /// Snapshot event plus everything emitted by the replayed records
    pub events: Vec<MarketEvent>,

    /// Buffered records re-processed after the snapshot
    pub replayed: usize,

    /// Buffered records already covered by the snapshot
    pub discarded: usize,

    /// First error hit while replaying, if any
    pub fault: Option<ReconError>,
}

/// Reconstructs one symbol's book from raw records.
#[derive(Debug, Clone)]
pub struct SymbolReconstructor {
    symbol: String,
    config: Arc<EngineConfig>,
    lifecycle: BookLifecycle,
    sequencer: SequenceValidator,
    normalizer: EventNormalizer,
    book: OrderBookState,
    emitter: SnapshotEmitter,

    /// Records held during gap recovery, arrival order
    buffer: VecDeque<RawRecord>,

    warnings: WarningTracker,
    stats: BookStats,
}

impl SymbolReconstructor {
    /// Create a reconstructor with default configuration.
    ///
    /// # Example
    /// ```
    /// use l2_book_reconstructor::{BookLifecycle, SymbolReconstructor};
    ///
    /// let recon = SymbolReconstructor::new("AAPL");
    /// assert_eq!(recon.lifecycle(), BookLifecycle::Uninitialized);
    /// ```
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_config(symbol, Arc::new(EngineConfig::default()))
    }

    /// Create a reconstructor sharing an engine-wide configuration.
    pub fn with_config(symbol: impl Into<String>, config: Arc<EngineConfig>) -> Self {
        Self {
            symbol: symbol.into(),
            lifecycle: BookLifecycle::Uninitialized,
            sequencer: SequenceValidator::new(),
            normalizer: EventNormalizer::new(config.mode),
            book: OrderBookState::new(),
            emitter: SnapshotEmitter::new(config.snapshot_depth, config.snapshot_cadence),
            buffer: VecDeque::new(),
            warnings: WarningTracker::with_config(config.warnings.clone()),
            stats: BookStats::default(),
            config,
        }
    }

    /// Process one raw record and return the events it produced.
    ///
    /// # Returns
    /// `Ok` with an empty vector for no-ops: duplicates, lenient drops,
    /// unknown order ids, and records held during gap recovery.
    ///
    /// # Errors
    /// - `SequenceGap`: the symbol entered recovery; supply a snapshot
    /// - `MalformedRecord` / `UnknownMessageType` (strict mode) and
    ///   `InvariantViolation`: the symbol is now faulted
    /// - `SymbolFaulted`: the symbol was already faulted
    pub fn process(&mut self, raw: &RawRecord) -> Result<Vec<MarketEvent>> {
        match self.lifecycle {
            BookLifecycle::Recovering(RecoveryCause::Fault) => {
                self.stats.rejected += 1;
                Err(ReconError::SymbolFaulted(self.symbol.clone()))
            }
            BookLifecycle::Recovering(RecoveryCause::SequenceGap) => {
                self.hold(raw);
                Ok(Vec::new())
            }
            _ => {
                let result = self.process_streaming(raw);
                if matches!(result, Err(ReconError::SequenceGap { .. })) {
                    // The gapped record itself waits for the snapshot too
                    self.hold(raw);
                }
                result
            }
        }
    }

    fn process_streaming(&mut self, raw: &RawRecord) -> Result<Vec<MarketEvent>> {
        let sequence = match self.sequencer.check(raw.sequence) {
            SequenceCheck::InOrder(seq) => seq,
            SequenceCheck::Duplicate { last, received } => {
                self.stats.duplicates += 1;
                self.warnings.record_sequence_warning(
                    WarningCategory::DuplicateSequence,
                    format!("{}: sequence {received} at or below {last}", self.symbol),
                    received,
                    raw.ts,
                );
                return Ok(Vec::new());
            }
            SequenceCheck::Exhausted { last } => {
                let err = ReconError::SequenceExhausted {
                    symbol: self.symbol.clone(),
                    last,
                };
                return Err(self.fault(err, raw.ts));
            }
            SequenceCheck::Gap { expected, received } => {
                self.stats.gaps += 1;
                self.lifecycle = BookLifecycle::Recovering(RecoveryCause::SequenceGap);
                self.warnings.record_sequence_warning(
                    WarningCategory::SequenceGap,
                    format!("{}: expected sequence {expected}, received {received}", self.symbol),
                    received,
                    raw.ts,
                );
                return Err(ReconError::SequenceGap {
                    symbol: self.symbol.clone(),
                    expected,
                    received,
                });
            }
        };

        // Uninitialized starts from an implied empty snapshot
        self.lifecycle = BookLifecycle::Streaming;

        let command = match self.normalizer.normalize(raw) {
            Ok(Some(command)) => command,
            Ok(None) => {
                self.record_lenient_drop(raw, sequence);
                return Ok(Vec::new());
            }
            Err(err) => return Err(self.fault(err, raw.ts)),
        };

        let outcome = match self.book.apply(&command) {
            Ok(outcome) => outcome,
            Err(ReconError::OrderNotFound(order_id)) => {
                self.stats.orders_not_found += 1;
                if self.config.log_warnings {
                    log::debug!(
                        "{}: order {} not found at sequence {}",
                        self.symbol,
                        order_id,
                        sequence
                    );
                }
                self.warnings.record_order_warning(
                    WarningCategory::OrderNotFound,
                    format!("{}: order {order_id} not resting", self.symbol),
                    order_id,
                    Some(command.ts()),
                );
                return Ok(Vec::new());
            }
            Err(err) => return Err(self.fault(err, Some(command.ts()))),
        };

        #[cfg(debug_assertions)]
        if let Err(err) = self.book.verify_invariants() {
            return Err(self.fault(err, Some(command.ts())));
        }

        self.record_applied(&command);
        Ok(self.emit(&command, outcome, sequence))
    }

    /// Build the events for one applied command: trade first, then the
    /// level update, then a periodic snapshot if one is due.
    fn emit(
        &mut self,
        command: &Command,
        outcome: ApplyOutcome,
        sequence: u64,
    ) -> Vec<MarketEvent> {
        let ts = command.ts();
        let mut events = Vec::with_capacity(2);

        if let Some(exec) = outcome.execution {
            events.push(MarketEvent::Trade(TradeEvent {
                symbol: self.symbol.clone(),
                ts,
                price: exec.price,
                volume: exec.volume,
                aggressor_side: exec.aggressor_side,
                resting_order_id: exec.resting_order_id,
            }));
        }

        events.push(MarketEvent::Update(OrderBookUpdateEvent {
            symbol: self.symbol.clone(),
            ts,
            side: outcome.level.side,
            price: outcome.level.price,
            volume: outcome.level.aggregate_volume,
        }));

        if self.emitter.on_command(ts) {
            events.push(MarketEvent::Snapshot(self.take_snapshot(ts, sequence)));
        }

        events
    }

    fn take_snapshot(&mut self, ts: i64, sequence: u64) -> SnapshotEvent {
        let snapshot = self.emitter.snapshot(&self.symbol, ts, &self.book, sequence);
        self.emitter.mark_emitted(ts);
        self.stats.snapshots_emitted += 1;
        snapshot
    }

    fn record_applied(&mut self, command: &Command) {
        self.stats.commands_applied += 1;
        match command {
            Command::Add(_) => self.stats.adds += 1,
            Command::Cancel(_) => self.stats.cancels += 1,
            Command::Trade(_) => self.stats.trades += 1,
        }
        self.stats.last_timestamp = Some(command.ts());
    }

    fn record_lenient_drop(&mut self, raw: &RawRecord, sequence: u64) {
        let unknown = self.normalizer.unknown_dropped() > self.stats.unknown_dropped;
        self.stats.malformed_dropped = self.normalizer.malformed_dropped();
        self.stats.unknown_dropped = self.normalizer.unknown_dropped();

        let category = if unknown {
            WarningCategory::UnknownMessageType
        } else {
            WarningCategory::MalformedRecord
        };
        self.warnings.record_sequence_warning(
            category,
            format!("{}: dropped record {:?}", self.symbol, raw.event),
            sequence,
            raw.ts,
        );
    }

    /// Hold a record during gap recovery according to policy.
    fn hold(&mut self, raw: &RawRecord) {
        match self.config.recovery_policy {
            RecoveryPolicy::Buffer if self.buffer.len() < self.config.recovery_buffer_capacity => {
                self.buffer.push_back(raw.clone());
                self.stats.buffered += 1;
            }
            RecoveryPolicy::Buffer => {
                self.stats.buffer_overflows += 1;
                self.warnings.record_simple(
                    WarningCategory::RecoveryDrop,
                    format!(
                        "{}: recovery buffer full ({} records)",
                        self.symbol, self.config.recovery_buffer_capacity
                    ),
                );
            }
            RecoveryPolicy::Drop => {
                self.stats.recovery_dropped += 1;
                if self.config.log_warnings {
                    log::debug!(
                        "{}: dropping record {:?} while recovering",
                        self.symbol,
                        raw.sequence
                    );
                }
            }
        }
    }

    /// Move into the faulted state and hand the error back.
    fn fault(&mut self, err: ReconError, ts: Option<i64>) -> ReconError {
        self.lifecycle = BookLifecycle::Recovering(RecoveryCause::Fault);
        self.stats.faults += 1;

        let category = match &err {
            ReconError::MalformedRecord { .. } => WarningCategory::MalformedRecord,
            ReconError::UnknownMessageType { .. } => WarningCategory::UnknownMessageType,
            _ => WarningCategory::InvariantViolation,
        };
        self.warnings
            .record_at(category, format!("{}: {err}", self.symbol), ts);
        err
    }

    /// Rebuild the book from an order-level snapshot.
    ///
    /// Counts as an explicit reset: any lifecycle (faulted included) is
    /// accepted. Buffered records newer than the snapshot are replayed;
    /// older ones are discarded.
    ///
    /// # Errors
    /// `InvariantViolation` if the snapshot itself is inconsistent; the
    /// symbol is then faulted with an empty book.
    pub fn load_snapshot(&mut self, snapshot: &OrderSnapshot) -> Result<SnapshotLoad> {
        let previous = self.lifecycle;

        if let Err(err) = self.book.load(snapshot) {
            self.buffer.clear();
            return Err(self.fault(err, Some(snapshot.ts)));
        }

        self.sequencer.reset_to(Some(snapshot.sequence));
        self.emitter.reset();
        self.stats.resets += 1;
        self.stats.last_timestamp = Some(snapshot.ts);
        self.lifecycle = if previous.is_recovering() {
            BookLifecycle::Streaming
        } else {
            BookLifecycle::SnapshotLoaded
        };

        self.warnings.record_sequence_warning(
            WarningCategory::BookCleared,
            format!(
                "{}: rebuilt from snapshot with {} orders",
                self.symbol,
                snapshot.orders.len()
            ),
            snapshot.sequence,
            Some(snapshot.ts),
        );
        if self.config.log_warnings {
            log::info!(
                "{}: snapshot loaded at sequence {} ({:?} -> {:?})",
                self.symbol,
                snapshot.sequence,
                previous,
                self.lifecycle
            );
        }

        let mut load = SnapshotLoad::default();
        if self.config.snapshot_on_recovery {
            load.events.push(MarketEvent::Snapshot(
                self.take_snapshot(snapshot.ts, snapshot.sequence),
            ));
        }

        let held = std::mem::take(&mut self.buffer);
        let mut held = held.into_iter();
        for raw in held.by_ref() {
            if raw.sequence.is_some_and(|seq| seq <= snapshot.sequence) {
                load.discarded += 1;
                continue;
            }
            // Snapshot older than the buffer: keep waiting for a newer one
            if self.lifecycle.is_recovering() {
                self.buffer.push_back(raw);
                continue;
            }
            match self.process_streaming(&raw) {
                Ok(events) => {
                    load.replayed += 1;
                    self.stats.replayed += 1;
                    load.events.extend(events);
                }
                Err(err @ ReconError::SequenceGap { .. }) => {
                    self.buffer.push_back(raw);
                    load.fault.get_or_insert(err);
                }
                Err(err) => {
                    load.fault.get_or_insert(err);
                    break;
                }
            }
        }
        load.discarded += held.count();

        Ok(load)
    }

    /// Discard the book wholesale and return to `Uninitialized`.
    pub fn reset(&mut self) {
        self.book.clear();
        self.sequencer.reset_to(None);
        self.emitter.reset();
        self.buffer.clear();
        self.lifecycle = BookLifecycle::Uninitialized;
        self.stats.resets += 1;
        self.warnings.record_simple(
            WarningCategory::BookCleared,
            format!("{}: reset", self.symbol),
        );
    }

    /// On-demand snapshot of the current book.
    ///
    /// `ts` defaults to the last applied timestamp (0 if none).
    pub fn snapshot(&self, ts: Option<i64>) -> SnapshotEvent {
        let ts = ts.or(self.stats.last_timestamp).unwrap_or(0);
        self.emitter
            .snapshot(&self.symbol, ts, &self.book, self.sequencer.last().unwrap_or(0))
    }

    /// Full consistency check of the book.
    pub fn verify_invariants(&self) -> Result<()> {
        self.book.verify_invariants()
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn lifecycle(&self) -> BookLifecycle {
        self.lifecycle
    }

    #[inline]
    pub fn book(&self) -> &OrderBookState {
        &self.book
    }

    #[inline]
    pub fn stats(&self) -> &BookStats {
        &self.stats
    }

    #[inline]
    pub fn warnings(&self) -> &WarningTracker {
        &self.warnings
    }

    /// Last committed arrival sequence.
    #[inline]
    pub fn last_sequence(&self) -> Option<u64> {
        self.sequencer.last()
    }

    /// Records currently held for replay.
    #[inline]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
