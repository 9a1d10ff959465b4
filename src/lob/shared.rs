//! Thread-safe multi-symbol engine.
//!
//! Each symbol lives behind its own `RwLock`, so one writer per symbol runs
//! while distinct symbols proceed in parallel. The registry lock is held
//! only long enough to find or create a symbol's slot.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use super::reconstructor::{BookStats, SnapshotLoad, SymbolReconstructor};
use crate::config::EngineConfig;
use crate::error::{ReconError, Result};
use crate::events::{MarketEvent, SnapshotEvent};
use crate::types::{BookLifecycle, OrderSnapshot, RawRecord};

type SymbolSlot = Arc<RwLock<SymbolReconstructor>>;

/// Engine shareable across threads (`Clone` shares the same books).
///
/// # Example
/// ```
/// use l2_book_reconstructor::{EngineConfig, RawRecord, SharedEngine, Side};
///
/// let engine = SharedEngine::new(EngineConfig::default()).unwrap();
/// let worker = engine.clone();
///
/// std::thread::spawn(move || {
///     worker.process(&RawRecord::add("NVDA", 1, 1, Side::Buy, 120.0, 10)).unwrap();
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(engine.snapshot("NVDA", None).unwrap().bids.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SharedEngine {
    config: Arc<EngineConfig>,
    books: Arc<RwLock<AHashMap<String, SymbolSlot>>>,
}

impl SharedEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            books: Arc::new(RwLock::new(AHashMap::new())),
        })
    }

    fn slot(&self, symbol: &str) -> Option<SymbolSlot> {
        self.books.read().get(symbol).cloned()
    }

    /// Find a symbol's slot, creating it on first sight.
    fn slot_or_create(&self, symbol: &str) -> SymbolSlot {
        if let Some(slot) = self.slot(symbol) {
            return slot;
        }
        let mut books = self.books.write();
        // Another writer may have created it between the two locks
        Arc::clone(books.entry(symbol.to_string()).or_insert_with(|| {
            Arc::new(RwLock::new(SymbolReconstructor::with_config(
                symbol,
                Arc::clone(&self.config),
            )))
        }))
    }

    fn existing(&self, symbol: &str) -> Result<SymbolSlot> {
        self.slot(symbol)
            .ok_or_else(|| ReconError::SymbolNotFound(symbol.to_string()))
    }

    /// Process one record under its symbol's write lock.
    pub fn process(&self, raw: &RawRecord) -> Result<Vec<MarketEvent>> {
        if raw.symbol.is_empty() {
            return Err(ReconError::MalformedRecord {
                symbol: String::new(),
                reason: "missing symbol".to_string(),
            });
        }
        let slot = self.slot_or_create(&raw.symbol);
        let mut book = slot.write();
        book.process(raw)
    }

    /// Process per-symbol batches on scoped threads, one thread per batch.
    ///
    /// Each batch must hold a single symbol's records in arrival order.
    /// Results come back in batch order; a batch stops at its first fatal
    /// error.
    pub fn process_parallel(
        &self,
        batches: Vec<Vec<RawRecord>>,
    ) -> Vec<Result<Vec<MarketEvent>>> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = batches
                .iter()
                .map(|batch| scope.spawn(move || self.process_batch(batch)))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(ReconError::generic("batch worker panicked")))
                })
                .collect()
        })
    }

    fn process_batch(&self, batch: &[RawRecord]) -> Result<Vec<MarketEvent>> {
        let mut events = Vec::new();
        for raw in batch {
            match self.process(raw) {
                Ok(emitted) => events.extend(emitted),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    if self.config.log_warnings {
                        log::warn!("{err}");
                    }
                }
            }
        }
        Ok(events)
    }

    /// Load an order-level snapshot (symbol created if unseen).
    pub fn load_snapshot(&self, symbol: &str, snapshot: &OrderSnapshot) -> Result<SnapshotLoad> {
        let slot = self.slot_or_create(symbol);
        let mut book = slot.write();
        book.load_snapshot(snapshot)
    }

    /// Reset a symbol; readers see either the old book or the empty one.
    pub fn reset(&self, symbol: &str) -> Result<()> {
        let slot = self.existing(symbol)?;
        slot.write().reset();
        Ok(())
    }

    pub fn snapshot(&self, symbol: &str, ts: Option<i64>) -> Result<SnapshotEvent> {
        let slot = self.existing(symbol)?;
        let book = slot.read();
        Ok(book.snapshot(ts))
    }

    pub fn lifecycle(&self, symbol: &str) -> Option<BookLifecycle> {
        let slot = self.slot(symbol)?;
        let lifecycle = slot.read().lifecycle();
        Some(lifecycle)
    }

    pub fn book_stats(&self, symbol: &str) -> Result<BookStats> {
        let slot = self.existing(symbol)?;
        let stats = slot.read().stats().clone();
        Ok(stats)
    }

    /// Run `f` against a symbol's reconstructor under its read lock.
    pub fn with_symbol<R>(
        &self,
        symbol: &str,
        f: impl FnOnce(&SymbolReconstructor) -> R,
    ) -> Result<R> {
        let slot = self.existing(symbol)?;
        let book = slot.read();
        Ok(f(&book))
    }

    /// Tracked symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.books.read().keys().cloned().collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn symbol_count(&self) -> usize {
        self.books.read().len()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn engine() -> SharedEngine {
        SharedEngine::new(EngineConfig::default().with_logging(false)).unwrap()
    }

    fn batch(symbol: &str, n: i64) -> Vec<RawRecord> {
        (1..=n)
            .map(|i| {
                let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                let offset = i as f64 * 0.01;
                let price = if side.is_buy() {
                    100.0 - offset
                } else {
                    100.0 + offset
                };
                RawRecord::add(symbol, i, i, side, price, 10).with_sequence(i as u64)
            })
            .collect()
    }

    #[test]
    fn test_parallel_symbols_match_sequential() {
        let symbols = ["AAPL", "MSFT", "NVDA", "TSLA"];
        let shared = engine();
        let results = shared.process_parallel(symbols.iter().map(|s| batch(s, 200)).collect());
        assert!(results.iter().all(Result::is_ok));

        for symbol in symbols {
            let mut solo = SymbolReconstructor::with_config(
                symbol,
                Arc::new(EngineConfig::default().with_logging(false)),
            );
            for raw in batch(symbol, 200) {
                solo.process(&raw).unwrap();
            }
            assert_eq!(shared.snapshot(symbol, None).unwrap(), solo.snapshot(None));
        }
        assert_eq!(shared.symbol_count(), 4);
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let shared = engine();
        shared.process(&batch("AAPL", 1)[0]).unwrap();

        std::thread::scope(|scope| {
            let writer = shared.clone();
            scope.spawn(move || {
                for raw in batch("AAPL", 500).into_iter().skip(1) {
                    writer.process(&raw).unwrap();
                }
            });
            for _ in 0..4 {
                let reader = shared.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        let snap = reader.snapshot("AAPL", None).unwrap();
                        assert!(snap.bids.len() + snap.asks.len() >= 1);
                    }
                });
            }
        });

        assert_eq!(shared.book_stats("AAPL").unwrap().adds, 500);
    }

    #[test]
    fn test_reset_under_shared_engine() {
        let shared = engine();
        for raw in batch("AAPL", 10) {
            shared.process(&raw).unwrap();
        }
        shared.reset("AAPL").unwrap();
        assert_eq!(shared.lifecycle("AAPL"), Some(BookLifecycle::Uninitialized));
        assert!(shared
            .with_symbol("AAPL", |r| r.book().is_empty())
            .unwrap());
        assert!(matches!(
            shared.reset("MSFT"),
            Err(ReconError::SymbolNotFound(_))
        ));
    }

    #[test]
    fn test_fatal_batch_does_not_stop_others() {
        let shared = engine();
        let mut bad = batch("BAD", 3);
        bad.push(RawRecord::new("BAD").with_event("add").with_sequence(4));
        bad.extend(batch("BAD", 6).into_iter().skip(4));

        let results = shared.process_parallel(vec![bad, batch("GOOD", 6)]);
        assert!(matches!(results[0], Err(ReconError::MalformedRecord { .. })));
        assert!(results[1].is_ok());
        assert!(shared.lifecycle("BAD").unwrap().is_faulted());
        assert_eq!(shared.lifecycle("GOOD"), Some(BookLifecycle::Streaming));
    }
}
