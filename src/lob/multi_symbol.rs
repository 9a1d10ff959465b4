//! Multi-symbol reconstruction engine.
//!
//! Routes raw records to one `SymbolReconstructor` per symbol, creating them
//! lazily on first sight. Faults are scoped: a faulted symbol keeps
//! rejecting its own records while every other symbol streams on.

use std::sync::Arc;

use ahash::AHashMap;

use super::reconstructor::{BookStats, SnapshotLoad, SymbolReconstructor};
use crate::config::EngineConfig;
use crate::error::{ReconError, Result};
use crate::events::{MarketEvent, SnapshotEvent};
use crate::manifest::ProgressManifest;
use crate::source::RecordSource;
use crate::types::{BookLifecycle, OrderSnapshot, RawRecord};

/// Single-threaded engine over many symbols.
///
/// # Example
/// ```
/// use l2_book_reconstructor::{EngineConfig, RawRecord, ReconstructionEngine, Side};
///
/// let mut engine = ReconstructionEngine::new(EngineConfig::default()).unwrap();
///
/// engine.process(&RawRecord::add("NVDA", 1, 1, Side::Buy, 120.0, 100)).unwrap();
/// engine.process(&RawRecord::add("TSLA", 2, 1, Side::Sell, 250.0, 10)).unwrap();
///
/// let nvda = engine.snapshot("NVDA", None).unwrap();
/// assert_eq!(nvda.bids.len(), 1);
/// assert_eq!(engine.symbols(), vec!["NVDA", "TSLA"]);
/// ```
#[derive(Debug)]
pub struct ReconstructionEngine {
    /// Shared read-only configuration
    config: Arc<EngineConfig>,

    /// Map of symbol -> reconstructor
    books: AHashMap<String, SymbolReconstructor>,

    stats: EngineStats,
}

/// Statistics for multi-symbol processing.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Total symbols tracked
    pub symbol_count: usize,

    /// Total records routed across all symbols
    pub total_records: u64,

    /// Records per symbol
    pub records_per_symbol: AHashMap<String, u64>,

    /// Errors returned by `process`, fatal or not
    pub errors: u64,
}

/// A symbol that errored during a replay.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFault {
    pub symbol: String,
    pub error: ReconError,
}

/// Outcome of replaying a batch of records with per-symbol isolation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    /// All emitted events, in processing order
    pub events: Vec<MarketEvent>,

    /// Records consumed
    pub records: u64,

    /// First fault (or gap) per symbol, in the order they happened
    pub faults: Vec<SymbolFault>,

    /// Records refused because their symbol was already faulted
    pub rejected: u64,
}

impl ReplayReport {
    /// True when no symbol faulted or gapped.
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

impl Default for ReconstructionEngine {
    fn default() -> Self {
        Self::from_shared(Arc::new(EngineConfig::default()))
    }
}

impl ReconstructionEngine {
    /// Create an engine after validating the configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_shared(Arc::new(config)))
    }

    /// Create an engine around an already shared configuration.
    pub fn from_shared(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            books: AHashMap::new(),
            stats: EngineStats::default(),
        }
    }

    fn book_mut(&mut self, symbol: &str) -> &mut SymbolReconstructor {
        if !self.books.contains_key(symbol) {
            log::debug!("tracking new symbol {symbol}");
            self.stats.symbol_count = self.books.len() + 1;
        }
        let config = &self.config;
        self.books
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolReconstructor::with_config(symbol, Arc::clone(config)))
    }

    /// Process one record for whatever symbol it names.
    ///
    /// See `SymbolReconstructor::process` for the per-symbol contract.
    pub fn process(&mut self, raw: &RawRecord) -> Result<Vec<MarketEvent>> {
        if raw.symbol.is_empty() {
            self.stats.errors += 1;
            return Err(ReconError::MalformedRecord {
                symbol: String::new(),
                reason: "missing symbol".to_string(),
            });
        }

        let result = self.book_mut(&raw.symbol).process(raw);

        self.stats.total_records += 1;
        *self
            .stats
            .records_per_symbol
            .entry(raw.symbol.clone())
            .or_insert(0) += 1;
        if result.is_err() {
            self.stats.errors += 1;
        }

        result
    }

    /// Apply records in order and concatenate their events.
    ///
    /// Sequence gaps do not stop the run (the symbol buffers until a
    /// snapshot arrives). The first fatal error stops it and is returned.
    pub fn apply_all<'a, I>(&mut self, records: I) -> Result<Vec<MarketEvent>>
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        let mut events = Vec::new();
        for raw in records {
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

    /// Apply records in order, isolating faults per symbol.
    ///
    /// Unlike `apply_all` nothing stops the run; each symbol's first error
    /// is collected in the report.
    pub fn replay<I>(&mut self, records: I) -> ReplayReport
    where
        I: IntoIterator<Item = RawRecord>,
    {
        let mut report = ReplayReport::default();
        for raw in records {
            report.records += 1;
            match self.process(&raw) {
                Ok(emitted) => report.events.extend(emitted),
                Err(ReconError::SymbolFaulted(_)) => report.rejected += 1,
                Err(error) => {
                    if !report.faults.iter().any(|f| f.symbol == raw.symbol) {
                        report.faults.push(SymbolFault {
                            symbol: raw.symbol.clone(),
                            error,
                        });
                    }
                }
            }
        }
        report
    }

    /// Drain a record source through `replay`.
    pub fn run_source<S: RecordSource>(&mut self, source: S) -> Result<ReplayReport> {
        let label = source
            .metadata()
            .manifest_key()
            .unwrap_or_else(|| "<unnamed source>".to_string());
        let records = source.records()?;
        let report = self.replay(records);

        log::info!(
            "{label}: {} records, {} events, {} faulted symbols",
            report.records,
            report.events.len(),
            report.faults.len()
        );
        Ok(report)
    }

    /// Run a source unless the manifest already marks it done.
    ///
    /// Returns `None` when skipped. A clean run is marked done; otherwise
    /// the first fault is recorded as the failure reason.
    pub fn run_source_tracked<S: RecordSource>(
        &mut self,
        source: S,
        manifest: &dyn ProgressManifest,
    ) -> Result<Option<ReplayReport>> {
        let key = source
            .metadata()
            .manifest_key()
            .ok_or_else(|| ReconError::generic("source metadata has no manifest key"))?;

        if manifest.is_done(&key) {
            log::info!("{key}: already done, skipping");
            return Ok(None);
        }

        let report = self.run_source(source)?;
        match report.faults.first() {
            None => manifest.mark_done(&key)?,
            Some(fault) => {
                manifest.mark_failed(&key, &format!("{}: {}", fault.symbol, fault.error))?
            }
        }
        Ok(Some(report))
    }

    /// Load an order-level snapshot for a symbol (created if unseen).
    pub fn load_snapshot(
        &mut self,
        symbol: &str,
        snapshot: &OrderSnapshot,
    ) -> Result<SnapshotLoad> {
        self.book_mut(symbol).load_snapshot(snapshot)
    }

    /// Discard a symbol's book and return it to `Uninitialized`.
    pub fn reset(&mut self, symbol: &str) -> Result<()> {
        self.books
            .get_mut(symbol)
            .ok_or_else(|| ReconError::SymbolNotFound(symbol.to_string()))?
            .reset();
        Ok(())
    }

    /// Reset all symbols.
    pub fn reset_all(&mut self) {
        for book in self.books.values_mut() {
            book.reset();
        }
    }

    /// On-demand snapshot of a symbol.
    pub fn snapshot(&self, symbol: &str, ts: Option<i64>) -> Result<SnapshotEvent> {
        Ok(self.get(symbol)?.snapshot(ts))
    }

    /// Snapshots of every symbol, sorted by symbol.
    pub fn snapshot_all(&self, ts: Option<i64>) -> Vec<SnapshotEvent> {
        self.symbols()
            .into_iter()
            .filter_map(|symbol| self.books.get(symbol))
            .map(|book| book.snapshot(ts))
            .collect()
    }

    /// Borrow a symbol's reconstructor.
    pub fn get(&self, symbol: &str) -> Result<&SymbolReconstructor> {
        self.books
            .get(symbol)
            .ok_or_else(|| ReconError::SymbolNotFound(symbol.to_string()))
    }

    pub fn lifecycle(&self, symbol: &str) -> Option<BookLifecycle> {
        self.books.get(symbol).map(SymbolReconstructor::lifecycle)
    }

    pub fn symbol_stats(&self, symbol: &str) -> Result<&BookStats> {
        Ok(self.get(symbol)?.stats())
    }

    /// Tracked symbols, sorted.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.books.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn symbol_count(&self) -> usize {
        self.books.len()
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.books.contains_key(symbol)
    }

    /// Stop tracking a symbol entirely.
    pub fn remove_symbol(&mut self, symbol: &str) -> Result<()> {
        if self.books.remove(symbol).is_none() {
            return Err(ReconError::SymbolNotFound(symbol.to_string()));
        }
        self.stats.symbol_count = self.books.len();
        self.stats.records_per_symbol.remove(symbol);
        Ok(())
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
