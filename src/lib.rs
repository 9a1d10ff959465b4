//! # L2 Book Reconstructor
//!
//! Deterministic L2 order-book reconstruction from order-level exchange
//! records.
//!
//! Raw add / cancel / trade records go in, per symbol and in arrival order.
//! Consistent limit-order-book state and canonical market events come out:
//! full snapshots, incremental level updates and trades. Replaying the same
//! records from cold state always yields bit-identical books and events.
//!
//! ## Features
//!
//! - **Vendor-agnostic normalization**: heterogeneous tags and side codes
//!   map to three canonical commands, in strict or lenient mode
//! - **Sequence validation**: duplicates are no-ops, gaps put the symbol
//!   into recovery until a fresh snapshot arrives
//! - **Exact ladders**: fixed-point prices, FIFO time priority per level,
//!   cached level aggregates checked against their orders
//! - **Per-symbol fault isolation**: one broken feed never stops the others
//! - **Thread-safe engine**: independent symbols process in parallel
//!
//! ## Quick Start
//!
//! ```rust
//! use l2_book_reconstructor::{EngineConfig, RawRecord, ReconstructionEngine, Side};
//!
//! let mut engine = ReconstructionEngine::new(EngineConfig::new(10)).unwrap();
//!
//! engine.process(&RawRecord::add("AAPL", 1, 1, Side::Buy, 10.0, 100)).unwrap();
//! engine.process(&RawRecord::add("AAPL", 2, 2, Side::Buy, 10.0, 50)).unwrap();
//!
//! let events = engine
//!     .process(&RawRecord::trade("AAPL", 3, 1, 60, Some(10.0)))
//!     .unwrap();
//! let trade = events[0].as_trade().unwrap();
//! assert_eq!((trade.price_f64(), trade.volume), (10.0, 60));
//!
//! engine.process(&RawRecord::cancel("AAPL", 4, 2, None)).unwrap();
//!
//! let snapshot = engine.snapshot("AAPL", None).unwrap();
//! assert_eq!(snapshot.ladder(Side::Buy), vec![(10.0, 40)]);
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Raw records, commands, resting orders, lifecycle, fixed-point prices |
//! | [`events`] | Canonical events: `SnapshotEvent`, `OrderBookUpdateEvent`, `TradeEvent` |
//! | [`normalizer`] | `EventNormalizer`: raw record → command |
//! | [`sequence`] | `SequenceValidator`: duplicate / gap detection |
//! | [`lob`] | Book state, ledger, per-symbol reconstructor, engines |
//! | [`config`] | `EngineConfig` and its policy enums |
//! | [`view`] | `MarketDataView` contract and `ReplayMarketView` |
//! | [`source`] | `RecordSource` trait for the ingestion side |
//! | [`manifest`] | `ProgressManifest` for skipping finished sources |
//! | [`warnings`] | Warning tracking: `WarningTracker`, `Warning`, `WarningCategory` |

pub mod config;
pub mod error;
pub mod events;
pub mod lob;
pub mod manifest;
pub mod normalizer;
pub mod sequence;
pub mod source;
pub mod types;
pub mod view;
pub mod warnings;

// Re-exports - Core types
pub use error::{ReconError, Result};
pub use types::{
    fixed_to_price, price_to_fixed, try_price_to_fixed, BookLifecycle, Command, OrderAdd,
    OrderCancel, OrderRecord, OrderSnapshot, OrderTrade, RawRecord, RecoveryCause, RestingOrder,
    Side, PRICE_SCALE,
};

// Re-exports - Events
pub use events::{LevelQuote, MarketEvent, OrderBookUpdateEvent, SnapshotEvent, TradeEvent};

// Re-exports - Configuration
pub use config::{EngineConfig, NormalizationMode, RecoveryPolicy, SnapshotCadence};

// Re-exports - Pipeline stages
pub use normalizer::{EventNormalizer, MessageKind};
pub use sequence::{SequenceCheck, SequenceValidator};

// Re-exports - Reconstruction
pub use lob::{
    BookStats, EngineStats, OrderBookState, PriceLevel, PriceLevelLedger, ReconstructionEngine,
    ReplayReport, SharedEngine, SnapshotEmitter, SnapshotLoad, SymbolFault, SymbolReconstructor,
};

// Re-exports - Downstream view
pub use view::{BookFeatures, MarketDataView, ReplayMarketView};

// Re-exports - Ingestion and progress
pub use manifest::{InMemoryManifest, JsonFileManifest, ManifestConfig, ProgressManifest};
pub use source::{RecordSource, SourceMetadata, VecSource};

// Re-exports - Warnings
pub use warnings::{
    Warning, WarningCategory, WarningSummary, WarningTracker, WarningTrackerConfig,
};
