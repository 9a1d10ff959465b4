//! Order book reconstruction.
//!
//! Bottom-up: `PriceLevel` (FIFO + cached aggregate) → `PriceLevelLedger`
//! (sorted ladders) → `OrderBookState` (order index + ledger) →
//! `SymbolReconstructor` (lifecycle, sequencing, events) →
//! `ReconstructionEngine` / `SharedEngine` (many symbols).

pub mod book;
pub mod ledger;
mod multi_symbol;
pub mod price_level;
pub mod reconstructor;
mod shared;
pub mod snapshot;

pub use book::{ApplyOutcome, Execution, LevelChange, OrderBookState};
pub use ledger::PriceLevelLedger;
pub use multi_symbol::{EngineStats, ReconstructionEngine, ReplayReport, SymbolFault};
pub use price_level::PriceLevel;
pub use reconstructor::{BookStats, SnapshotLoad, SymbolReconstructor};
pub use shared::SharedEngine;
pub use snapshot::SnapshotEmitter;
