//! Canonical market events emitted by the engine.
//!
//! Events are immutable facts: once emitted they are never mutated, and the
//! update stream alone is enough for a consumer to rebuild an equivalent
//! level-only book.

use serde::{Deserialize, Serialize};

use crate::types::{fixed_to_price, Side};

/// One price level in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelQuote {
    /// Fixed-point price
    pub price: i64,
    /// Aggregate resting volume
    pub volume: u64,
}

impl LevelQuote {
    #[inline]
    pub fn new(price: i64, volume: u64) -> Self {
        Self { price, volume }
    }

    #[inline]
    pub fn price_f64(&self) -> f64 {
        fixed_to_price(self.price)
    }
}

/// Full-depth restatement of a symbol's book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEvent {
    pub symbol: String,
    pub ts: i64,
    /// Highest price first
    pub bids: Vec<LevelQuote>,
    /// Lowest price first
    pub asks: Vec<LevelQuote>,
    /// Fixed-point price of the last trade, if any
    pub last_price: Option<i64>,
    /// Last sequence number reflected in the snapshot
    pub sequence: u64,
}

impl SnapshotEvent {
    pub fn best_bid(&self) -> Option<LevelQuote> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<LevelQuote> {
        self.asks.first().copied()
    }

    /// (price, volume) pairs for one side in ladder order, prices as f64.
    pub fn ladder(&self, side: Side) -> Vec<(f64, u64)> {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels.iter().map(|l| (l.price_f64(), l.volume)).collect()
    }
}

/// Single-level delta: the new aggregate volume at a price (0 = level removed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookUpdateEvent {
    pub symbol: String,
    pub ts: i64,
    pub side: Side,
    /// Fixed-point price
    pub price: i64,
    pub volume: u64,
}

impl OrderBookUpdateEvent {
    #[inline]
    pub fn price_f64(&self) -> f64 {
        fixed_to_price(self.price)
    }

    /// True when the update removes the level.
    #[inline]
    pub fn is_removal(&self) -> bool {
        self.volume == 0
    }
}

/// Execution against a resting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub symbol: String,
    pub ts: i64,
    /// Fixed-point execution price
    pub price: i64,
    pub volume: u64,
    /// Side that crossed into the book (opposite of the resting order)
    pub aggressor_side: Side,
    /// Resting order that was hit
    pub resting_order_id: u64,
}

impl TradeEvent {
    #[inline]
    pub fn price_f64(&self) -> f64 {
        fixed_to_price(self.price)
    }
}

/// Tagged union of everything the engine emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketEvent {
    Snapshot(SnapshotEvent),
    Update(OrderBookUpdateEvent),
    Trade(TradeEvent),
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Snapshot(s) => &s.symbol,
            MarketEvent::Update(u) => &u.symbol,
            MarketEvent::Trade(t) => &t.symbol,
        }
    }

    pub fn ts(&self) -> i64 {
        match self {
            MarketEvent::Snapshot(s) => s.ts,
            MarketEvent::Update(u) => u.ts,
            MarketEvent::Trade(t) => t.ts,
        }
    }

    pub fn as_snapshot(&self) -> Option<&SnapshotEvent> {
        match self {
            MarketEvent::Snapshot(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_update(&self) -> Option<&OrderBookUpdateEvent> {
        match self {
            MarketEvent::Update(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_trade(&self) -> Option<&TradeEvent> {
        match self {
            MarketEvent::Trade(t) => Some(t),
            _ => None,
        }
    }
}
