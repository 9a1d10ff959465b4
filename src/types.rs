//! Core data types: raw records, normalized commands, resting orders and the
//! per-symbol lifecycle.
//!
//! Prices are stored as fixed-point `i64` with nine implied decimals so that
//! ladder keys compare exactly and replays are bit-identical.

use serde::{Deserialize, Serialize};

/// Fixed-point scale applied to input prices (1e9 = nine implied decimals).
pub const PRICE_SCALE: f64 = 1e9;

/// Convert a floating-point price to the fixed-point representation.
#[inline]
pub fn price_to_fixed(price: f64) -> i64 {
    (price * PRICE_SCALE).round() as i64
}

/// Checked conversion for untrusted input.
///
/// Returns `None` unless the price is finite and its scaled value lands in
/// `1..=i64::MAX`; the saturating cast in `price_to_fixed` would otherwise
/// fold out-of-range prices onto the same ladder key.
pub fn try_price_to_fixed(price: f64) -> Option<i64> {
    if !price.is_finite() {
        return None;
    }
    let scaled = (price * PRICE_SCALE).round();
    // i64::MAX as f64 rounds up to 2^63, which does not fit
    (scaled >= 1.0 && scaled < i64::MAX as f64).then_some(scaled as i64)
}

/// Convert a fixed-point price back to floating point.
#[inline]
pub fn fixed_to_price(fixed: i64) -> f64 {
    fixed as f64 / PRICE_SCALE
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    /// Resting on the bid ladder
    Buy,
    /// Resting on the ask ladder
    Sell,
}

impl Side {
    /// Parse a vendor side code (case-insensitive).
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "b" | "buy" | "bid" => Some(Side::Buy),
            "s" | "sell" | "a" | "ask" | "offer" => Some(Side::Sell),
            _ => None,
        }
    }

    /// The other side of the book.
    #[inline(always)]
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    #[inline(always)]
    pub fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }

    #[inline(always)]
    pub fn is_sell(self) -> bool {
        matches!(self, Side::Sell)
    }
}

/// A raw order-level record as delivered by the ingestion collaborator.
///
/// Every field except `symbol` is optional so that missing columns surface as
/// `MalformedRecord` during normalization instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Instrument the record belongs to
    pub symbol: String,

    /// Arrival sequence number; `None` means "assign the next one"
    #[serde(default)]
    pub sequence: Option<u64>,

    /// Event timestamp (nanoseconds since epoch)
    #[serde(default)]
    pub ts: Option<i64>,

    /// Vendor message-type tag (add / cancel / trade ...)
    #[serde(default)]
    pub event: Option<String>,

    /// Exchange order id
    #[serde(default)]
    pub order_id: Option<i64>,

    /// Vendor side code
    #[serde(default)]
    pub side: Option<String>,

    /// Price in instrument units
    #[serde(default)]
    pub price: Option<f64>,

    /// Volume in shares/contracts
    #[serde(default)]
    pub volume: Option<i64>,
}

impl RawRecord {
    /// Create an empty record for a symbol.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            sequence: None,
            ts: None,
            event: None,
            order_id: None,
            side: None,
            price: None,
            volume: None,
        }
    }

    /// Build an add record.
    pub fn add(
        symbol: impl Into<String>,
        ts: i64,
        order_id: i64,
        side: Side,
        price: f64,
        volume: i64,
    ) -> Self {
        let side_code = match side {
            Side::Buy => "B",
            Side::Sell => "S",
        };
        Self {
            ts: Some(ts),
            event: Some("add".to_string()),
            order_id: Some(order_id),
            side: Some(side_code.to_string()),
            price: Some(price),
            volume: Some(volume),
            ..Self::new(symbol)
        }
    }

    /// Build a cancel record; `volume = None` is a full cancel.
    pub fn cancel(symbol: impl Into<String>, ts: i64, order_id: i64, volume: Option<i64>) -> Self {
        Self {
            ts: Some(ts),
            event: Some("cancel".to_string()),
            order_id: Some(order_id),
            volume,
            ..Self::new(symbol)
        }
    }

    /// Build a trade record against a resting order.
    pub fn trade(
        symbol: impl Into<String>,
        ts: i64,
        order_id: i64,
        volume: i64,
        price: Option<f64>,
    ) -> Self {
        Self {
            ts: Some(ts),
            event: Some("trade".to_string()),
            order_id: Some(order_id),
            price,
            volume: Some(volume),
            ..Self::new(symbol)
        }
    }

    /// Attach an arrival sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Set the message-type tag.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }
}

/// Normalized add command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAdd {
    pub order_id: u64,
    /// Fixed-point price
    pub price: i64,
    pub volume: u64,
    pub side: Side,
    pub ts: i64,
}

/// Normalized cancel command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancel {
    pub order_id: u64,
    /// `None` cancels the full remaining volume
    pub cancel_volume: Option<u64>,
    pub ts: i64,
}

/// Normalized trade command against a resting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTrade {
    pub order_id: u64,
    pub trade_volume: u64,
    /// Fixed-point execution price; `None` means the resting order's price
    pub trade_price: Option<i64>,
    pub ts: i64,
}

/// One of the three canonical commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Add(OrderAdd),
    Cancel(OrderCancel),
    Trade(OrderTrade),
}

impl Command {
    /// Event timestamp of the command.
    #[inline]
    pub fn ts(&self) -> i64 {
        match self {
            Command::Add(c) => c.ts,
            Command::Cancel(c) => c.ts,
            Command::Trade(c) => c.ts,
        }
    }

    /// Order the command refers to.
    #[inline]
    pub fn order_id(&self) -> u64 {
        match self {
            Command::Add(c) => c.order_id,
            Command::Cancel(c) => c.order_id,
            Command::Trade(c) => c.order_id,
        }
    }
}

/// An order resting in the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderRecord {
    pub order_id: u64,
    pub side: Side,
    /// Fixed-point price
    pub price: i64,
    pub remaining_volume: u64,
    /// Monotonic per book, assigned at add
    pub insertion_sequence: u64,
}

/// A resting order inside an order-level snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub order_id: u64,
    pub side: Side,
    pub price: f64,
    pub volume: u64,
}

/// Order-level snapshot supplied by the ingestion collaborator for recovery.
///
/// Orders are listed in time priority; loading preserves that order in each
/// level's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Last sequence number the snapshot reflects
    pub sequence: u64,
    /// Snapshot timestamp (nanoseconds since epoch)
    pub ts: i64,
    pub orders: Vec<RestingOrder>,
}

impl OrderSnapshot {
    /// An empty snapshot at a sequence number.
    pub fn empty(sequence: u64, ts: i64) -> Self {
        Self {
            sequence,
            ts,
            orders: Vec::new(),
        }
    }
}

/// Why a symbol is recovering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryCause {
    /// Arrival sequence skipped ahead
    SequenceGap,
    /// Invariant breach or strict-mode normalization fault
    Fault,
}

/// Per-symbol lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BookLifecycle {
    #[default]
    Uninitialized,
    SnapshotLoaded,
    Streaming,
    Recovering(RecoveryCause),
}

impl BookLifecycle {
    #[inline]
    pub fn is_recovering(&self) -> bool {
        matches!(self, BookLifecycle::Recovering(_))
    }

    /// Recovering after a fatal fault: commands are rejected until reset.
    #[inline]
    pub fn is_faulted(&self) -> bool {
        matches!(self, BookLifecycle::Recovering(RecoveryCause::Fault))
    }
}
