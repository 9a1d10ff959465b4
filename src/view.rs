//! Downstream market-data view over canonical events.
//!
//! Consumers (backtests, research notebooks) only ever see immutable events.
//! `ReplayMarketView` folds them back into a level-only book per symbol and
//! exposes prices and book features as of a point in event time.

use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::events::{LevelQuote, MarketEvent};
use crate::types::{fixed_to_price, Side};

/// Contract the downstream engine reads market data through.
pub trait MarketDataView {
    /// Apply every pending event with `ts <= target`. Returns how many were
    /// applied. Time never moves backwards.
    fn advance(&mut self, ts: i64) -> usize;

    /// Last trade price, falling back to the mid price.
    fn current_price(&self, symbol: &str) -> Option<f64>;

    fn current_features(&self, symbol: &str) -> Option<BookFeatures>;
}

/// Point-in-time book features for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookFeatures {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mid_price: Option<f64>,
    pub spread: Option<f64>,
    pub spread_bps: Option<f64>,
    /// Size-weighted mid using the top level on each side
    pub microprice: Option<f64>,
    /// (bid - ask) / (bid + ask) over all known levels, in [-1, 1]
    pub depth_imbalance: Option<f64>,
    pub bid_depth: u64,
    pub ask_depth: u64,
    pub last_trade_price: Option<f64>,
    /// Timestamp of the last event applied for the symbol
    pub ts: i64,
}

/// Level-only book rebuilt from snapshot, update and trade events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LevelBook {
    bids: BTreeMap<i64, u64>,
    asks: BTreeMap<i64, u64>,
    last_trade: Option<i64>,
    ts: i64,
}

impl LevelBook {
    fn apply(&mut self, event: &MarketEvent) {
        match event {
            MarketEvent::Snapshot(snap) => {
                self.bids = snap.bids.iter().map(|l| (l.price, l.volume)).collect();
                self.asks = snap.asks.iter().map(|l| (l.price, l.volume)).collect();
                self.last_trade = snap.last_price;
                self.ts = snap.ts;
            }
            MarketEvent::Update(update) => {
                let ladder = match update.side {
                    Side::Buy => &mut self.bids,
                    Side::Sell => &mut self.asks,
                };
                if update.is_removal() {
                    ladder.remove(&update.price);
                } else {
                    ladder.insert(update.price, update.volume);
                }
                self.ts = update.ts;
            }
            MarketEvent::Trade(trade) => {
                self.last_trade = Some(trade.price);
                self.ts = trade.ts;
            }
        }
    }

    fn best_bid(&self) -> Option<(i64, u64)> {
        self.bids.iter().next_back().map(|(&p, &v)| (p, v))
    }

    fn best_ask(&self) -> Option<(i64, u64)> {
        self.asks.iter().next().map(|(&p, &v)| (p, v))
    }

    fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => {
                Some((fixed_to_price(bid) + fixed_to_price(ask)) / 2.0)
            }
            _ => None,
        }
    }

    fn features(&self) -> BookFeatures {
        let best_bid = self.best_bid();
        let best_ask = self.best_ask();
        let mid_price = self.mid_price();

        let spread = match (best_bid, best_ask) {
            (Some((bid, _)), Some((ask, _))) => Some(fixed_to_price(ask) - fixed_to_price(bid)),
            _ => None,
        };
        let spread_bps = match (mid_price, spread) {
            (Some(mid), Some(spread)) if mid > 0.0 => Some(spread / mid * 10_000.0),
            _ => None,
        };

        let microprice = match (best_bid, best_ask) {
            (Some((bid, bid_size)), Some((ask, ask_size))) if bid_size + ask_size > 0 => {
                let (bid_size, ask_size) = (bid_size as f64, ask_size as f64);
                Some(
                    (fixed_to_price(bid) * ask_size + fixed_to_price(ask) * bid_size)
                        / (bid_size + ask_size),
                )
            }
            _ => None,
        };

        let bid_depth: u64 = self.bids.values().sum();
        let ask_depth: u64 = self.asks.values().sum();
        let total = bid_depth + ask_depth;
        let depth_imbalance =
            (total > 0).then(|| (bid_depth as f64 - ask_depth as f64) / total as f64);

        BookFeatures {
            best_bid: best_bid.map(|(p, _)| fixed_to_price(p)),
            best_ask: best_ask.map(|(p, _)| fixed_to_price(p)),
            mid_price,
            spread,
            spread_bps,
            microprice,
            depth_imbalance,
            bid_depth,
            ask_depth,
            last_trade_price: self.last_trade.map(fixed_to_price),
            ts: self.ts,
        }
    }
}

/// Replays a captured batch of events in timestamp order.
///
/// Events are stably sorted by `ts`, so same-timestamp events keep their
/// emission order.
///
/// # Example
/// ```
/// use l2_book_reconstructor::view::{MarketDataView, ReplayMarketView};
/// use l2_book_reconstructor::{RawRecord, ReconstructionEngine, Side};
///
/// let mut engine = ReconstructionEngine::default();
/// let mut events = engine.process(&RawRecord::add("AAPL", 10, 1, Side::Buy, 99.0, 5)).unwrap();
/// events.extend(engine.process(&RawRecord::add("AAPL", 20, 2, Side::Sell, 101.0, 5)).unwrap());
///
/// let mut view = ReplayMarketView::new(events);
/// view.advance(15);
/// assert_eq!(view.current_price("AAPL"), None);
/// view.advance(20);
/// assert_eq!(view.current_price("AAPL"), Some(100.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReplayMarketView {
    events: Vec<MarketEvent>,
    cursor: usize,
    books: AHashMap<String, LevelBook>,
    now: Option<i64>,
}

impl ReplayMarketView {
    pub fn new(mut events: Vec<MarketEvent>) -> Self {
        events.sort_by_key(MarketEvent::ts);
        Self {
            events,
            ..Self::default()
        }
    }

    /// Time of the last `advance`, if any.
    pub fn now(&self) -> Option<i64> {
        self.now
    }

    /// Events not yet applied.
    pub fn remaining(&self) -> usize {
        self.events.len() - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor == self.events.len()
    }

    /// Current ladder for a symbol in ladder order (bids descending).
    pub fn levels(&self, symbol: &str, side: Side) -> Vec<LevelQuote> {
        let Some(book) = self.books.get(symbol) else {
            return Vec::new();
        };
        match side {
            Side::Buy => book
                .bids
                .iter()
                .rev()
                .map(|(&p, &v)| LevelQuote::new(p, v))
                .collect(),
            Side::Sell => book
                .asks
                .iter()
                .map(|(&p, &v)| LevelQuote::new(p, v))
                .collect(),
        }
    }

    /// Symbols seen so far, sorted.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.books.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }
}

impl MarketDataView for ReplayMarketView {
    fn advance(&mut self, ts: i64) -> usize {
        if self.now.is_some_and(|now| ts < now) {
            return 0;
        }
        self.now = Some(ts);

        let start = self.cursor;
        while let Some(event) = self.events.get(self.cursor) {
            if event.ts() > ts {
                break;
            }
            self.books
                .entry(event.symbol().to_string())
                .or_default()
                .apply(event);
            self.cursor += 1;
        }
        self.cursor - start
    }

    fn current_price(&self, symbol: &str) -> Option<f64> {
        let book = self.books.get(symbol)?;
        book.last_trade.map(fixed_to_price).or_else(|| book.mid_price())
    }

    fn current_features(&self, symbol: &str) -> Option<BookFeatures> {
        self.books.get(symbol).map(LevelBook::features)
    }
}
