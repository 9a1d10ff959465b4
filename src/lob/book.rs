//! Per-symbol mutable core: order index plus price-level ledger.
//!
//! `OrderBookState` knows nothing about sequencing, lifecycle or events. It
//! applies one command at a time and reports which level changed (and the
//! execution, for trades) so the caller can emit canonical events.

use ahash::AHashMap;

use crate::error::{ReconError, Result};
use crate::events::LevelQuote;
use crate::lob::ledger::PriceLevelLedger;
use crate::types::{
    try_price_to_fixed, Command, OrderAdd, OrderCancel, OrderRecord, OrderSnapshot, OrderTrade, Side,
};

/// New aggregate at the level a command touched (0 = level removed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub side: Side,
    pub price: i64,
    pub aggregate_volume: u64,
}

/// An execution against a resting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub price: i64,
    pub volume: u64,
    pub aggressor_side: Side,
    pub resting_order_id: u64,
}

/// What a successfully applied command did to the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub level: LevelChange,
    pub execution: Option<Execution>,
}

/// Order index + ladders for one symbol.
#[derive(Debug, Clone, Default)]
pub struct OrderBookState {
    /// Resting orders by id
    orders: AHashMap<u64, OrderRecord>,

    ledger: PriceLevelLedger,

    /// Next time-priority stamp handed out at add
    next_insertion_sequence: u64,

    /// Fixed-point price of the most recent execution
    last_trade_price: Option<i64>,
}

impl OrderBookState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one command.
    ///
    /// # Errors
    /// - `OrderNotFound` if a cancel/trade references an id that is not
    ///   resting (book untouched)
    /// - `InvariantViolation` on a duplicate resting id, a zero-volume add,
    ///   or a trade larger than the order's remaining volume (book untouched)
    pub fn apply(&mut self, command: &Command) -> Result<ApplyOutcome> {
        match command {
            Command::Add(add) => self.add_order(add),
            Command::Cancel(cancel) => self.cancel_order(cancel),
            Command::Trade(trade) => self.process_trade(trade),
        }
    }

    fn add_order(&mut self, add: &OrderAdd) -> Result<ApplyOutcome> {
        if add.volume == 0 {
            return Err(ReconError::invariant(format!(
                "add for order {} carries zero volume",
                add.order_id
            )));
        }
        if self.orders.contains_key(&add.order_id) {
            return Err(ReconError::invariant(format!(
                "order {} is already resting",
                add.order_id
            )));
        }

        let aggregate = self
            .ledger
            .insert(add.side, add.price, add.order_id, add.volume)?;

        self.orders.insert(
            add.order_id,
            OrderRecord {
                order_id: add.order_id,
                side: add.side,
                price: add.price,
                remaining_volume: add.volume,
                insertion_sequence: self.next_insertion_sequence,
            },
        );
        self.next_insertion_sequence += 1;

        Ok(ApplyOutcome {
            level: LevelChange {
                side: add.side,
                price: add.price,
                aggregate_volume: aggregate,
            },
            execution: None,
        })
    }

    fn cancel_order(&mut self, cancel: &OrderCancel) -> Result<ApplyOutcome> {
        let order = *self
            .orders
            .get(&cancel.order_id)
            .ok_or(ReconError::OrderNotFound(cancel.order_id))?;

        let aggregate = match cancel.cancel_volume {
            Some(volume) if volume < order.remaining_volume => {
                self.reduce_order(&order, volume)?
            }
            // Absent, or at least the remaining volume: full cancel
            _ => self.remove_order(&order)?,
        };

        Ok(ApplyOutcome {
            level: LevelChange {
                side: order.side,
                price: order.price,
                aggregate_volume: aggregate,
            },
            execution: None,
        })
    }

    fn process_trade(&mut self, trade: &OrderTrade) -> Result<ApplyOutcome> {
        let order = *self
            .orders
            .get(&trade.order_id)
            .ok_or(ReconError::OrderNotFound(trade.order_id))?;

        if trade.trade_volume > order.remaining_volume {
            return Err(ReconError::invariant(format!(
                "trade of {} exceeds remaining {} on order {}",
                trade.trade_volume, order.remaining_volume, trade.order_id
            )));
        }

        let aggregate = if trade.trade_volume == order.remaining_volume {
            self.remove_order(&order)?
        } else {
            self.reduce_order(&order, trade.trade_volume)?
        };

        let price = trade.trade_price.unwrap_or(order.price);
        self.last_trade_price = Some(price);

        Ok(ApplyOutcome {
            level: LevelChange {
                side: order.side,
                price: order.price,
                aggregate_volume: aggregate,
            },
            execution: Some(Execution {
                price,
                volume: trade.trade_volume,
                aggressor_side: order.side.opposite(),
                resting_order_id: order.order_id,
            }),
        })
    }

    /// Partial reduction in place; the order keeps its queue position.
    #[inline]
    fn reduce_order(&mut self, order: &OrderRecord, delta: u64) -> Result<u64> {
        let aggregate = self
            .ledger
            .reduce(order.side, order.price, order.order_id, delta)?;
        if let Some(resting) = self.orders.get_mut(&order.order_id) {
            resting.remaining_volume -= delta;
        }
        Ok(aggregate)
    }

    #[inline(always)]
    fn remove_order(&mut self, order: &OrderRecord) -> Result<u64> {
        let aggregate = self
            .ledger
            .remove(order.side, order.price, order.order_id)?;
        self.orders.remove(&order.order_id);
        Ok(aggregate)
    }

    /// Replace the book with an order-level snapshot.
    ///
    /// Orders are added in the listed order so each level's FIFO matches the
    /// snapshot's time priority. On error the book is left empty.
    pub fn load(&mut self, snapshot: &OrderSnapshot) -> Result<()> {
        self.clear();
        for resting in &snapshot.orders {
            let Some(price) = try_price_to_fixed(resting.price) else {
                self.clear();
                return Err(ReconError::invariant(format!(
                    "snapshot order {} has invalid price {}",
                    resting.order_id, resting.price
                )));
            };
            let add = OrderAdd {
                order_id: resting.order_id,
                price,
                volume: resting.volume,
                side: resting.side,
                ts: snapshot.ts,
            };
            if let Err(err) = self.add_order(&add) {
                self.clear();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Drop every order and level. The last trade price is forgotten too.
    pub fn clear(&mut self) {
        self.orders.clear();
        self.ledger.clear();
        self.next_insertion_sequence = 0;
        self.last_trade_price = None;
    }

    #[inline]
    pub fn order(&self, order_id: u64) -> Option<&OrderRecord> {
        self.orders.get(&order_id)
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[inline]
    pub fn ledger(&self) -> &PriceLevelLedger {
        &self.ledger
    }

    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.ledger.best_price(Side::Buy)
    }

    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.ledger.best_price(Side::Sell)
    }

    #[inline]
    pub fn last_trade_price(&self) -> Option<i64> {
        self.last_trade_price
    }

    #[inline]
    pub fn level_count(&self, side: Side) -> usize {
        self.ledger.level_count(side)
    }

    /// Top `max_levels` of a side (0 = all).
    pub fn depth(&self, side: Side, max_levels: usize) -> Vec<LevelQuote> {
        self.ledger.depth(side, max_levels)
    }

    /// Order ids queued at a price, front first.
    pub fn queue(&self, side: Side, price: i64) -> Vec<u64> {
        self.ledger
            .level(side, price)
            .map(|level| level.order_ids())
            .unwrap_or_default()
    }

    /// Full consistency check between the order index and the ladders.
    ///
    /// Checks every level aggregate against its orders, that every queued
    /// id is indexed with the same side, price and remaining volume, that
    /// FIFO order follows insertion sequence, and that no indexed order is
    /// missing from the ladders.
    pub fn verify_invariants(&self) -> Result<()> {
        self.ledger.verify()?;

        let mut queued = 0usize;
        for side in [Side::Buy, Side::Sell] {
            for level in self.ledger.levels(side) {
                let mut previous: Option<u64> = None;
                for (order_id, remaining) in level.iter() {
                    let record = self.orders.get(&order_id).ok_or_else(|| {
                        ReconError::invariant(format!(
                            "order {order_id} queued at {} but not indexed",
                            level.price()
                        ))
                    })?;
                    if record.side != side
                        || record.price != level.price()
                        || record.remaining_volume != remaining
                    {
                        return Err(ReconError::invariant(format!(
                            "order {order_id} index disagrees with level {}",
                            level.price()
                        )));
                    }
                    if previous.is_some_and(|prev| prev >= record.insertion_sequence) {
                        return Err(ReconError::invariant(format!(
                            "FIFO at {} out of time priority at order {order_id}",
                            level.price()
                        )));
                    }
                    previous = Some(record.insertion_sequence);
                    queued += 1;
                }
            }
        }

        if queued != self.orders.len() {
            return Err(ReconError::invariant(format!(
                "{} orders indexed but {queued} queued",
                self.orders.len()
            )));
        }

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid > ask {
                log::debug!("crossed book: bid {bid} > ask {ask}");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RestingOrder;

    const P10: i64 = 10_000_000_000;

    fn add(order_id: u64, price: i64, volume: u64, side: Side) -> Command {
        Command::Add(OrderAdd {
            order_id,
            price,
            volume,
            side,
            ts: order_id as i64,
        })
    }

    fn cancel(order_id: u64, cancel_volume: Option<u64>) -> Command {
        Command::Cancel(OrderCancel {
            order_id,
            cancel_volume,
            ts: 0,
        })
    }

    fn trade(order_id: u64, trade_volume: u64, trade_price: Option<i64>) -> Command {
        Command::Trade(OrderTrade {
            order_id,
            trade_volume,
            trade_price,
            ts: 0,
        })
    }

    #[test]
    fn test_reference_scenario() {
        let mut book = OrderBookState::new();

        book.apply(&add(1, P10, 100, Side::Buy)).unwrap();
        assert_eq!(book.depth(Side::Buy, 0), vec![LevelQuote::new(P10, 100)]);

        book.apply(&add(2, P10, 50, Side::Buy)).unwrap();
        assert_eq!(book.depth(Side::Buy, 0), vec![LevelQuote::new(P10, 150)]);

        let outcome = book.apply(&trade(1, 60, Some(P10))).unwrap();
        assert_eq!(book.order(1).unwrap().remaining_volume, 40);
        assert_eq!(book.depth(Side::Buy, 0), vec![LevelQuote::new(P10, 90)]);
        let exec = outcome.execution.unwrap();
        assert_eq!(exec.price, P10);
        assert_eq!(exec.volume, 60);
        assert_eq!(exec.aggressor_side, Side::Sell);

        book.apply(&cancel(2, None)).unwrap();
        assert_eq!(book.depth(Side::Buy, 0), vec![LevelQuote::new(P10, 40)]);
        book.verify_invariants().unwrap();
    }

    #[test]
    fn test_partial_cancel_keeps_position() {
        let mut book = OrderBookState::new();
        book.apply(&add(1, P10, 100, Side::Sell)).unwrap();
        book.apply(&add(2, P10, 100, Side::Sell)).unwrap();

        let outcome = book.apply(&cancel(1, Some(30))).unwrap();
        assert_eq!(outcome.level.aggregate_volume, 170);
        assert_eq!(book.queue(Side::Sell, P10), vec![1, 2]);
        assert_eq!(book.order(1).unwrap().remaining_volume, 70);
    }

    #[test]
    fn test_oversized_cancel_is_full_cancel() {
        let mut book = OrderBookState::new();
        book.apply(&add(1, P10, 100, Side::Buy)).unwrap();
        let outcome = book.apply(&cancel(1, Some(500))).unwrap();
        assert_eq!(outcome.level.aggregate_volume, 0);
        assert!(book.is_empty());
        assert_eq!(book.level_count(Side::Buy), 0);
    }

    #[test]
    fn test_cancel_last_order_removes_level() {
        let mut book = OrderBookState::new();
        book.apply(&add(1, P10, 100, Side::Buy)).unwrap();
        book.apply(&add(2, P10 - 1, 10, Side::Buy)).unwrap();
        book.apply(&cancel(1, None)).unwrap();
        assert_eq!(book.best_bid(), Some(P10 - 1));
        assert_eq!(book.level_count(Side::Buy), 1);
    }

    #[test]
    fn test_unknown_order() {
        let mut book = OrderBookState::new();
        assert_eq!(
            book.apply(&cancel(42, None)),
            Err(ReconError::OrderNotFound(42))
        );
        assert_eq!(
            book.apply(&trade(42, 1, None)),
            Err(ReconError::OrderNotFound(42))
        );
    }

    #[test]
    fn test_trade_exceeding_remaining_leaves_book_untouched() {
        let mut book = OrderBookState::new();
        book.apply(&add(1, P10, 100, Side::Buy)).unwrap();
        let result = book.apply(&trade(1, 101, None));
        assert!(matches!(result, Err(ReconError::InvariantViolation(_))));
        assert_eq!(book.order(1).unwrap().remaining_volume, 100);
        assert_eq!(book.last_trade_price(), None);
    }

    #[test]
    fn test_trade_without_price_uses_resting_price() {
        let mut book = OrderBookState::new();
        book.apply(&add(1, P10, 100, Side::Sell)).unwrap();
        let outcome = book.apply(&trade(1, 100, None)).unwrap();
        let exec = outcome.execution.unwrap();
        assert_eq!(exec.price, P10);
        assert_eq!(exec.aggressor_side, Side::Buy);
        assert_eq!(book.last_trade_price(), Some(P10));
        assert!(book.is_empty());
    }

    #[test]
    fn test_duplicate_resting_id() {
        let mut book = OrderBookState::new();
        book.apply(&add(1, P10, 100, Side::Buy)).unwrap();
        let result = book.apply(&add(1, P10 + 1, 5, Side::Sell));
        assert!(matches!(result, Err(ReconError::InvariantViolation(_))));
        assert_eq!(book.order_count(), 1);
        book.verify_invariants().unwrap();
    }

    #[test]
    fn test_zero_volume_add() {
        let mut book = OrderBookState::new();
        assert!(book.apply(&add(1, P10, 0, Side::Buy)).is_err());
        assert!(book.is_empty());
    }

    #[test]
    fn test_load_snapshot_preserves_priority() {
        let mut book = OrderBookState::new();
        book.apply(&add(99, P10, 1, Side::Buy)).unwrap();

        let snapshot = OrderSnapshot {
            sequence: 10,
            ts: 1_000,
            orders: vec![
                RestingOrder {
                    order_id: 5,
                    side: Side::Buy,
                    price: 10.0,
                    volume: 30,
                },
                RestingOrder {
                    order_id: 3,
                    side: Side::Buy,
                    price: 10.0,
                    volume: 20,
                },
                RestingOrder {
                    order_id: 7,
                    side: Side::Sell,
                    price: 10.5,
                    volume: 15,
                },
            ],
        };
        book.load(&snapshot).unwrap();

        assert!(book.order(99).is_none());
        assert_eq!(book.queue(Side::Buy, P10), vec![5, 3]);
        assert_eq!(book.depth(Side::Buy, 0), vec![LevelQuote::new(P10, 50)]);
        assert_eq!(book.best_ask(), Some(10_500_000_000));
        book.verify_invariants().unwrap();
    }

    #[test]
    fn test_load_snapshot_with_duplicate_ids_clears() {
        let mut book = OrderBookState::new();
        let order = RestingOrder {
            order_id: 1,
            side: Side::Buy,
            price: 10.0,
            volume: 5,
        };
        let snapshot = OrderSnapshot {
            sequence: 1,
            ts: 0,
            orders: vec![order, order],
        };
        assert!(book.load(&snapshot).is_err());
        assert!(book.is_empty());
        assert!(book.ledger().is_empty());
    }

    #[test]
    fn test_load_snapshot_rejects_unrepresentable_prices() {
        for price in [5e10, 1e-12] {
            let mut book = OrderBookState::new();
            let snapshot = OrderSnapshot {
                sequence: 1,
                ts: 0,
                orders: vec![
                    RestingOrder {
                        order_id: 1,
                        side: Side::Sell,
                        price: 10.0,
                        volume: 5,
                    },
                    RestingOrder {
                        order_id: 2,
                        side: Side::Sell,
                        price,
                        volume: 7,
                    },
                ],
            };
            assert!(matches!(
                book.load(&snapshot),
                Err(ReconError::InvariantViolation(_))
            ));
            assert!(book.is_empty());
        }
    }

    #[test]
    fn test_aggregate_invariant_under_churn() {
        let mut book = OrderBookState::new();
        for id in 1..=200u64 {
            let side = if id % 2 == 0 { Side::Buy } else { Side::Sell };
            let price = P10 + (id % 7) as i64 * 10_000_000;
            book.apply(&add(id, price, id * 3, side)).unwrap();
        }
        for id in (1..=200u64).step_by(3) {
            book.apply(&cancel(id, Some(id))).unwrap();
        }
        for id in (2..=200u64).step_by(5) {
            let remaining = book.order(id).map(|o| o.remaining_volume).unwrap_or(0);
            if remaining > 0 {
                book.apply(&trade(id, remaining, None)).unwrap();
            }
        }
        book.verify_invariants().unwrap();

        let ladder_total =
            book.ledger().total_volume(Side::Buy) + book.ledger().total_volume(Side::Sell);
        let index_total: u64 = (1..=200u64)
            .filter_map(|id| book.order(id))
            .map(|o| o.remaining_volume)
            .sum();
        assert_eq!(ladder_total, index_total);
    }
}
