//! Sorted bid/ask ladders of price levels.
//!
//! Both ladders are `BTreeMap`s keyed on fixed-point price, so ordering is
//! exact and iteration is deterministic. Bids are read back-to-front (highest
//! first), asks front-to-back (lowest first). A level is removed the moment
//! its last order leaves.

use std::collections::BTreeMap;

use crate::error::{ReconError, Result};
use crate::events::LevelQuote;
use crate::lob::price_level::PriceLevel;
use crate::types::Side;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceLevelLedger {
    bids: BTreeMap<i64, PriceLevel>,
    asks: BTreeMap<i64, PriceLevel>,
}

impl PriceLevelLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    fn ladder(&self, side: Side) -> &BTreeMap<i64, PriceLevel> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    #[inline(always)]
    fn ladder_mut(&mut self, side: Side) -> &mut BTreeMap<i64, PriceLevel> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Append an order at `price`, creating the level if absent.
    ///
    /// Returns the level's new aggregate volume.
    pub fn insert(&mut self, side: Side, price: i64, order_id: u64, volume: u64) -> Result<u64> {
        let ladder = self.ladder_mut(side);
        let level = ladder
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price));
        let result = level.push_back(order_id, volume);
        if level.is_empty() {
            ladder.remove(&price);
        }
        result
    }

    /// Reduce a queued order in place. Returns the level's new aggregate.
    ///
    /// # Errors
    /// `InvariantViolation` if the level or order is missing, or `delta`
    /// exceeds the order's remaining volume.
    pub fn reduce(&mut self, side: Side, price: i64, order_id: u64, delta: u64) -> Result<u64> {
        let level = self
            .ladder_mut(side)
            .get_mut(&price)
            .ok_or_else(|| missing_level(side, price, order_id))?;
        match level.reduce(order_id, delta)? {
            Some(_) => Ok(level.aggregate_volume()),
            None => Err(missing_order(price, order_id)),
        }
    }

    /// Remove an order; drops the level when it empties.
    ///
    /// Returns the level's new aggregate (0 when the level was removed).
    pub fn remove(&mut self, side: Side, price: i64, order_id: u64) -> Result<u64> {
        let ladder = self.ladder_mut(side);
        let level = ladder
            .get_mut(&price)
            .ok_or_else(|| missing_level(side, price, order_id))?;
        level
            .remove(order_id)
            .ok_or_else(|| missing_order(price, order_id))?;

        let aggregate = level.aggregate_volume();
        if level.is_empty() {
            ladder.remove(&price);
        }
        Ok(aggregate)
    }

    /// Level at an exact price.
    #[inline]
    pub fn level(&self, side: Side, price: i64) -> Option<&PriceLevel> {
        self.ladder(side).get(&price)
    }

    /// Levels in ladder order (bids descending, asks ascending).
    pub fn levels(&self, side: Side) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match side {
            Side::Buy => Box::new(self.bids.values().rev()),
            Side::Sell => Box::new(self.asks.values()),
        }
    }

    /// Top `max_levels` (price, aggregate) pairs; 0 means full depth.
    pub fn depth(&self, side: Side, max_levels: usize) -> Vec<LevelQuote> {
        let take = if max_levels == 0 {
            usize::MAX
        } else {
            max_levels
        };
        self.levels(side)
            .take(take)
            .map(|level| LevelQuote::new(level.price(), level.aggregate_volume()))
            .collect()
    }

    /// Best price on a side (highest bid / lowest ask).
    #[inline]
    pub fn best_price(&self, side: Side) -> Option<i64> {
        match side {
            Side::Buy => self.bids.keys().next_back().copied(),
            Side::Sell => self.asks.keys().next().copied(),
        }
    }

    #[inline]
    pub fn level_count(&self, side: Side) -> usize {
        self.ladder(side).len()
    }

    /// Total resting volume on a side.
    pub fn total_volume(&self, side: Side) -> u64 {
        self.ladder(side)
            .values()
            .map(PriceLevel::aggregate_volume)
            .sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Check every level: keyed at its own price, non-empty, cached
    /// aggregate equal to the recomputed sum.
    pub fn verify(&self) -> Result<()> {
        for side in [Side::Buy, Side::Sell] {
            for (&price, level) in self.ladder(side) {
                if level.price() != price {
                    return Err(ReconError::invariant(format!(
                        "{side:?} level keyed at {price} reports price {}",
                        level.price()
                    )));
                }
                if level.is_empty() || level.aggregate_volume() == 0 {
                    return Err(ReconError::invariant(format!(
                        "{side:?} level at {price} is empty but still listed"
                    )));
                }
                let actual = level.compute_actual_total();
                if actual != level.aggregate_volume() {
                    return Err(ReconError::invariant(format!(
                        "{side:?} level at {price}: aggregate {} != sum {actual}",
                        level.aggregate_volume()
                    )));
                }
            }
        }
        Ok(())
    }
}

fn missing_level(side: Side, price: i64, order_id: u64) -> ReconError {
    ReconError::invariant(format!(
        "{side:?} level {price} not found for order {order_id}"
    ))
}

fn missing_order(price: i64, order_id: u64) -> ReconError {
    ReconError::invariant(format!(
        "order {order_id} not queued at price level {price}"
    ))
}
