//! Price level with FIFO queue and cached aggregate volume.
//!
//! # Invariant
//!
//! `aggregate_volume` MUST always equal the sum of the queued orders'
//! remaining volumes. Mutation goes through the methods below, and debug
//! builds verify the invariant after each one.
//!
//! # Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | `push_back` | O(1) amortized |
//! | `reduce` | O(1) |
//! | `remove` | O(n) (order-preserving shift) |
//! | `aggregate_volume` | O(1) |

use indexmap::IndexMap;

use crate::error::{ReconError, Result};

/// One price on one side: orders in arrival order plus their total volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    /// Fixed-point price
    price: i64,
    /// Orders in time priority: order_id → remaining volume
    queue: IndexMap<u64, u64>,
    /// Cached total (invariant: == queue.values().sum())
    aggregate_volume: u64,
}

impl PriceLevel {
    /// Create a new empty price level.
    #[inline]
    pub fn new(price: i64) -> Self {
        Self {
            price,
            queue: IndexMap::new(),
            aggregate_volume: 0,
        }
    }

    /// Append an order to the back of the queue.
    ///
    /// # Errors
    /// `InvariantViolation` if the id is already queued here.
    pub fn push_back(&mut self, order_id: u64, volume: u64) -> Result<u64> {
        if self.queue.contains_key(&order_id) {
            return Err(ReconError::invariant(format!(
                "order {order_id} already queued at price {}",
                self.price
            )));
        }
        let aggregate = self.aggregate_volume.checked_add(volume).ok_or_else(|| {
            ReconError::invariant(format!("aggregate overflow at price {}", self.price))
        })?;
        self.queue.insert(order_id, volume);
        self.aggregate_volume = aggregate;

        #[cfg(debug_assertions)]
        self.verify_invariant();

        Ok(self.aggregate_volume)
    }

    /// Reduce an order's volume in place, keeping its queue position.
    ///
    /// Returns the order's new remaining volume, or `None` if not queued.
    ///
    /// # Errors
    /// `InvariantViolation` if `delta` exceeds the order's remaining volume.
    pub fn reduce(&mut self, order_id: u64, delta: u64) -> Result<Option<u64>> {
        let Some(remaining) = self.queue.get_mut(&order_id) else {
            return Ok(None);
        };
        if delta > *remaining {
            return Err(ReconError::invariant(format!(
                "reduce of {delta} exceeds remaining {} for order {order_id}",
                *remaining
            )));
        }
        *remaining -= delta;
        let new_remaining = *remaining;
        // Cannot underflow: aggregate >= remaining >= delta
        self.aggregate_volume -= delta;

        #[cfg(debug_assertions)]
        self.verify_invariant();

        Ok(Some(new_remaining))
    }

    /// Remove an order from the queue, preserving the order of the rest.
    ///
    /// Returns the volume it held, or `None` if not queued.
    pub fn remove(&mut self, order_id: u64) -> Option<u64> {
        let volume = self.queue.shift_remove(&order_id)?;
        self.aggregate_volume -= volume;

        #[cfg(debug_assertions)]
        self.verify_invariant();

        Some(volume)
    }

    #[inline]
    pub fn price(&self) -> i64 {
        self.price
    }

    /// Cached aggregate volume (O(1)).
    #[inline]
    pub fn aggregate_volume(&self) -> u64 {
        self.aggregate_volume
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.queue.len()
    }

    /// Remaining volume of a queued order.
    #[inline]
    pub fn get(&self, order_id: u64) -> Option<u64> {
        self.queue.get(&order_id).copied()
    }

    /// Zero-based position in the queue (0 = front).
    #[inline]
    pub fn position(&self, order_id: u64) -> Option<usize> {
        self.queue.get_index_of(&order_id)
    }

    /// Iterate (order_id, remaining) front to back.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.queue.iter().map(|(&id, &volume)| (id, volume))
    }

    /// Order ids front to back.
    pub fn order_ids(&self) -> Vec<u64> {
        self.queue.keys().copied().collect()
    }

    /// Compute the actual total by summing all orders (O(n)).
    #[inline]
    pub fn compute_actual_total(&self) -> u64 {
        self.queue.values().sum()
    }

    /// Verify the aggregate invariant holds.
    #[cfg(debug_assertions)]
    #[inline]
    pub fn verify_invariant(&self) {
        let actual = self.compute_actual_total();
        debug_assert_eq!(
            actual, self.aggregate_volume,
            "PriceLevel invariant violated at {}: actual={}, cached={}",
            self.price, actual, self.aggregate_volume
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline]
    pub fn verify_invariant(&self) {}
}
