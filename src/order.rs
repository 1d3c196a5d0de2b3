//! Order state and quantity bookkeeping.
//!
//! An order tracks three quantities: `total` (what was asked for), `filled`
//! (what has traded), and `working` (what is currently exposed to matching).
//! For most types `working == total`; iceberg orders expose one clip at a
//! time and refresh `working` when a clip is consumed.

use crate::types::{InstrumentToken, OrderId, OrderType, Price, Qty, Side};

/// A resting or in-flight order, owned by the arena for its lifetime.
#[derive(Clone, Debug)]
pub struct Order {
    id: OrderId,
    instrument: InstrumentToken,
    side: Side,
    kind: OrderType,
    price: Price,
    total: Qty,
    working: Qty,
    filled: Qty,
    display: Qty,
    timestamp_ns: u64,
}

impl Order {
    pub fn new(
        id: OrderId,
        instrument: InstrumentToken,
        side: Side,
        kind: OrderType,
        price: Price,
        qty: Qty,
        display: Qty,
        timestamp_ns: u64,
    ) -> Self {
        let mut order = Self {
            id,
            instrument,
            side,
            kind,
            price,
            total: qty,
            working: qty,
            filled: 0,
            display,
            timestamp_ns,
        };
        order.refresh_working();
        order
    }

    /// Plain limit order, the common case.
    pub fn limit(id: OrderId, instrument: InstrumentToken, side: Side, price: Price, qty: Qty) -> Self {
        Self::new(id, instrument, side, OrderType::Limit, price, qty, 0, 0)
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn instrument(&self) -> InstrumentToken {
        self.instrument
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn kind(&self) -> OrderType {
        self.kind
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn total(&self) -> Qty {
        self.total
    }

    pub fn filled(&self) -> Qty {
        self.filled
    }

    pub fn working(&self) -> Qty {
        self.working
    }

    pub fn display(&self) -> Qty {
        self.display
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    /// Unfilled portion of the full order.
    pub fn remaining(&self) -> Qty {
        self.total.saturating_sub(self.filled)
    }

    /// Currently exposed, unfilled portion; the amount eligible to match.
    pub fn pending(&self) -> Qty {
        self.working.saturating_sub(self.filled)
    }

    /// True iff this order hides quantity behind a display clip.
    pub fn has_display(&self) -> bool {
        self.kind == OrderType::Iceberg && self.display > 0
    }

    pub fn add_fill(&mut self, qty: Qty) {
        self.filled += qty;
    }

    /// Changes the total quantity. Fails when the new total is below what has
    /// already filled; the order is left untouched in that case.
    pub fn set_total(&mut self, qty: Qty) -> bool {
        if qty < self.filled {
            return false;
        }
        self.total = qty;
        self.refresh_working();
        true
    }

    pub fn set_price(&mut self, price: Price) {
        self.price = price;
    }

    pub fn set_display(&mut self, display: Qty) {
        self.display = display;
    }

    /// Recomputes the exposed quantity. For iceberg orders the next clip is
    /// `min(display, remaining)` on top of what has filled; everything else
    /// exposes the full total.
    pub fn refresh_working(&mut self) {
        if self.has_display() {
            let remaining = self.remaining();
            if remaining == 0 {
                self.working = self.filled;
            } else {
                self.working = self.filled + self.display.min(remaining);
            }
        } else {
            self.working = self.total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_order_exposes_full_quantity() {
        let order = Order::limit(1, 7, Side::Buy, 1000, 25);
        assert_eq!(order.pending(), 25);
        assert_eq!(order.remaining(), 25);
        assert_eq!(order.working(), 25);
    }

    #[test]
    fn fills_reduce_pending_and_remaining() {
        let mut order = Order::limit(1, 7, Side::Sell, 1000, 25);
        order.add_fill(10);
        assert_eq!(order.pending(), 15);
        assert_eq!(order.remaining(), 15);
        order.add_fill(15);
        assert_eq!(order.pending(), 0);
        assert_eq!(order.remaining(), 0);
    }

    #[test]
    fn iceberg_exposes_one_clip() {
        let order = Order::new(1, 7, Side::Sell, OrderType::Iceberg, 1000, 12, 4, 0);
        assert_eq!(order.working(), 4);
        assert_eq!(order.pending(), 4);
        assert_eq!(order.remaining(), 12);
    }

    #[test]
    fn iceberg_refresh_advances_clips() {
        let mut order = Order::new(1, 7, Side::Sell, OrderType::Iceberg, 1000, 10, 4, 0);
        order.add_fill(4);
        assert_eq!(order.pending(), 0);
        assert_eq!(order.remaining(), 6);

        order.refresh_working();
        assert_eq!(order.pending(), 4);

        order.add_fill(4);
        order.refresh_working();
        // Final clip is smaller than the display quantity.
        assert_eq!(order.pending(), 2);

        order.add_fill(2);
        order.refresh_working();
        assert_eq!(order.pending(), 0);
        assert_eq!(order.remaining(), 0);
    }

    #[test]
    fn set_total_rejects_below_filled() {
        let mut order = Order::limit(1, 7, Side::Buy, 1000, 10);
        order.add_fill(4);
        assert!(!order.set_total(3));
        assert_eq!(order.total(), 10);
        assert!(order.set_total(4));
        assert_eq!(order.pending(), 0);
    }

    #[test]
    fn iceberg_without_display_behaves_like_limit() {
        let order = Order::new(1, 7, Side::Buy, OrderType::Iceberg, 1000, 12, 0, 0);
        assert!(!order.has_display());
        assert_eq!(order.pending(), 12);
    }
}
