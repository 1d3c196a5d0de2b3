//! Order Arena - dense, id-keyed owning storage for live orders.
//!
//! Order ids are assigned densely by the ingress layer, so a plain vector
//! indexed by id gives O(1) lookup with no hashing. Capacity grows in fixed
//! chunks to amortise allocation. Iteration is deliberately not supported;
//! the order index and price levels provide all traversal needs.

use crate::order::Order;
use crate::types::OrderId;

const CHUNK: usize = 512;

/// Owning storage for every live order in one book.
#[derive(Default)]
pub struct OrderArena {
    slots: Vec<Option<Order>>,
    live: usize,
}

impl OrderArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts ownership of an order. The id must already be assigned.
    /// Callers reject duplicate live ids before storing.
    pub fn store(&mut self, order: Order) {
        let id = order.id();
        self.ensure_capacity(id);
        let slot = &mut self.slots[id as usize];
        debug_assert!(slot.is_none(), "arena slot {id} already occupied");
        if slot.is_none() {
            self.live += 1;
        }
        *slot = Some(order);
    }

    /// Borrow by id; absence is a normal outcome.
    #[inline]
    pub fn find(&self, id: OrderId) -> Option<&Order> {
        self.slots.get(id as usize).and_then(|slot| slot.as_ref())
    }

    #[inline]
    pub fn find_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.slots.get_mut(id as usize).and_then(|slot| slot.as_mut())
    }

    /// Borrow by id; absence is a programmer error and aborts the engine
    /// thread for this instrument.
    #[inline]
    pub fn require(&self, id: OrderId) -> &Order {
        self.find(id)
            .unwrap_or_else(|| panic!("invariant violated: order {id} missing from arena"))
    }

    #[inline]
    pub fn require_mut(&mut self, id: OrderId) -> &mut Order {
        self.find_mut(id)
            .unwrap_or_else(|| panic!("invariant violated: order {id} missing from arena"))
    }

    /// Destroys the order. Subsequent `find` returns `None`.
    pub fn erase(&mut self, id: OrderId) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            if slot.take().is_some() {
                self.live -= 1;
            }
        }
    }

    /// Number of live orders.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn ensure_capacity(&mut self, id: OrderId) {
        let required = id as usize + 1;
        if required > self.slots.len() {
            let rounded = required.div_ceil(CHUNK) * CHUNK;
            self.slots.resize_with(rounded, || None);
        }
    }
}
