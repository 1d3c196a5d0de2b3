//! Price Index - per-side mapping from price to price level.
//!
//! Two interchangeable backends satisfy one contract: best-of-side lookup,
//! exact-price lookup, lazy level creation, and erasure.
//!
//! `RingWindow` is the latency play: a power-of-two ring of cache-aligned
//! slots addressed by price offset from a latched base, with a cached best
//! slot. It only works while prices stay inside a bounded window; the
//! behavior for prices outside the window (recentre and migrate, or reject)
//! is fixed at construction. `OrderedMap` is the universal fallback: a
//! B-tree keyed by price whose iteration order, fixed per side, makes the
//! first non-empty entry the best.

use crate::price_level::PriceLevel;
use crate::types::{Price, Side};

/// Backend selection, decided by configuration rather than code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Ring of price slots around a latched base. `rebalance` chooses the
    /// out-of-window behavior: recentre the window (true) or reject (false).
    RingWindow { rebalance: bool },
    /// Ordered map; accepts any price.
    OrderedMap,
}

impl Default for Backend {
    fn default() -> Self {
        Backend::RingWindow { rebalance: true }
    }
}

/// Uniform contract both backends satisfy.
///
/// `best` returns the non-empty level with the numerically largest price for
/// the buy side and smallest for the sell side. `ensure` returns `None` only
/// when the backend cannot host the price (ring window in reject mode).
pub trait PriceIndex: Send {
    fn side(&self) -> Side;
    /// Best non-empty level, repairing any stale internal cache.
    fn best(&mut self) -> Option<(Price, &mut PriceLevel)>;
    /// Best non-empty level without touching caches.
    fn peek_best(&self) -> Option<(Price, &PriceLevel)>;
    fn find(&self, price: Price) -> Option<&PriceLevel>;
    fn find_mut(&mut self, price: Price) -> Option<&mut PriceLevel>;
    /// Level at `price`, created if absent.
    fn ensure(&mut self, price: Price) -> Option<&mut PriceLevel>;
    fn erase(&mut self, price: Price);
    /// Hint that the level at `price` just gained its first order, letting
    /// the backend update its best cache.
    fn mark_non_empty(&mut self, price: Price);
    /// Visits non-empty levels in unspecified order; return `false` to stop.
    fn for_each(&self, f: &mut dyn FnMut(Price, &PriceLevel) -> bool);
    fn is_empty(&self) -> bool;
}

pub fn make_index(backend: Backend, side: Side) -> Box<dyn PriceIndex> {
    match backend {
        Backend::RingWindow { rebalance } => Box::new(RingWindow::new(side, rebalance)),
        Backend::OrderedMap => Box::new(OrderedMap::new(side)),
    }
}

#[inline]
fn improves(side: Side, candidate: Price, current: Price) -> bool {
    match side {
        Side::Buy => candidate > current,
        Side::Sell => candidate < current,
    }
}

// ============================================================================
// Ring-window backend
// ============================================================================

const RING_CAPACITY: usize = 1024;
const RING_MASK: usize = RING_CAPACITY - 1;

const _: () = assert!(RING_CAPACITY.is_power_of_two());

#[derive(Default)]
#[repr(align(64))]
struct Slot {
    level: PriceLevel,
    price: Price,
    active: bool,
}

pub struct RingWindow {
    side: Side,
    slots: Vec<Slot>,
    base: Price,
    base_set: bool,
    active_levels: usize,
    best_slot: Option<usize>,
    rebalance: bool,
}

impl RingWindow {
    pub fn new(side: Side, rebalance: bool) -> Self {
        let mut slots = Vec::with_capacity(RING_CAPACITY);
        slots.resize_with(RING_CAPACITY, Slot::default);
        Self {
            side,
            slots,
            base: 0,
            base_set: false,
            active_levels: 0,
            best_slot: None,
            rebalance,
        }
    }

    /// First `ensure` centres the window on the observed price, clamped at
    /// the numeric floor.
    fn latch_base(&mut self, price: Price) {
        self.base = price.saturating_sub((RING_CAPACITY / 2) as Price);
        self.base_set = true;
    }

    #[inline]
    fn in_window(&self, price: Price) -> bool {
        price >= self.base && price - self.base < RING_CAPACITY as Price
    }

    #[inline]
    fn slot_index(&self, price: Price) -> usize {
        ((price - self.base) as usize) & RING_MASK
    }

    fn lookup(&self, price: Price) -> Option<usize> {
        if !self.base_set || !self.in_window(price) {
            return None;
        }
        let idx = self.slot_index(price);
        let slot = &self.slots[idx];
        if slot.active && slot.price == price {
            Some(idx)
        } else {
            None
        }
    }

    fn best_cache_valid(&self) -> bool {
        match self.best_slot {
            Some(idx) => {
                let slot = &self.slots[idx];
                slot.active && !slot.level.is_empty()
            }
            None => false,
        }
    }

    fn recompute_best(&mut self) {
        self.best_slot = None;
        let mut best_price = 0;
        for (idx, slot) in self.slots.iter().enumerate() {
            if !slot.active || slot.level.is_empty() {
                continue;
            }
            if self.best_slot.is_none() || improves(self.side, slot.price, best_price) {
                self.best_slot = Some(idx);
                best_price = slot.price;
            }
        }
    }

    fn update_best_candidate(&mut self, idx: usize) {
        let slot = &self.slots[idx];
        if !slot.active || slot.level.is_empty() {
            if self.best_slot == Some(idx) {
                self.best_slot = None;
            }
            return;
        }
        match self.best_slot {
            None => self.best_slot = Some(idx),
            Some(best) => {
                if improves(self.side, slot.price, self.slots[best].price) {
                    self.best_slot = Some(idx);
                }
            }
        }
    }

    /// Recentres the window so that `incoming` fits, migrating still-active
    /// levels. The new window is centred over the occupied span (active
    /// non-empty levels plus the incoming price). Fails, leaving the index
    /// untouched, when that span cannot fit in one window.
    fn recentre(&mut self, incoming: Price) -> bool {
        let mut lo = incoming;
        let mut hi = incoming;
        for slot in &self.slots {
            if slot.active && !slot.level.is_empty() {
                lo = lo.min(slot.price);
                hi = hi.max(slot.price);
            }
        }
        if hi - lo >= RING_CAPACITY as Price {
            return false;
        }
        let slack = RING_CAPACITY as Price - (hi - lo + 1);
        let new_base = lo.saturating_sub(slack / 2);

        let mut survivors = Vec::new();
        for slot in &mut self.slots {
            if slot.active && !slot.level.is_empty() {
                survivors.push((slot.price, std::mem::take(&mut slot.level)));
            }
            slot.level.clear();
            slot.active = false;
            slot.price = 0;
        }

        self.base = new_base;
        self.active_levels = 0;
        self.best_slot = None;
        for (price, level) in survivors {
            let idx = self.slot_index(price);
            let slot = &mut self.slots[idx];
            slot.level = level;
            slot.price = price;
            slot.active = true;
            self.active_levels += 1;
            self.update_best_candidate(idx);
        }
        true
    }
}

impl PriceIndex for RingWindow {
    fn side(&self) -> Side {
        self.side
    }

    fn best(&mut self) -> Option<(Price, &mut PriceLevel)> {
        if !self.best_cache_valid() {
            self.recompute_best();
        }
        let idx = self.best_slot?;
        let slot = &mut self.slots[idx];
        Some((slot.price, &mut slot.level))
    }

    fn peek_best(&self) -> Option<(Price, &PriceLevel)> {
        if self.best_cache_valid() {
            let slot = &self.slots[self.best_slot.unwrap()];
            return Some((slot.price, &slot.level));
        }
        let mut best: Option<usize> = None;
        let mut best_price = 0;
        for (idx, slot) in self.slots.iter().enumerate() {
            if !slot.active || slot.level.is_empty() {
                continue;
            }
            if best.is_none() || improves(self.side, slot.price, best_price) {
                best = Some(idx);
                best_price = slot.price;
            }
        }
        best.map(|idx| (self.slots[idx].price, &self.slots[idx].level))
    }

    fn find(&self, price: Price) -> Option<&PriceLevel> {
        self.lookup(price).map(|idx| &self.slots[idx].level)
    }

    fn find_mut(&mut self, price: Price) -> Option<&mut PriceLevel> {
        self.lookup(price).map(|idx| &mut self.slots[idx].level)
    }

    fn ensure(&mut self, price: Price) -> Option<&mut PriceLevel> {
        if !self.base_set {
            self.latch_base(price);
        }
        if !self.in_window(price) {
            if !self.rebalance || !self.recentre(price) {
                return None;
            }
        }
        let idx = self.slot_index(price);
        let slot = &mut self.slots[idx];
        if !slot.active {
            slot.active = true;
            slot.price = price;
            slot.level.clear();
            self.active_levels += 1;
        }
        debug_assert_eq!(self.slots[idx].price, price);
        Some(&mut self.slots[idx].level)
    }

    fn erase(&mut self, price: Price) {
        let Some(idx) = self.lookup(price) else {
            return;
        };
        let slot = &mut self.slots[idx];
        slot.level.clear();
        slot.active = false;
        self.active_levels = self.active_levels.saturating_sub(1);
        if self.best_slot == Some(idx) {
            self.best_slot = None;
            self.recompute_best();
        }
    }

    fn mark_non_empty(&mut self, price: Price) {
        if let Some(idx) = self.lookup(price) {
            self.update_best_candidate(idx);
        }
    }

    fn for_each(&self, f: &mut dyn FnMut(Price, &PriceLevel) -> bool) {
        for slot in &self.slots {
            if !slot.active || slot.level.is_empty() {
                continue;
            }
            if !f(slot.price, &slot.level) {
                return;
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.active_levels == 0
    }
}

// ============================================================================
// Ordered-map backend
// ============================================================================

use std::collections::BTreeMap;

pub struct OrderedMap {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
}

impl OrderedMap {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }
}

impl PriceIndex for OrderedMap {
    fn side(&self) -> Side {
        self.side
    }

    fn best(&mut self) -> Option<(Price, &mut PriceLevel)> {
        match self.side {
            Side::Buy => self
                .levels
                .iter_mut()
                .rev()
                .find(|(_, level)| !level.is_empty())
                .map(|(price, level)| (*price, level)),
            Side::Sell => self
                .levels
                .iter_mut()
                .find(|(_, level)| !level.is_empty())
                .map(|(price, level)| (*price, level)),
        }
    }

    fn peek_best(&self) -> Option<(Price, &PriceLevel)> {
        match self.side {
            Side::Buy => self
                .levels
                .iter()
                .rev()
                .find(|(_, level)| !level.is_empty())
                .map(|(price, level)| (*price, level)),
            Side::Sell => self
                .levels
                .iter()
                .find(|(_, level)| !level.is_empty())
                .map(|(price, level)| (*price, level)),
        }
    }

    fn find(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    fn find_mut(&mut self, price: Price) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    fn ensure(&mut self, price: Price) -> Option<&mut PriceLevel> {
        Some(self.levels.entry(price).or_default())
    }

    fn erase(&mut self, price: Price) {
        self.levels.remove(&price);
    }

    fn mark_non_empty(&mut self, _price: Price) {}

    fn for_each(&self, f: &mut dyn FnMut(Price, &PriceLevel) -> bool) {
        for (price, level) in &self.levels {
            if level.is_empty() {
                continue;
            }
            if !f(*price, level) {
                return;
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(index: &mut dyn PriceIndex, id: u64, price: Price, qty: u64) {
        let level = index.ensure(price).expect("price should fit");
        level.add_order(id, qty);
        index.mark_non_empty(price);
    }

    fn both_backends(side: Side) -> Vec<Box<dyn PriceIndex>> {
        vec![
            make_index(Backend::RingWindow { rebalance: true }, side),
            make_index(Backend::OrderedMap, side),
        ]
    }

    #[test]
    fn best_is_highest_bid_lowest_ask() {
        for mut index in both_backends(Side::Buy) {
            add(index.as_mut(), 1, 1000, 10);
            add(index.as_mut(), 2, 1005, 10);
            add(index.as_mut(), 3, 995, 10);
            assert_eq!(index.best().map(|(p, _)| p), Some(1005));
            assert_eq!(index.peek_best().map(|(p, _)| p), Some(1005));
        }
        for mut index in both_backends(Side::Sell) {
            add(index.as_mut(), 1, 1000, 10);
            add(index.as_mut(), 2, 1005, 10);
            add(index.as_mut(), 3, 995, 10);
            assert_eq!(index.best().map(|(p, _)| p), Some(995));
        }
    }

    #[test]
    fn erasing_best_falls_back_to_next() {
        for mut index in both_backends(Side::Buy) {
            add(index.as_mut(), 1, 1000, 10);
            add(index.as_mut(), 2, 1005, 10);
            index.erase(1005);
            assert_eq!(index.best().map(|(p, _)| p), Some(1000));
            index.erase(1000);
            assert!(index.best().is_none());
        }
    }

    #[test]
    fn empty_levels_are_not_best() {
        for mut index in both_backends(Side::Sell) {
            add(index.as_mut(), 1, 1000, 10);
            index.ensure(990);
            assert_eq!(index.best().map(|(p, _)| p), Some(1000));
        }
    }

    #[test]
    fn find_misses_unknown_prices() {
        for mut index in both_backends(Side::Buy) {
            add(index.as_mut(), 1, 1000, 10);
            assert!(index.find(1000).is_some());
            assert!(index.find(1001).is_none());
            assert!(index.find(10_000_000).is_none());
        }
    }

    #[test]
    fn for_each_visits_non_empty_levels() {
        for mut index in both_backends(Side::Sell) {
            add(index.as_mut(), 1, 1000, 10);
            add(index.as_mut(), 2, 1002, 20);
            index.ensure(1004);

            let mut seen = Vec::new();
            index.for_each(&mut |price, level| {
                seen.push((price, level.open_qty()));
                true
            });
            seen.sort_unstable();
            assert_eq!(seen, vec![(1000, 10), (1002, 20)]);
        }
    }

    #[test]
    fn for_each_early_exit() {
        for mut index in both_backends(Side::Sell) {
            add(index.as_mut(), 1, 1000, 10);
            add(index.as_mut(), 2, 1002, 20);
            let mut visits = 0;
            index.for_each(&mut |_, _| {
                visits += 1;
                false
            });
            assert_eq!(visits, 1);
        }
    }

    #[test]
    fn ring_window_latches_base_on_first_price() {
        let mut ring = RingWindow::new(Side::Buy, false);
        ring.ensure(100_000);
        assert_eq!(ring.base, 100_000 - (RING_CAPACITY as Price / 2));
        // Low prices clamp the base at zero.
        let mut low = RingWindow::new(Side::Buy, false);
        low.ensure(5);
        assert_eq!(low.base, 0);
        assert!(low.ensure(3).is_some());
    }

    #[test]
    fn ring_window_rejects_out_of_window_without_rebalance() {
        let mut ring = RingWindow::new(Side::Sell, false);
        add(&mut ring, 1, 100_000, 10);
        assert!(ring.ensure(200_000).is_none());
        assert!(ring.ensure(1_000).is_none());
        // In-window prices still work.
        assert!(ring.ensure(100_100).is_some());
    }

    #[test]
    fn ring_window_rebalances_around_incoming_price() {
        let mut ring = RingWindow::new(Side::Sell, true);
        add(&mut ring, 1, 100_000, 10);
        ring.erase(100_000);

        // Side is empty, so the window may move anywhere.
        assert!(ring.ensure(500_000).is_some());
        add(&mut ring, 2, 500_000, 7);
        assert_eq!(ring.best().map(|(p, _)| p), Some(500_000));
    }

    #[test]
    fn ring_window_rebalance_migrates_active_levels() {
        let mut ring = RingWindow::new(Side::Sell, true);
        add(&mut ring, 1, 100_000, 10);
        add(&mut ring, 2, 100_010, 20);

        // Just outside the initial window, but close enough that a window
        // centred on the best still holds everything.
        let target = ring.base + RING_CAPACITY as Price + 5;
        assert!(ring.ensure(target).is_some());
        add(&mut ring, 3, target, 30);

        assert_eq!(ring.find(100_000).map(PriceLevel::open_qty), Some(10));
        assert_eq!(ring.find(100_010).map(PriceLevel::open_qty), Some(20));
        assert_eq!(ring.find(target).map(PriceLevel::open_qty), Some(30));
        assert_eq!(ring.best().map(|(p, _)| p), Some(100_000));
    }

    #[test]
    fn ring_window_rebalance_fails_when_levels_cannot_fit() {
        let mut ring = RingWindow::new(Side::Sell, true);
        add(&mut ring, 1, 100_000, 10);
        // Far beyond any window that still contains 100_000.
        assert!(ring.ensure(900_000).is_none());
        assert_eq!(ring.find(100_000).map(PriceLevel::open_qty), Some(10));
    }

    #[test]
    fn ring_window_best_cache_survives_erase_of_non_best() {
        let mut ring = RingWindow::new(Side::Buy, true);
        add(&mut ring, 1, 1000, 10);
        add(&mut ring, 2, 1005, 10);
        ring.erase(1000);
        assert_eq!(ring.best().map(|(p, _)| p), Some(1005));
    }
}
