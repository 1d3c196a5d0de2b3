//! Randomized cross-check against a naive but obviously-correct reference
//! book. The optimized engine and the reference must agree on depth, best
//! prices, and live-order counts after every operation.

use std::collections::{BTreeMap, HashMap};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use simex::{Backend, Order, OrderBook, OrderId, OrderType, Price, Qty, Side};

/// Reference implementation: sorted maps of FIFO queues.
#[derive(Default)]
struct ReferenceBook {
    bids: BTreeMap<Price, Vec<(OrderId, Qty)>>,
    asks: BTreeMap<Price, Vec<(OrderId, Qty)>>,
    orders: HashMap<OrderId, (Side, Price)>,
}

impl ReferenceBook {
    fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    fn open_qty_at(&self, side: Side, price: Price) -> Qty {
        let book = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        book.get(&price)
            .map_or(0, |level| level.iter().map(|&(_, qty)| qty).sum())
    }

    fn cross(&mut self, side: Side, limit: Price, mut qty: Qty) -> Qty {
        loop {
            if qty == 0 {
                break;
            }
            let best = match side {
                Side::Buy => self.best_ask().filter(|&ask| ask <= limit),
                Side::Sell => self.best_bid().filter(|&bid| bid >= limit),
            };
            let Some(price) = best else { break };
            let book = match side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };
            let level = book.get_mut(&price).unwrap();
            while !level.is_empty() && qty > 0 {
                let traded = level[0].1.min(qty);
                level[0].1 -= traded;
                qty -= traded;
                if level[0].1 == 0 {
                    let (maker, _) = level.remove(0);
                    self.orders.remove(&maker);
                }
            }
            if level.is_empty() {
                book.remove(&price);
            }
        }
        qty
    }

    fn place_limit(&mut self, id: OrderId, side: Side, price: Price, qty: Qty) {
        let residual = self.cross(side, price, qty);
        if residual > 0 {
            let book = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            book.entry(price).or_default().push((id, residual));
            self.orders.insert(id, (side, price));
        }
    }

    fn place_ioc(&mut self, side: Side, price: Price, qty: Qty) {
        self.cross(side, price, qty);
    }

    fn cancel(&mut self, id: OrderId) -> bool {
        let Some((side, price)) = self.orders.remove(&id) else {
            return false;
        };
        let book = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if let Some(level) = book.get_mut(&price) {
            level.retain(|&(order, _)| order != id);
            if level.is_empty() {
                book.remove(&price);
            }
        }
        true
    }

    fn order_count(&self) -> usize {
        self.orders.len()
    }
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Limit(OrderId, Side, Price, Qty),
    Ioc(OrderId, Side, Price, Qty),
    Cancel(OrderId),
}

/// Prices stay within a few hundred ticks so the ring window never needs to
/// move; the same stream then exercises both backends identically.
fn generate_ops(seed: u64, count: usize) -> Vec<Op> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut ops = Vec::with_capacity(count);
    let mut live: Vec<OrderId> = Vec::new();
    let mut next_id: OrderId = 1;

    for _ in 0..count {
        let roll = rng.gen_range(0..100);
        if roll < 60 || live.is_empty() {
            let id = next_id;
            next_id += 1;
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let price = rng.gen_range(99_800..100_200);
            let qty = rng.gen_range(1..500);
            ops.push(Op::Limit(id, side, price, qty));
            live.push(id);
        } else if roll < 75 {
            let id = next_id;
            next_id += 1;
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let price = rng.gen_range(99_800..100_200);
            let qty = rng.gen_range(1..500);
            ops.push(Op::Ioc(id, side, price, qty));
        } else {
            let idx = rng.gen_range(0..live.len());
            ops.push(Op::Cancel(live.swap_remove(idx)));
        }
    }
    ops
}

fn check_agreement(book: &OrderBook, reference: &ReferenceBook, touched: &[Price]) {
    assert_eq!(
        book.best_bid().map(Order::price),
        reference.best_bid(),
        "best bid diverged"
    );
    assert_eq!(
        book.best_ask().map(Order::price),
        reference.best_ask(),
        "best ask diverged"
    );
    for &price in touched {
        assert_eq!(
            book.open_qty_at(Side::Buy, price),
            reference.open_qty_at(Side::Buy, price),
            "bid depth diverged at {price}"
        );
        assert_eq!(
            book.open_qty_at(Side::Sell, price),
            reference.open_qty_at(Side::Sell, price),
            "ask depth diverged at {price}"
        );
    }
    assert_eq!(book.order_count(), reference.order_count(), "live order count diverged");
}

fn run_fuzz(backend: Backend, seed: u64, count: usize) {
    let ops = generate_ops(seed, count);
    let mut book = OrderBook::new(backend);
    let mut reference = ReferenceBook::default();
    let mut touched = Vec::new();

    for op in &ops {
        match *op {
            Op::Limit(id, side, price, qty) => {
                book.submit(Order::limit(id, 1, side, price, qty)).unwrap();
                reference.place_limit(id, side, price, qty);
                touched.push(price);
            }
            Op::Ioc(id, side, price, qty) => {
                book.submit(Order::new(id, 1, side, OrderType::Ioc, price, qty, 0, 0))
                    .unwrap();
                reference.place_ioc(side, price, qty);
                touched.push(price);
            }
            Op::Cancel(id) => {
                let ours = book.cancel(id);
                let theirs = reference.cancel(id);
                assert_eq!(ours, theirs, "cancel({id}) outcome diverged");
            }
        }
        if touched.len() > 64 {
            touched.drain(..32);
        }
        check_agreement(&book, &reference, &touched);
    }

    // Final full-depth comparison through the snapshot.
    let mut bids = Vec::new();
    let mut asks = Vec::new();
    book.snapshot(&mut bids, &mut asks);
    let ref_bids: Vec<(Price, Qty)> = reference
        .bids
        .iter()
        .rev()
        .map(|(&price, level)| (price, level.iter().map(|&(_, qty)| qty).sum()))
        .collect();
    let ref_asks: Vec<(Price, Qty)> = reference
        .asks
        .iter()
        .map(|(&price, level)| (price, level.iter().map(|&(_, qty)| qty).sum()))
        .collect();
    assert_eq!(bids, ref_bids);
    assert_eq!(asks, ref_asks);
}

#[test]
fn fuzz_ring_window_small() {
    run_fuzz(Backend::RingWindow { rebalance: true }, 0xDEAD_BEEF, 2_000);
}

#[test]
fn fuzz_ordered_map_small() {
    run_fuzz(Backend::OrderedMap, 0xDEAD_BEEF, 2_000);
}

#[test]
fn fuzz_ring_window_large() {
    run_fuzz(Backend::RingWindow { rebalance: true }, 0xCAFE_BABE, 20_000);
}

#[test]
fn fuzz_ordered_map_large() {
    run_fuzz(Backend::OrderedMap, 0xCAFE_BABE, 20_000);
}

#[test]
fn backends_agree_with_each_other() {
    let ops = generate_ops(7, 5_000);
    let mut ring = OrderBook::new(Backend::RingWindow { rebalance: true });
    let mut map = OrderBook::new(Backend::OrderedMap);

    for op in &ops {
        match *op {
            Op::Limit(id, side, price, qty) => {
                ring.submit(Order::limit(id, 1, side, price, qty)).unwrap();
                map.submit(Order::limit(id, 1, side, price, qty)).unwrap();
            }
            Op::Ioc(id, side, price, qty) => {
                ring.submit(Order::new(id, 1, side, OrderType::Ioc, price, qty, 0, 0))
                    .unwrap();
                map.submit(Order::new(id, 1, side, OrderType::Ioc, price, qty, 0, 0))
                    .unwrap();
            }
            Op::Cancel(id) => {
                assert_eq!(ring.cancel(id), map.cancel(id));
            }
        }
    }

    let (mut ring_bids, mut ring_asks) = (Vec::new(), Vec::new());
    let (mut map_bids, mut map_asks) = (Vec::new(), Vec::new());
    ring.snapshot(&mut ring_bids, &mut ring_asks);
    map.snapshot(&mut map_bids, &mut map_asks);
    assert_eq!(ring_bids, map_bids);
    assert_eq!(ring_asks, map_asks);
    assert_eq!(ring.order_count(), map.order_count());
}
