//! Stress tests: high contention at single price levels, deep sweeps, rapid
//! order churn, and iceberg storms, with conservation checks throughout.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use simex::{Backend, Order, OrderBook, OrderId, OrderType, Price, Qty, Side};

fn limit(id: OrderId, side: Side, price: Price, qty: Qty) -> Order {
    Order::limit(id, 1, side, price, qty)
}

#[test]
fn churn_at_a_single_price() {
    let mut book = OrderBook::default();
    const N: u64 = 10_000;

    for id in 0..N {
        book.submit(limit(id, Side::Buy, 100_000, 10)).unwrap();
    }
    assert_eq!(book.open_qty_at(Side::Buy, 100_000), N * 10);

    // Cancel every other order.
    for id in (0..N).step_by(2) {
        assert!(book.cancel(id));
    }
    assert_eq!(book.open_qty_at(Side::Buy, 100_000), N / 2 * 10);
    assert_eq!(book.order_count() as u64, N / 2);

    // One sell consumes the survivors exactly.
    book.submit(limit(N, Side::Sell, 100_000, N / 2 * 10)).unwrap();
    assert_eq!(book.open_qty_at(Side::Buy, 100_000), 0);
    assert_eq!(book.order_count(), 0);
    assert!(book.best_bid().is_none());
}

#[test]
fn cancelled_head_never_trades() {
    let mut book = OrderBook::default();
    book.submit(limit(1, Side::Sell, 1000, 10)).unwrap();
    book.submit(limit(2, Side::Sell, 1000, 10)).unwrap();
    assert!(book.cancel(1));

    book.submit(limit(3, Side::Buy, 1000, 10)).unwrap();
    assert_eq!(book.order_count(), 0);
    assert_eq!(book.open_qty_at(Side::Sell, 1000), 0);
}

#[test]
fn deep_sweep_across_many_levels() {
    for backend in [Backend::RingWindow { rebalance: true }, Backend::OrderedMap] {
        let mut book = OrderBook::new(backend);
        const LEVELS: u64 = 500;

        for i in 0..LEVELS {
            book.submit(limit(i, Side::Sell, 100_000 + i, 5)).unwrap();
        }
        assert_eq!(book.best_ask().map(Order::price), Some(100_000));

        // Sweep everything plus a residual that rests at the top.
        book.submit(limit(LEVELS, Side::Buy, 100_000 + LEVELS, LEVELS * 5 + 7))
            .unwrap();
        assert!(book.best_ask().is_none());
        let best = book.best_bid().expect("residual rests");
        assert_eq!(best.price(), 100_000 + LEVELS);
        assert_eq!(best.pending(), 7);
        assert_eq!(book.last_trade_price(), 100_000 + LEVELS - 1);
    }
}

#[test]
fn iceberg_storm_conserves_quantity() {
    let mut book = OrderBook::default();
    const ICEBERGS: u64 = 100;
    const TOTAL: Qty = 50;
    const DISPLAY: Qty = 7;

    for id in 0..ICEBERGS {
        book.submit(Order::new(id, 1, Side::Sell, OrderType::Iceberg, 1000, TOTAL, DISPLAY, 0))
            .unwrap();
    }
    // Only the exposed clips count toward depth.
    assert_eq!(book.open_qty_at(Side::Sell, 1000), ICEBERGS * DISPLAY);

    // Consume everything with one aggressor; hidden quantity refreshes until
    // the full supply is gone.
    book.submit(limit(ICEBERGS, Side::Buy, 1000, ICEBERGS * TOTAL)).unwrap();
    assert_eq!(book.open_qty_at(Side::Sell, 1000), 0);
    assert_eq!(book.order_count(), 0);
    assert!(book.best_bid().is_none());
}

#[test]
fn modify_churn_keeps_depth_consistent() {
    let mut book = OrderBook::default();
    const N: u64 = 1_000;

    for id in 0..N {
        book.submit(limit(id, Side::Buy, 100_000, 10)).unwrap();
    }

    // Track every order's quantity independently; the level's open quantity
    // must equal the sum at all times.
    let mut quantities: Vec<Qty> = vec![10; N as usize];
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for _ in 0..5_000 {
        let id = rng.gen_range(0..N);
        let new_qty = rng.gen_range(1..30);
        book.modify(id, 100_000, new_qty).unwrap();
        quantities[id as usize] = new_qty;

        let expected: Qty = quantities.iter().sum();
        assert_eq!(book.open_qty_at(Side::Buy, 100_000), expected);
    }
    assert_eq!(book.order_count() as u64, N);
}

#[test]
fn interleaved_flow_over_wide_map_book() {
    // The ordered map has no window, so spread prices across a wide band.
    let mut book = OrderBook::new(Backend::OrderedMap);
    let mut rng = ChaCha8Rng::seed_from_u64(0xFEED);
    let mut next_id: OrderId = 0;
    let mut live: Vec<OrderId> = Vec::new();

    for _ in 0..50_000 {
        if live.is_empty() || rng.gen_bool(0.65) {
            let id = next_id;
            next_id += 1;
            let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
            let price = rng.gen_range(1..1_000_000);
            let qty = rng.gen_range(1..100);
            book.submit(limit(id, side, price, qty)).unwrap();
            live.push(id);
        } else {
            let idx = rng.gen_range(0..live.len());
            book.cancel(live.swap_remove(idx));
        }

        // The book must never be crossed.
        let bid = book.best_bid().map(Order::price);
        let ask = book.best_ask().map(Order::price);
        if let (Some(bid), Some(ask)) = (bid, ask) {
            assert!(bid < ask, "crossed book: {bid} >= {ask}");
        }
    }
}
