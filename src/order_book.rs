//! Order Book - per-instrument book state and public facade.
//!
//! Owns the arena, both price indexes, and the order index, and wires the
//! trade ring to its dispatch worker. All mutation happens on the owning
//! engine thread; the only cross-thread state is the trade ring and the
//! last-trade scalars.
//!
//! The matching algorithms live in `matching`; this module provides the
//! structural operations they compose (rest, remove, release, liquidity
//! sums) plus the read-only views.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::arena::OrderArena;
use crate::order::Order;
use crate::order_index::{OrderIndex, OrderRef};
use crate::price_index::{make_index, Backend, PriceIndex};
use crate::price_level::INVALID_SLOT;
use crate::trade_ring::{TradeConsumer, TradeProducer, TradeRing, DEFAULT_CAPACITY};
use crate::types::{InstrumentToken, OrderId, Price, Qty, Side, Trade};

/// Callback invoked from the trade-dispatch thread for every delivered trade.
pub type TradeListener = Box<dyn Fn(&Trade) + Send + Sync>;

#[derive(Default)]
struct LastTrade {
    price: AtomicU64,
    qty: AtomicU64,
}

pub struct OrderBook {
    pub(crate) bids: Box<dyn PriceIndex>,
    pub(crate) asks: Box<dyn PriceIndex>,
    pub(crate) arena: OrderArena,
    pub(crate) order_index: OrderIndex,
    pub(crate) instrument: InstrumentToken,
    trades: TradeProducer,
    last_trade: Arc<LastTrade>,
    listener: Arc<RwLock<Option<TradeListener>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl OrderBook {
    pub fn new(backend: Backend) -> Self {
        let (producer, consumer) = TradeRing::new(DEFAULT_CAPACITY).split();
        let listener: Arc<RwLock<Option<TradeListener>>> = Arc::new(RwLock::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let worker = spawn_trade_worker(consumer, listener.clone(), running.clone());

        Self {
            bids: make_index(backend, Side::Buy),
            asks: make_index(backend, Side::Sell),
            arena: OrderArena::new(),
            order_index: OrderIndex::new(),
            instrument: 0,
            trades: producer,
            last_trade: Arc::new(LastTrade::default()),
            listener,
            running,
            worker: Some(worker),
        }
    }

    // ========================================================================
    // Facade: read-only views
    // ========================================================================

    /// Head order at the best bid, if any.
    pub fn best_bid(&self) -> Option<&Order> {
        let (_, level) = self.bids.peek_best()?;
        self.arena.find(level.head_id()?)
    }

    /// Head order at the best ask, if any.
    pub fn best_ask(&self) -> Option<&Order> {
        let (_, level) = self.asks.peek_best()?;
        self.arena.find(level.head_id()?)
    }

    /// Open quantity resting at one price, zero when the level is absent.
    pub fn open_qty_at(&self, side: Side, price: Price) -> Qty {
        self.index(side)
            .find(price)
            .map_or(0, |level| level.open_qty())
    }

    /// Emits both sides as `(price, open_qty)` sequences ordered best-first.
    pub fn snapshot(&self, bids: &mut Vec<(Price, Qty)>, asks: &mut Vec<(Price, Qty)>) {
        bids.clear();
        asks.clear();
        self.bids.for_each(&mut |price, level| {
            bids.push((price, level.open_qty()));
            true
        });
        self.asks.for_each(&mut |price, level| {
            asks.push((price, level.open_qty()));
            true
        });
        bids.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        asks.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    }

    /// Price of the most recent trade observed by the matching core.
    pub fn last_trade_price(&self) -> Price {
        self.last_trade.price.load(Ordering::Relaxed)
    }

    pub fn last_trade_qty(&self) -> Qty {
        self.last_trade.qty.load(Ordering::Relaxed)
    }

    pub fn set_trade_listener(&self, listener: impl Fn(&Trade) + Send + Sync + 'static) {
        *self.listener.write().unwrap() = Some(Box::new(listener));
    }

    pub fn set_instrument_token(&mut self, token: InstrumentToken) {
        self.instrument = token;
    }

    pub fn instrument_token(&self) -> InstrumentToken {
        self.instrument
    }

    /// Trades dropped by the ring under overflow.
    pub fn trade_overflow_count(&self) -> u64 {
        self.trades.overflow_count()
    }

    /// Number of live orders owned by the arena.
    pub fn order_count(&self) -> usize {
        self.arena.len()
    }

    // ========================================================================
    // Facade: cancel
    // ========================================================================

    /// Removes a resting order. Returns `false` for unknown ids.
    pub fn cancel(&mut self, id: OrderId) -> bool {
        let Some(entry) = self.order_index.get(id) else {
            warn!("cancel failed: order {id} not found");
            return false;
        };
        let pending = self.arena.find(id).map_or(0, Order::pending);
        let mut removed = false;
        let mut now_empty = false;
        if let Some(level) = self.index_mut(entry.side).find_mut(entry.price) {
            removed = level.remove_at(entry.slot, id, pending);
            now_empty = level.is_empty();
        }
        if !removed {
            self.order_index.clear(id);
            return false;
        }
        if now_empty {
            self.index_mut(entry.side).erase(entry.price);
        }
        self.order_index.clear(id);
        self.arena.erase(id);
        true
    }

    // ========================================================================
    // Structural operations used by the matching core
    // ========================================================================

    #[inline]
    pub(crate) fn index(&self, side: Side) -> &dyn PriceIndex {
        match side {
            Side::Buy => self.bids.as_ref(),
            Side::Sell => self.asks.as_ref(),
        }
    }

    #[inline]
    pub(crate) fn index_mut(&mut self, side: Side) -> &mut dyn PriceIndex {
        match side {
            Side::Buy => self.bids.as_mut(),
            Side::Sell => self.asks.as_mut(),
        }
    }

    /// Stores the last-trade scalars and enqueues the trade for dispatch.
    /// The scalars are published before the ring so a listener never observes
    /// a trade its `last_trade_*` reads predate.
    pub(crate) fn record_trade(&self, trade: Trade) {
        self.last_trade.price.store(trade.price, Ordering::Relaxed);
        self.last_trade.qty.store(trade.qty, Ordering::Relaxed);
        self.trades.push(trade);
    }

    /// Turns an order that was not fully filled into resting depth. Returns
    /// `false` when the price index cannot host the price.
    pub(crate) fn rest_order(&mut self, id: OrderId) -> bool {
        let order = self.arena.require_mut(id);
        order.refresh_working();
        let side = order.side();
        let price = order.price();
        let pending = order.pending();

        let Some(level) = self.index_mut(side).ensure(price) else {
            return false;
        };
        let was_empty = level.is_empty();
        let slot = level.add_order(id, pending);
        self.order_index.set(id, OrderRef { side, price, slot });
        if was_empty {
            self.index_mut(side).mark_non_empty(price);
        }
        true
    }

    /// Unlinks a fully-filled resting order from its level. An iceberg with
    /// hidden remainder refreshes its clip and rejoins the same level at the
    /// tail; everything else is released. Returns `false` when the order was
    /// not on the level it was recorded at.
    pub(crate) fn remove_resting(&mut self, side: Side, price: Price, id: OrderId) -> bool {
        let slot = self
            .order_index
            .get(id)
            .map_or(INVALID_SLOT, |entry| entry.slot);
        let pending = self.arena.require(id).pending();
        let mut removed = false;
        let mut now_empty = false;
        if let Some(level) = self.index_mut(side).find_mut(price) {
            removed = level.remove_at(slot, id, pending);
            now_empty = level.is_empty();
        }
        if !removed {
            return false;
        }
        self.order_index.clear(id);
        if now_empty {
            self.index_mut(side).erase(price);
        }

        let order = self.arena.require(id);
        let requeue = order.has_display() && order.remaining() > 0;
        if !requeue || !self.rest_order(id) {
            self.release(id);
        }
        true
    }

    /// Erases an order from the arena, clearing any index entry first.
    pub(crate) fn release(&mut self, id: OrderId) {
        self.order_index.clear(id);
        self.arena.erase(id);
    }

    /// Sums opposite-side open quantity at prices satisfying `limit`,
    /// stopping early once `threshold` is reached.
    pub(crate) fn available_against(
        &self,
        incoming_side: Side,
        limit: Price,
        threshold: Qty,
    ) -> Qty {
        let mut total: Qty = 0;
        self.index(incoming_side.opposite())
            .for_each(&mut |price, level| {
                let qualifies = match incoming_side {
                    Side::Buy => price <= limit,
                    Side::Sell => price >= limit,
                };
                if qualifies {
                    total += level.open_qty();
                }
                total < threshold
            });
        total
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new(Backend::default())
    }
}

impl Drop for OrderBook {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn spawn_trade_worker(
    consumer: TradeConsumer,
    listener: Arc<RwLock<Option<TradeListener>>>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("trade-dispatch".into())
        .spawn(move || {
            loop {
                match consumer.pop() {
                    Some(trade) => {
                        let guard = listener.read().unwrap();
                        match guard.as_ref() {
                            Some(callback) => callback(&trade),
                            None => debug!(
                                "TRADE: token={} {} {} x{} @ {} against {} {}",
                                trade.instrument,
                                trade.aggressor_side,
                                trade.aggressor_id,
                                trade.qty,
                                trade.price,
                                trade.resting_side,
                                trade.resting_id,
                            ),
                        }
                    }
                    None => {
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            }
            let dropped = consumer.overflow_count();
            if dropped > 0 {
                warn!("trade ring dropped {dropped} trades under overflow");
            }
        })
        .expect("spawn trade-dispatch thread")
}
