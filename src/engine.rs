//! Engine - per-instrument event loop.
//!
//! Each instrument gets one engine thread that owns its book exclusively.
//! The loop pops parsed orders from the dispatcher queue with a spin-then-
//! yield discipline, submits them, and publishes the shared-memory snapshot
//! inline at the configured throttle. Engines share nothing mutable.

use log::{debug, info, warn};

use crate::order::Order;
use crate::order_book::OrderBook;
use crate::snapshot::SnapshotWriter;
use crate::types::InstrumentToken;
use crate::util::{now_nanos, pin_to_core, ShutdownFlag};
use crate::wire::WireOrder;

pub struct Engine {
    book: OrderBook,
    token: InstrumentToken,
    snapshots: Option<SnapshotWriter>,
}

impl Engine {
    pub fn new(mut book: OrderBook, token: InstrumentToken, snapshots: Option<SnapshotWriter>) -> Self {
        book.set_instrument_token(token);
        Self {
            book,
            token,
            snapshots,
        }
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    /// Runs until shutdown. On shutdown the incoming queue is drained before
    /// returning; outstanding resting orders are discarded with the book.
    pub fn run(
        &mut self,
        mut queue: rtrb::Consumer<WireOrder>,
        shutdown: &ShutdownFlag,
        core: Option<usize>,
    ) {
        pin_to_core(core);
        info!("engine for instrument {} started", self.token);

        let mut spins: u32 = 0;
        loop {
            match queue.pop() {
                Ok(inbound) => {
                    self.apply(inbound);
                    if let Some(snapshots) = &mut self.snapshots {
                        snapshots.maybe_publish(&self.book);
                    }
                }
                Err(_) => {
                    if shutdown.is_raised() {
                        break;
                    }
                    spins = spins.wrapping_add(1);
                    if spins % 1000 == 0 {
                        std::thread::yield_now();
                    }
                }
            }
        }

        if let Some(snapshots) = &mut self.snapshots {
            snapshots.publish(&self.book);
        }
        let dropped = self.book.trade_overflow_count();
        if dropped > 0 {
            warn!(
                "engine for instrument {} dropped {dropped} trades under listener overload",
                self.token
            );
        }
        info!(
            "engine for instrument {} stopped ({} orders resting)",
            self.token,
            self.book.order_count()
        );
    }

    fn apply(&mut self, inbound: WireOrder) {
        debug_assert_eq!(inbound.instrument, self.token);
        let order = Order::new(
            inbound.order_id,
            inbound.instrument,
            inbound.side,
            inbound.kind,
            inbound.price,
            inbound.qty,
            inbound.display,
            now_nanos(),
        );
        if let Err(err) = self.book.submit(order) {
            // Already logged at the rejection site; keep a debug trail here.
            debug!("order {} rejected: {err}", inbound.order_id);
        }
    }
}
