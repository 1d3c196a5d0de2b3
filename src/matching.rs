//! Matching core - the order-type-parameterized crossing loop.
//!
//! The five order types share one algorithm. Each type picks two knobs -
//! whether the limit price constrains matching and whether a residual may
//! rest - plus an optional preflight (FOK liquidity check, iceberg display
//! defaulting). This keeps per-type edge cases in one auditable place
//! instead of five implementations.

use log::{debug, warn};
use thiserror::Error;

use crate::order::Order;
use crate::order_book::OrderBook;
use crate::types::{OrderId, OrderType, Price, Qty, Side, Trade};

/// Errors surfaced by submit/modify. Cancel reports not-found as `false`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookError {
    #[error("order {0} not found")]
    NotFound(OrderId),
    #[error("invalid order: {0}")]
    Invalid(&'static str),
}

/// The two knobs that differentiate order types in the crossing loop.
#[derive(Clone, Copy, Debug)]
struct MatchParams {
    respect_limit: bool,
    allow_rest: bool,
}

impl OrderBook {
    /// Accepts a new order: interns it in the arena, crosses it against the
    /// opposite side, and rests or releases the residual according to its
    /// type.
    ///
    /// A fill-or-kill order that fails its liquidity preflight is released
    /// silently with zero trades; that is an outcome, not an error.
    pub fn submit(&mut self, order: Order) -> Result<(), BookError> {
        let id = order.id();
        if order.total() == 0 {
            warn!("rejecting order {id}: zero quantity");
            return Err(BookError::Invalid("zero quantity"));
        }
        if self.arena.find(id).is_some() {
            warn!("rejecting order {id}: id already live");
            return Err(BookError::Invalid("duplicate order id"));
        }
        self.arena.store(order);
        self.process(id)
    }

    /// Type dispatch for an order already interned in the arena. Also the
    /// re-entry point for modify-with-reprice.
    pub(crate) fn process(&mut self, id: OrderId) -> Result<(), BookError> {
        match self.arena.require(id).kind() {
            OrderType::Limit => self.execute_match(
                id,
                MatchParams {
                    respect_limit: true,
                    allow_rest: true,
                },
            ),
            OrderType::Market => self.execute_match(
                id,
                MatchParams {
                    respect_limit: false,
                    allow_rest: false,
                },
            ),
            OrderType::Ioc => self.execute_match(
                id,
                MatchParams {
                    respect_limit: true,
                    allow_rest: false,
                },
            ),
            OrderType::Fok => {
                let (side, limit, required) = {
                    let order = self.arena.require(id);
                    (order.side(), order.price(), order.pending())
                };
                if self.available_against(side, limit, required) < required {
                    debug!("releasing FOK order {id}: insufficient liquidity at {limit}");
                    self.release(id);
                    return Ok(());
                }
                self.execute_match(
                    id,
                    MatchParams {
                        respect_limit: true,
                        allow_rest: false,
                    },
                )
            }
            OrderType::Iceberg => {
                let order = self.arena.require_mut(id);
                if order.display() == 0 {
                    let remaining = order.remaining();
                    order.set_display(remaining);
                }
                order.refresh_working();
                self.execute_match(
                    id,
                    MatchParams {
                        respect_limit: true,
                        allow_rest: true,
                    },
                )
            }
        }
    }

    /// The crossing loop. Trades always print at the resting order's price.
    fn execute_match(&mut self, id: OrderId, params: MatchParams) -> Result<(), BookError> {
        let (incoming_side, limit) = {
            let order = self.arena.require(id);
            (order.side(), order.price())
        };
        let opposite = incoming_side.opposite();

        loop {
            let pending = self.arena.require(id).pending();
            if pending == 0 {
                break;
            }

            let head = match self.index_mut(opposite).best() {
                Some((best_price, level)) => level.head_id().map(|head_id| (best_price, head_id)),
                None => None,
            };
            let Some((best_price, head_id)) = head else {
                break;
            };

            if params.respect_limit {
                let crosses = match incoming_side {
                    Side::Buy => limit >= best_price,
                    Side::Sell => limit <= best_price,
                };
                if !crosses {
                    break;
                }
            }

            let head_pending = self.arena.require(head_id).pending();
            if head_pending == 0 {
                // Stale head with nothing exposed; clear it and continue. An
                // iceberg with hidden remainder rejoins with a fresh clip.
                if !self.remove_resting(opposite, best_price, head_id) {
                    break;
                }
                continue;
            }
            let trade_qty = pending.min(head_pending);

            self.arena.require_mut(id).add_fill(trade_qty);
            self.arena.require_mut(head_id).add_fill(trade_qty);
            if let Some(level) = self.index_mut(opposite).find_mut(best_price) {
                level.dec_open_qty(trade_qty);
            }

            self.record_trade(Trade {
                instrument: self.instrument,
                aggressor_side: incoming_side,
                aggressor_id: id,
                resting_side: opposite,
                resting_id: head_id,
                price: best_price,
                qty: trade_qty,
            });

            if self.arena.require(head_id).pending() == 0 {
                self.remove_resting(opposite, best_price, head_id);
            }
        }

        let pending = self.arena.require(id).pending();
        if params.allow_rest && pending > 0 {
            if !self.rest_order(id) {
                warn!("rejecting order {id}: price {limit} outside supported range");
                self.release(id);
                return Err(BookError::Invalid("price outside supported range"));
            }
        } else {
            self.release(id);
        }
        Ok(())
    }

    /// Amends price and/or quantity of a resting order.
    ///
    /// Shrinking the quantity at the same price amends in place and keeps
    /// time priority. Any reprice, and any quantity increase, pulls the order
    /// off its level and pushes it back through the submit path as if freshly
    /// arrived - time priority is lost.
    pub fn modify(&mut self, id: OrderId, new_price: Price, new_qty: Qty) -> Result<(), BookError> {
        let Some(entry) = self.order_index.get(id) else {
            warn!("modify failed: order {id} not found");
            return Err(BookError::NotFound(id));
        };

        let (filled, old_price, old_total, pending) = {
            let order = self.arena.require(id);
            (order.filled(), order.price(), order.total(), order.pending())
        };
        if new_qty < filled {
            warn!("modify failed: order {id} quantity {new_qty} below filled {filled}");
            return Err(BookError::Invalid("quantity below filled"));
        }

        let price_changed = new_price != old_price;
        let qty_increased = new_qty > old_total;

        if !price_changed && !qty_increased {
            let after = {
                let order = self.arena.require_mut(id);
                order.set_total(new_qty);
                order.pending()
            };
            if after < pending {
                if let Some(level) = self.index_mut(entry.side).find_mut(entry.price) {
                    level.dec_open_qty(pending - after);
                }
            }
            if after == 0 {
                // Amended down to its filled quantity: nothing left to
                // trade, so the order leaves the book.
                let mut now_empty = false;
                if let Some(level) = self.index_mut(entry.side).find_mut(entry.price) {
                    level.remove_at(entry.slot, id, 0);
                    now_empty = level.is_empty();
                }
                if now_empty {
                    self.index_mut(entry.side).erase(entry.price);
                }
                self.release(id);
            }
            return Ok(());
        }

        let mut removed = false;
        let mut now_empty = false;
        if let Some(level) = self.index_mut(entry.side).find_mut(entry.price) {
            removed = level.remove_at(entry.slot, id, pending);
            now_empty = level.is_empty();
        }
        if !removed {
            self.order_index.clear(id);
            return Err(BookError::NotFound(id));
        }
        self.order_index.clear(id);
        if now_empty {
            self.index_mut(entry.side).erase(entry.price);
        }

        {
            let order = self.arena.require_mut(id);
            order.set_total(new_qty);
            order.set_price(new_price);
            order.refresh_working();
        }
        self.process(id)
    }
}
