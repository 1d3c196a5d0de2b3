//! # Simex
//!
//! A single-venue limit order matching engine.
//!
//! ## Design principles
//!
//! - **Single-writer books**: one engine thread per instrument owns all book
//!   state exclusively (no locks on the matching path)
//! - **Handles over pointers**: orders live in a dense arena; price levels
//!   and the order index refer to them by id and slot
//! - **One crossing loop**: the five order types are parameterisations of a
//!   single algorithm, not five implementations
//! - **Decoupled consumers**: trades leave through an SPSC ring; depth leaves
//!   through seqlock'd shared memory
//!
//! ## Architecture
//!
//! ```text
//! [Multicast] -> [Dispatcher] -> [SPSC queue] -> [Engine Thread]
//!                                                   |       |
//!                                          [Trade Ring]  [Shm Snapshot]
//!                                                   |       |
//!                                            [Listener]  [Viewer]
//! ```

pub mod arena;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod logging;
pub mod matching;
pub mod net;
pub mod order;
pub mod order_book;
pub mod order_index;
pub mod price_index;
pub mod price_level;
pub mod snapshot;
pub mod trade_ring;
pub mod types;
pub mod util;
pub mod wire;

// Re-exports for convenience
pub use arena::OrderArena;
pub use config::AppConfig;
pub use engine::Engine;
pub use matching::BookError;
pub use order::Order;
pub use order_book::{OrderBook, TradeListener};
pub use price_index::{Backend, PriceIndex};
pub use price_level::PriceLevel;
pub use trade_ring::TradeRing;
pub use types::{InstrumentToken, OrderId, OrderType, Price, Qty, Side, Trade};
pub use wire::WireOrder;
