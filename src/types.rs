//! Shared scalar types, order attributes, and the trade record.
//!
//! Prices are integer ticks and quantities are integer lots throughout the
//! core; conversion to floating point happens only at the snapshot boundary.

use std::fmt;
use std::str::FromStr;

/// Dense order identifier assigned by the ingress layer. Never reused.
pub type OrderId = u64;

/// Price in integer ticks.
pub type Price = u64;

/// Quantity in integer lots.
pub type Qty = u64;

/// Identifier scoping a single book instance. Orders with different tokens
/// are never matched against each other.
pub type InstrumentToken = u32;

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    /// Returns the opposite side.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            _ => Err(()),
        }
    }
}

/// Order type. The five types are not separate implementations but
/// parameterisations of one crossing loop; see `matching`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OrderType {
    /// Rests in the book if not fully matched.
    #[default]
    Limit = 0,
    /// Ignores the limit price; never rests.
    Market = 1,
    /// Immediate-or-cancel: respects the limit, cancels any residual.
    Ioc = 2,
    /// Fill-or-kill: all-or-nothing, checked against book liquidity upfront.
    Fok = 3,
    /// Shows at most `display` lots at a time, refreshing clips at the tail.
    Iceberg = 4,
}

impl OrderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::Ioc => "IOC",
            OrderType::Fok => "FOK",
            OrderType::Iceberg => "ICEBERG",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "LIMIT" => Ok(OrderType::Limit),
            "MARKET" => Ok(OrderType::Market),
            "IOC" => Ok(OrderType::Ioc),
            "FOK" => Ok(OrderType::Fok),
            "ICEBERG" => Ok(OrderType::Iceberg),
            _ => Err(()),
        }
    }
}

/// Immutable record of one fill. Owned by the trade ring until the listener
/// has consumed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trade {
    pub instrument: InstrumentToken,
    pub aggressor_side: Side,
    pub aggressor_id: OrderId,
    pub resting_side: Side,
    pub resting_id: OrderId,
    /// Always the resting order's price, never the aggressor's.
    pub price: Price,
    /// Strictly positive.
    pub qty: Qty,
}
