//! Wire format - line-oriented, comma-separated order messages.
//!
//! `<order_id>,<instrument>,<side>,<price>,<qty>,<type>,<display>`
//!
//! Shared by the manual CLI, the generator, and the ingest path. Parsing is
//! strict: any malformed field drops the whole line.

use std::fmt;

use crate::types::{InstrumentToken, OrderId, OrderType, Price, Qty, Side};

/// One parsed order message, before it becomes an arena-owned `Order`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireOrder {
    pub order_id: OrderId,
    pub instrument: InstrumentToken,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    pub kind: OrderType,
    /// Zero unless the type is ICEBERG.
    pub display: Qty,
}

impl fmt::Display for WireOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{}",
            self.order_id, self.instrument, self.side, self.price, self.qty, self.kind, self.display
        )
    }
}

/// Parses one line. Returns `None` on any malformed field; the caller logs
/// and drops the line.
pub fn parse_line(line: &str) -> Option<WireOrder> {
    let mut parts = line.trim_end_matches(['\r', '\n']).split(',');
    let order_id = parts.next()?.parse().ok()?;
    let instrument = parts.next()?.parse().ok()?;
    let side = parts.next()?.parse().ok()?;
    let price = parts.next()?.parse().ok()?;
    let qty = parts.next()?.parse().ok()?;
    let kind = parts.next()?.parse().ok()?;
    let display = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(WireOrder {
        order_id,
        instrument,
        side,
        price,
        qty,
        kind,
        display,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let order = WireOrder {
            order_id: 42,
            instrument: 26000,
            side: Side::Buy,
            price: 1518,
            qty: 100,
            kind: OrderType::Iceberg,
            display: 10,
        };
        let line = order.to_string();
        assert_eq!(line, "42,26000,BUY,1518,100,ICEBERG,10");
        assert_eq!(parse_line(&line), Some(order));
    }

    #[test]
    fn parses_trailing_newline() {
        assert!(parse_line("1,26000,SELL,1000,5,LIMIT,0\n").is_some());
    }

    #[test]
    fn malformed_lines_are_dropped() {
        for line in [
            "",
            "1,26000,SELL,1000,5,LIMIT",          // too few fields
            "1,26000,SELL,1000,5,LIMIT,0,extra",  // too many fields
            "x,26000,SELL,1000,5,LIMIT,0",        // bad id
            "1,26000,HOLD,1000,5,LIMIT,0",        // bad side
            "1,26000,SELL,1000,5,GTC,0",          // bad type
            "1,26000,SELL,-5,5,LIMIT,0",          // signed price
            "1,26000,SELL,1000,,LIMIT,0",         // empty qty
        ] {
            assert_eq!(parse_line(line), None, "line should drop: {line:?}");
        }
    }
}
