//! Manual order entry: prompts for each field and sends the wire line over
//! multicast.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

use simex::config::AppConfig;
use simex::net;
use simex::types::{OrderType, Qty};
use simex::wire::WireOrder;

/// Prompts until the parser accepts, or returns `None` on `q`/EOF.
fn prompt_value<T, F>(label: &str, parse: F) -> Option<T>
where
    F: Fn(&str) -> Option<T>,
{
    let stdin = io::stdin();
    loop {
        print!("{label} (or 'q' to quit): ");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).ok()? == 0 {
            return None;
        }
        let value = line.trim();
        if value.is_empty() {
            println!("Please provide a value.");
            continue;
        }
        if value.eq_ignore_ascii_case("q") || value.eq_ignore_ascii_case("quit") {
            return None;
        }
        match parse(value) {
            Some(parsed) => return Some(parsed),
            None => println!("Invalid input. Try again."),
        }
    }
}

fn parse_number<T: FromStr>(value: &str) -> Option<T> {
    value.parse().ok()
}

fn read_order() -> Option<WireOrder> {
    let order_id = prompt_value("Order id", parse_number)?;
    let instrument = prompt_value("Instrument token", parse_number)?;
    let side = prompt_value("Side [BUY|SELL]", |v| v.to_ascii_uppercase().parse().ok())?;
    let kind: OrderType =
        prompt_value("Type [LIMIT|MARKET|IOC|FOK|ICEBERG]", |v| v.to_ascii_uppercase().parse().ok())?;
    let price = if kind == OrderType::Market {
        0
    } else {
        prompt_value("Price (ticks)", parse_number)?
    };
    let qty: Qty = prompt_value("Quantity", |v| {
        parse_number::<Qty>(v).filter(|&q| q > 0)
    })?;
    let display = if kind == OrderType::Iceberg {
        prompt_value("Display quantity", parse_number)?
    } else {
        0
    };

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

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = AppConfig::from_file(&config_path)?;

    let socket = net::send_socket(config.network.mcast_iface).context("open send socket")?;
    let destination = (config.network.mcast_ip, config.network.mcast_port);

    println!(
        "Sending orders to {}:{} (iface {})",
        config.network.mcast_ip, config.network.mcast_port, config.network.mcast_iface
    );

    while let Some(order) = read_order() {
        let line = order.to_string();
        socket
            .send_to(line.as_bytes(), destination)
            .context("send order")?;
        println!("sent: {line}");
    }

    println!("bye");
    Ok(())
}
