//! Synthetic order generator.
//!
//! Multi-threaded multicast publisher producing limit orders whose prices
//! random-walk around a reference price. The configured rate is split across
//! worker threads, each pacing sends with per-thread spacing. An optional
//! warm-up window emits only BUY orders so the book accumulates depth before
//! two-sided flow begins.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::info;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use simex::config::AppConfig;
use simex::types::{OrderType, Price, Qty, Side};
use simex::util::ShutdownFlag;
use simex::wire::WireOrder;
use simex::{logging, net};

/// Price never walks further than this fraction away from the reference.
const MAX_DEVIATION: f64 = 0.05;
const MIN_QTY: Qty = 10;
const MAX_QTY: Qty = 200;
const METRICS_INTERVAL: Duration = Duration::from_secs(1);

struct Worker {
    rng: ChaCha8Rng,
    mid: Price,
    floor: Price,
    ceil: Price,
}

impl Worker {
    fn new(seed: u64, reference: Price) -> Self {
        let band = ((reference as f64) * MAX_DEVIATION) as Price;
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            mid: reference,
            floor: reference.saturating_sub(band).max(1),
            ceil: reference + band.max(1),
        }
    }

    fn next_order(&mut self, id: u64, instrument: u32, buy_only: bool) -> WireOrder {
        // Drift the mid occasionally, then place around it with noise.
        if self.rng.gen_ratio(1, 20) {
            let step = self.rng.gen_range(-3i64..=3);
            self.mid = (self.mid as i64 + step).clamp(self.floor as i64, self.ceil as i64) as Price;
        }
        let side = if buy_only || self.rng.gen_bool(0.5) {
            Side::Buy
        } else {
            Side::Sell
        };
        let spread = self.rng.gen_range(1..=4);
        let noise = self.rng.gen_range(-2i64..=2);
        let base = match side {
            Side::Buy => self.mid.saturating_sub(spread),
            Side::Sell => self.mid + spread,
        };
        let price = ((base as i64 + noise).max(1)) as Price;
        let qty = self.rng.gen_range(MIN_QTY..=MAX_QTY);

        WireOrder {
            order_id: id,
            instrument,
            side,
            price,
            qty,
            kind: OrderType::Limit,
            display: 0,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = AppConfig::from_file(&config_path)?;
    logging::init(&config.logging, &config.affinity);

    let shutdown = Arc::new(ShutdownFlag::default());
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || flag.raise()).context("install signal handler")?;
    }

    let generator = config.generator.clone();
    let worker_count = generator.threads;
    let per_thread_rate = if generator.orders_per_second > 0.0 {
        generator.orders_per_second / worker_count as f64
    } else {
        0.0
    };
    let spacing = if per_thread_rate > 0.0 {
        Some(Duration::from_secs_f64(1.0 / per_thread_rate))
    } else {
        None
    };

    let next_id = Arc::new(AtomicU64::new(1));
    let total_sent = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    let mut workers = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let socket = net::send_socket(config.network.mcast_iface).context("open send socket")?;
        let destination = (config.network.mcast_ip, config.network.mcast_port);
        let shutdown = shutdown.clone();
        let next_id = next_id.clone();
        let total_sent = total_sent.clone();
        let generator = generator.clone();

        let handle = thread::Builder::new()
            .name(format!("gen-{worker_id}"))
            .spawn(move || {
                let mut state = Worker::new(
                    0x5eed ^ ((worker_id as u64) << 32) ^ started.elapsed().as_nanos() as u64,
                    generator.reference_price,
                );
                let mut next_send = Instant::now();

                while !shutdown.is_raised() {
                    let buy_only = started.elapsed().as_secs() < generator.buy_only_seconds;
                    let id = next_id.fetch_add(1, Ordering::Relaxed);
                    let order = state.next_order(id, generator.instrument, buy_only);
                    let line = order.to_string();

                    if let Some(spacing) = spacing {
                        let now = Instant::now();
                        if now < next_send {
                            thread::sleep(next_send - now);
                        }
                        next_send = Instant::now() + spacing;
                    }

                    let _ = socket.send_to(line.as_bytes(), destination);
                    total_sent.fetch_add(1, Ordering::Relaxed);
                }
            })
            .context("spawn generator worker")?;
        workers.push(handle);
    }

    info!(
        "generator running for instrument {} | target {:.0} orders/s | {} threads | buy-only warm-up {}s",
        generator.instrument, generator.orders_per_second, worker_count, generator.buy_only_seconds
    );

    let metrics_shutdown = shutdown.clone();
    let metrics_total = total_sent.clone();
    let metrics = thread::Builder::new()
        .name("gen-metrics".into())
        .spawn(move || {
            let mut last = 0u64;
            while !metrics_shutdown.is_raised() {
                thread::sleep(METRICS_INTERVAL);
                let now = metrics_total.load(Ordering::Relaxed);
                info!("throughput: {} orders/s (total {})", now - last, now);
                last = now;
            }
        })
        .context("spawn metrics thread")?;

    for worker in workers {
        let _ = worker.join();
    }
    let _ = metrics.join();

    info!(
        "generator stopped after sending {} orders",
        total_sent.load(Ordering::Relaxed)
    );
    Ok(())
}
