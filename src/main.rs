//! Engine daemon: multicast ingest, per-instrument matching, shared-memory
//! depth publication.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use log::{error, info};
use rustc_hash::FxHashMap;

use simex::config::AppConfig;
use simex::dispatcher::{Dispatcher, QUEUE_CAPACITY};
use simex::engine::Engine;
use simex::order_book::OrderBook;
use simex::snapshot::SnapshotWriter;
use simex::util::ShutdownFlag;
use simex::wire::WireOrder;
use simex::{logging, net};

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

    let backend = config.orderbook.backend();
    let interval = Duration::from_millis(config.snapshot.interval_ms);
    let engine_cores = &config.affinity.engine_cores;

    let mut queues: FxHashMap<_, rtrb::Producer<WireOrder>> = FxHashMap::default();
    let mut workers = Vec::with_capacity(config.orderbook.instruments.len());

    for (idx, &token) in config.orderbook.instruments.iter().enumerate() {
        let (producer, consumer) = rtrb::RingBuffer::new(QUEUE_CAPACITY);
        queues.insert(token, producer);

        let writer = SnapshotWriter::create(&config.snapshot.prefix, token, config.snapshot.levels, interval)
            .with_context(|| format!("create snapshot region for instrument {token}"))?;

        let core = engine_cores.get(idx % engine_cores.len().max(1)).copied();
        let engine_shutdown = shutdown.clone();
        let handle = thread::Builder::new()
            .name(format!("engine-{token}"))
            .spawn(move || {
                let mut engine = Engine::new(OrderBook::new(backend), token, Some(writer));
                engine.run(consumer, &engine_shutdown, core);
            })
            .context("spawn engine thread")?;
        workers.push(handle);
    }

    let socket = net::recv_socket(
        config.network.mcast_ip,
        config.network.mcast_iface,
        config.network.mcast_port,
    )
    .context("open ingest socket")?;

    info!(
        "engine ready on {}:{} via iface {} ({} instruments, backend: {:?})",
        config.network.mcast_ip,
        config.network.mcast_port,
        config.network.mcast_iface,
        config.orderbook.instruments.len(),
        config.orderbook.backend,
    );

    let mut dispatcher = Dispatcher::new(socket, queues);
    dispatcher.run(&shutdown);

    for worker in workers {
        if worker.join().is_err() {
            error!("engine thread panicked; its instrument stopped accepting orders");
        }
    }
    let dropped_logs = logging::dropped_count();
    if dropped_logs > 0 {
        info!("{dropped_logs} log records dropped under pressure");
    }
    info!("clean shutdown");
    Ok(())
}
