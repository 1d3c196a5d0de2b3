//! Asynchronous logging backend for the `log` facade.
//!
//! Formatting and I/O run on dedicated worker threads fed through a bounded
//! channel, keeping the engine hot path free of syscalls. When the queue is
//! full the record is dropped and counted; matching never blocks on logging.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{LevelFilter, Log, Metadata, Record};

use crate::config::{AffinityCfg, LoggingCfg};
use crate::util::pin_to_core;

static DROPPED: AtomicU64 = AtomicU64::new(0);
static LOGGER: OnceLock<QueueLogger> = OnceLock::new();

struct QueueLogger {
    tx: Sender<String>,
    level: LevelFilter,
}

impl Log for QueueLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} {:<5} [{}] {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            record.level(),
            record.target(),
            record.args()
        );
        if let Err(TrySendError::Full(_)) = self.tx.try_send(line) {
            DROPPED.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush(&self) {}
}

fn level_from_str(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn run_worker(rx: Receiver<String>, core: Option<usize>) {
    pin_to_core(core);
    let stdout = std::io::stdout();
    for line in rx.iter() {
        let mut handle = stdout.lock();
        let _ = writeln!(handle, "{line}");
    }
}

/// Installs the global logger. Safe to call more than once; later calls are
/// no-ops (first configuration wins).
pub fn init(cfg: &LoggingCfg, affinity: &AffinityCfg) {
    let level = level_from_str(&cfg.level);
    let (tx, rx) = bounded::<String>(cfg.queue_size.max(1));

    let logger = LOGGER.get_or_init(|| QueueLogger { tx, level });
    if log::set_logger(logger).is_err() {
        return;
    }
    log::set_max_level(level);

    for worker in 0..cfg.worker_threads.max(1) {
        let rx = rx.clone();
        let core = affinity.logging_cores.get(worker).copied();
        let _ = thread::Builder::new()
            .name(format!("log-{worker}"))
            .spawn(move || run_worker(rx, core));
    }
}

/// Records dropped because the queue was full.
pub fn dropped_count() -> u64 {
    DROPPED.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing_defaults_to_info() {
        assert_eq!(level_from_str("warn"), LevelFilter::Warn);
        assert_eq!(level_from_str("DEBUG"), LevelFilter::Debug);
        assert_eq!(level_from_str("bogus"), LevelFilter::Info);
    }

    #[test]
    fn init_is_idempotent() {
        let cfg = LoggingCfg {
            queue_size: 16,
            worker_threads: 1,
            level: "info".into(),
        };
        let affinity = AffinityCfg::default();
        init(&cfg, &affinity);
        init(&cfg, &affinity);
        log::info!("logging smoke test");
    }
}
