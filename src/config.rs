//! Application configuration.
//!
//! Loaded from a TOML file whose sections mirror the classic INI layout:
//! `[network]`, `[snapshot]`, `[orderbook]`, `[logging]`, `[affinity]`,
//! `[generator]`. Every key has a default so a partial file works.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::Deserialize;

use crate::price_index::Backend;
use crate::types::InstrumentToken;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkCfg,
    #[serde(default)]
    pub snapshot: SnapshotCfg,
    #[serde(default)]
    pub orderbook: OrderBookCfg,
    #[serde(default)]
    pub logging: LoggingCfg,
    #[serde(default)]
    pub affinity: AffinityCfg,
    #[serde(default)]
    pub generator: GeneratorCfg,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkCfg {
    #[serde(default = "default_mcast_ip")]
    pub mcast_ip: Ipv4Addr,
    /// IPv4 address of the interface to join/send on.
    #[serde(default = "default_mcast_iface")]
    pub mcast_iface: Ipv4Addr,
    #[serde(default = "default_mcast_port")]
    pub mcast_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotCfg {
    #[serde(default = "default_shm_prefix")]
    pub prefix: String,
    #[serde(default = "default_snapshot_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_snapshot_levels")]
    pub levels: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    RingWindow,
    OrderedMap,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderBookCfg {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Ring-window only: recentre the window on out-of-range prices instead
    /// of rejecting them.
    #[serde(default = "default_true")]
    pub ring_rebalance: bool,
    #[serde(default = "default_instruments")]
    pub instruments: Vec<InstrumentToken>,
}

impl OrderBookCfg {
    pub fn backend(&self) -> Backend {
        match self.backend {
            BackendKind::RingWindow => Backend::RingWindow {
                rebalance: self.ring_rebalance,
            },
            BackendKind::OrderedMap => Backend::OrderedMap,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingCfg {
    #[serde(default = "default_log_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_log_workers")]
    pub worker_threads: usize,
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AffinityCfg {
    #[serde(default)]
    pub engine_cores: Vec<usize>,
    #[serde(default)]
    pub logging_cores: Vec<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorCfg {
    #[serde(default = "default_orders_per_second")]
    pub orders_per_second: f64,
    #[serde(default = "default_generator_threads")]
    pub threads: usize,
    /// Warm-up window in which only BUY orders are emitted, to seed depth.
    #[serde(default)]
    pub buy_only_seconds: u64,
    #[serde(default = "default_generator_instrument")]
    pub instrument: InstrumentToken,
    /// Reference price the random walk hovers around, in ticks.
    #[serde(default = "default_reference_price")]
    pub reference_price: u64,
}

fn default_mcast_ip() -> Ipv4Addr {
    Ipv4Addr::new(239, 192, 1, 1)
}

fn default_mcast_iface() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_mcast_port() -> u16 {
    5001
}

fn default_shm_prefix() -> String {
    "/simex_book".to_string()
}

fn default_snapshot_interval_ms() -> u64 {
    50
}

fn default_snapshot_levels() -> u32 {
    32
}

fn default_backend() -> BackendKind {
    BackendKind::RingWindow
}

fn default_true() -> bool {
    true
}

fn default_instruments() -> Vec<InstrumentToken> {
    vec![26000, 35000]
}

fn default_log_queue_size() -> usize {
    8192
}

fn default_log_workers() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_orders_per_second() -> f64 {
    200.0
}

fn default_generator_threads() -> usize {
    2
}

fn default_generator_instrument() -> InstrumentToken {
    26000
}

fn default_reference_price() -> u64 {
    1518
}

impl Default for NetworkCfg {
    fn default() -> Self {
        Self {
            mcast_ip: default_mcast_ip(),
            mcast_iface: default_mcast_iface(),
            mcast_port: default_mcast_port(),
        }
    }
}

impl Default for SnapshotCfg {
    fn default() -> Self {
        Self {
            prefix: default_shm_prefix(),
            interval_ms: default_snapshot_interval_ms(),
            levels: default_snapshot_levels(),
        }
    }
}

impl Default for OrderBookCfg {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            ring_rebalance: true,
            instruments: default_instruments(),
        }
    }
}

impl Default for LoggingCfg {
    fn default() -> Self {
        Self {
            queue_size: default_log_queue_size(),
            worker_threads: default_log_workers(),
            level: default_log_level(),
        }
    }
}

impl Default for GeneratorCfg {
    fn default() -> Self {
        Self {
            orders_per_second: default_orders_per_second(),
            threads: default_generator_threads(),
            buy_only_seconds: 0,
            instrument: default_generator_instrument(),
            reference_price: default_reference_price(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to open config file {}: {e}", path.display()))?;
        let config: AppConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.network.mcast_ip.is_multicast() {
            anyhow::bail!("network.mcast_ip must be a multicast IPv4 address");
        }
        if self.snapshot.levels == 0 {
            anyhow::bail!("snapshot.levels must be > 0");
        }
        if self.snapshot.interval_ms == 0 {
            anyhow::bail!("snapshot.interval_ms must be > 0");
        }
        if self.orderbook.instruments.is_empty() {
            anyhow::bail!("orderbook.instruments must name at least one instrument");
        }
        if self.logging.worker_threads == 0 {
            anyhow::bail!("logging.worker_threads must be > 0");
        }
        if self.generator.threads == 0 {
            anyhow::bail!("generator.threads must be > 0");
        }
        Ok(())
    }
}
