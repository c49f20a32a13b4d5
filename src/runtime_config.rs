// =============================================================================
// Runtime Configuration: JSON file + environment overrides
// =============================================================================
//
// Every field carries `#[serde(default = "...")]` so a partial (or empty) JSON
// file still loads. Environment variables win over the file; values that do
// not parse are logged and ignored.
//
//   KLINE_BIND_ADDR         bind address for HTTP + WebSocket
//   KLINE_SEED_CANDLES      candles generated at startup
//   KLINE_MAX_CANDLES       retention cap of the in-memory series
//   KLINE_INTERVAL_SECS     broadcast cycle period
//   KLINE_ANALYSIS_WINDOW   candles handed to the analyst each cycle
//   KLINE_QUEUE_DEPTH       per-listener outbound queue depth
//   KLINE_SEND_TIMEOUT_MS   per-frame socket send timeout
//   KLINE_START_PRICE       price the seed history starts from
//   KLINE_RNG_SEED          fixed seed for reproducible synthesis
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SimError;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_seed_candles() -> usize {
    400
}

fn default_max_candles() -> usize {
    500
}

fn default_broadcast_interval_secs() -> u64 {
    5
}

fn default_analysis_window() -> usize {
    20
}

fn default_listener_queue_depth() -> usize {
    64
}

fn default_send_timeout_ms() -> u64 {
    2_000
}

fn default_start_price() -> f64 {
    100.0
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Address the HTTP + WebSocket server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Number of candles generated once at startup.
    #[serde(default = "default_seed_candles")]
    pub seed_candles: usize,

    /// Maximum number of candles kept in memory; oldest are evicted first.
    #[serde(default = "default_max_candles")]
    pub max_candles: usize,

    /// Period of the generate-and-broadcast cycle.
    #[serde(default = "default_broadcast_interval_secs")]
    pub broadcast_interval_secs: u64,

    /// Number of most recent candles passed to the analyst.
    #[serde(default = "default_analysis_window")]
    pub analysis_window: usize,

    /// Messages a listener may have in flight before it is considered too slow
    /// and dropped.
    #[serde(default = "default_listener_queue_depth")]
    pub listener_queue_depth: usize,

    /// Upper bound on a single WebSocket frame send.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Price the seed history starts from.
    #[serde(default = "default_start_price")]
    pub start_price: f64,

    /// Fixed RNG seed. `None` draws fresh entropy on every start.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            seed_candles: default_seed_candles(),
            max_candles: default_max_candles(),
            broadcast_interval_secs: default_broadcast_interval_secs(),
            analysis_window: default_analysis_window(),
            listener_queue_depth: default_listener_queue_depth(),
            send_timeout_ms: default_send_timeout_ms(),
            start_price: default_start_price(),
            rng_seed: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(path = %path.display(), "runtime config loaded");
        Ok(config)
    }

    /// Apply `KLINE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("KLINE_BIND_ADDR")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            self.bind_addr = addr;
        }
        if let Some(v) = parse_override(&lookup, "KLINE_SEED_CANDLES") {
            self.seed_candles = v;
        }
        if let Some(v) = parse_override(&lookup, "KLINE_MAX_CANDLES") {
            self.max_candles = v;
        }
        if let Some(v) = parse_override(&lookup, "KLINE_INTERVAL_SECS") {
            self.broadcast_interval_secs = v;
        }
        if let Some(v) = parse_override(&lookup, "KLINE_ANALYSIS_WINDOW") {
            self.analysis_window = v;
        }
        if let Some(v) = parse_override(&lookup, "KLINE_QUEUE_DEPTH") {
            self.listener_queue_depth = v;
        }
        if let Some(v) = parse_override(&lookup, "KLINE_SEND_TIMEOUT_MS") {
            self.send_timeout_ms = v;
        }
        if let Some(v) = parse_override(&lookup, "KLINE_START_PRICE") {
            self.start_price = v;
        }
        if let Some(v) = parse_override(&lookup, "KLINE_RNG_SEED") {
            self.rng_seed = Some(v);
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), SimError> {
        let zero = [
            ("seed_candles", self.seed_candles == 0),
            ("max_candles", self.max_candles == 0),
            ("broadcast_interval_secs", self.broadcast_interval_secs == 0),
            ("analysis_window", self.analysis_window == 0),
            ("listener_queue_depth", self.listener_queue_depth == 0),
            ("send_timeout_ms", self.send_timeout_ms == 0),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(SimError::InvalidConfig(format!("{name} must be greater than zero")));
        }
        if !self.start_price.is_finite() || self.start_price <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "start_price must be a positive number, got {}",
                self.start_price
            )));
        }
        if self.bind_addr.trim().is_empty() {
            return Err(SimError::InvalidConfig("bind_addr must not be empty".into()));
        }
        Ok(())
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

fn parse_override<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparseable config override");
            None
        }
    }
}
