// =============================================================================
// Central Application State
// =============================================================================
//
// Shared across the HTTP handlers and WebSocket connections via
// `Arc<AppState>`. The candle series and broadcast hub manage their own
// interior mutability; the scheduler holds its own `Arc` clones of both.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use crate::broadcast::BroadcastHub;
use crate::market_data::CandleSeries;
use crate::runtime_config::RuntimeConfig;

/// Liveness summary served by `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub candles: usize,
    pub max_candles: usize,
    pub listeners: usize,
    pub messages_published: u64,
    pub uptime_secs: u64,
    pub server_time: i64,
}

pub struct AppState {
    pub series: Arc<CandleSeries>,
    pub hub: Arc<BroadcastHub>,
    /// Bound on a single outbound WebSocket frame.
    pub send_timeout: Duration,
    pub start_time: Instant,
}

impl AppState {
    /// Build the shared state from the loaded configuration. The series is
    /// created empty; the caller seeds it before serving.
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            series: Arc::new(CandleSeries::new(config.max_candles)),
            hub: Arc::new(BroadcastHub::new(config.listener_queue_depth)),
            send_timeout: config.send_timeout(),
            start_time: Instant::now(),
        }
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: if self.series.is_empty() { "seeding" } else { "ok" },
            candles: self.series.len(),
            max_candles: self.series.capacity(),
            listeners: self.hub.listener_count(),
            messages_published: self.hub.messages_published(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            server_time: Utc::now().timestamp_millis(),
        }
    }
}
