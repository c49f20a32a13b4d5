// =============================================================================
// Kline Pulse: Main Entry Point
// =============================================================================
//
// Seeds an in-memory candle history, then runs two things side by side until
// Ctrl+C:
//   - the update scheduler, which appends a new candle every cycle and pushes
//     it (plus a simulated analysis) to every WebSocket listener;
//   - the HTTP server exposing `/api/history`, `/api/v1/health` and `/ws`.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod broadcast;
mod error;
mod market_data;
mod runtime_config;
mod scheduler;
mod signals;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::market_data::RandomWalkGenerator;
use crate::runtime_config::RuntimeConfig;
use crate::scheduler::UpdateScheduler;
use crate::signals::SimulatedAnalyst;

const CONFIG_PATH: &str = "kline_pulse.json";

/// How long to wait for in-flight HTTP requests once shutdown begins.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Kline Pulse starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env_overrides();
    config.validate()?;

    info!(
        seed_candles = config.seed_candles,
        max_candles = config.max_candles,
        interval_secs = config.broadcast_interval_secs,
        analysis_window = config.analysis_window,
        "Configuration resolved"
    );

    // ── 2. Shared state & seed history ───────────────────────────────────
    let state = Arc::new(AppState::new(&config));
    let generator = match config.rng_seed {
        Some(seed) => RandomWalkGenerator::with_seed(seed),
        None => RandomWalkGenerator::new(),
    };
    let generator = Arc::new(generator.starting_from(config.start_price));
    let analyst = match config.rng_seed {
        Some(seed) => SimulatedAnalyst::with_seed(seed.wrapping_add(1)),
        None => SimulatedAnalyst::new(),
    };
    if let Some(seed) = config.rng_seed {
        info!(seed, "Using fixed RNG seed");
    }

    state
        .series
        .seed(&*generator, config.seed_candles)
        .context("failed to seed candle history")?;

    // ── 3. Bind before spawning anything long-lived ──────────────────────
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── 4. Update scheduler ──────────────────────────────────────────────
    let scheduler = UpdateScheduler::new(
        state.series.clone(),
        state.hub.clone(),
        generator,
        Arc::new(analyst),
        config.broadcast_interval(),
        config.analysis_window,
    );
    let scheduler_task = tokio::spawn(scheduler.run(wait_for_shutdown(shutdown_rx.clone())));

    // ── 5. HTTP + WebSocket server ───────────────────────────────────────
    let app = api::rest::router(state.clone());
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
            .await
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            warn!("Shutdown signal received, stopping gracefully");
            None
        }
        finished = &mut server_task => Some(finished),
    };

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        error!(error = %e, "Update scheduler task failed");
    }

    let server_result = match server_result {
        Some(finished) => finished,
        None => match tokio::time::timeout(SHUTDOWN_GRACE, server_task).await {
            Ok(finished) => finished,
            Err(_) => {
                warn!("API server did not stop within the grace period");
                Ok(Ok(()))
            }
        },
    };
    server_result
        .context("API server task panicked")?
        .context("API server failed")?;

    info!(
        listeners = state.hub.listener_count(),
        "Kline Pulse shut down complete."
    );
    Ok(())
}

/// Resolves once the shutdown flag flips to `true` (or the sender is gone).
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
