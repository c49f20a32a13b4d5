// =============================================================================
// Update Scheduler: periodic generate → append → broadcast → analyse loop
// =============================================================================
//
// One instance is spawned at startup:
//
//   tokio::spawn(scheduler.run(shutdown));
//
// Every tick:
//   1. read the newest candle,
//   2. synthesise the next one,
//   3. append it (eviction happens here),
//   4. publish it as a `kline` message,
//   5. analyse the newest `window` candles,
//   6. publish the result as an `llm_analysis` message.
//
// A failing step is logged and ends that cycle (or, for the analysis, skips
// only the analysis publish). A panicking cycle is caught and skipped too.
// The loop itself only stops on shutdown.
// =============================================================================

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::broadcast::BroadcastHub;
use crate::error::SimError;
use crate::market_data::{CandleSeries, DataGenerator};
use crate::signals::AnalysisEngine;
use crate::types::StreamMessage;

/// What one cycle managed to do.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    /// Both messages went out.
    Published {
        kline_receivers: usize,
        analysis_receivers: usize,
    },
    /// The candle went out but the analysis failed.
    AnalysisSkipped { kline_receivers: usize, error: SimError },
    /// Nothing was published this cycle.
    CandleSkipped { error: SimError },
}

pub struct UpdateScheduler {
    series: Arc<CandleSeries>,
    hub: Arc<BroadcastHub>,
    generator: Arc<dyn DataGenerator>,
    analyst: Arc<dyn AnalysisEngine>,
    period: Duration,
    window: usize,
}

impl UpdateScheduler {
    pub fn new(
        series: Arc<CandleSeries>,
        hub: Arc<BroadcastHub>,
        generator: Arc<dyn DataGenerator>,
        analyst: Arc<dyn AnalysisEngine>,
        period: Duration,
        window: usize,
    ) -> Self {
        Self {
            series,
            hub,
            generator,
            analyst,
            period,
            window: window.max(1),
        }
    }

    /// Execute a single cycle.
    pub fn run_cycle(&self) -> CycleReport {
        let candle = match self
            .series
            .last()
            .and_then(|last| self.generator.generate_next(&last))
        {
            Ok(candle) if candle.is_well_formed() => candle,
            Ok(candle) => {
                let e = SimError::Generator(format!("malformed candle at {}", candle.time));
                warn!(error = %e, "candle generation failed, skipping cycle");
                return CycleReport::CandleSkipped { error: e };
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(error = %e, "candle generation failed, skipping cycle");
                } else {
                    error!(error = %e, "cannot advance candle series, skipping cycle");
                }
                return CycleReport::CandleSkipped { error: e };
            }
        };

        if let Err(e) = self.series.append(candle.clone()) {
            error!(error = %e, "generated candle rejected by series, skipping cycle");
            return CycleReport::CandleSkipped { error: e };
        }

        let close = candle.close;
        let kline_receivers = self.hub.publish(&StreamMessage::Kline(candle));

        let window = self.series.tail(self.window);
        match self.analyst.analyze(&window) {
            Ok(result) => {
                let signal = result.signal;
                let analysis_receivers = self.hub.publish(&StreamMessage::LlmAnalysis(result));
                debug!(close, %signal, "cycle published");
                CycleReport::Published {
                    kline_receivers,
                    analysis_receivers,
                }
            }
            Err(e) => {
                warn!(error = %e, "analysis failed, skipping analysis publish");
                CycleReport::AnalysisSkipped {
                    kline_receivers,
                    error: e,
                }
            }
        }
    }

    /// Run cycles every `period` until `shutdown` resolves.
    ///
    /// The first cycle fires one full period after start.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            period_secs = self.period.as_secs_f64(),
            window = self.window,
            "update scheduler started"
        );

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycles: u64 = 0;
        let mut skipped: u64 = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    cycles += 1;
                    let report = match panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle())) {
                        Ok(report) => report,
                        Err(payload) => {
                            skipped += 1;
                            error!(cycle = cycles, panic = panic_message(&*payload), "cycle panicked, skipping");
                            continue;
                        }
                    };
                    match report {
                        CycleReport::Published { kline_receivers, analysis_receivers } => {
                            debug!(cycle = cycles, kline_receivers, analysis_receivers, "cycle complete");
                        }
                        CycleReport::AnalysisSkipped { kline_receivers, error } => {
                            debug!(cycle = cycles, kline_receivers, %error, "cycle complete without analysis");
                        }
                        CycleReport::CandleSkipped { error } => {
                            skipped += 1;
                            debug!(cycle = cycles, %error, "cycle skipped");
                        }
                    }
                }
            }
        }

        info!(cycles, skipped, "update scheduler stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

// =============================================================================
// Tests
// =============================================================================
