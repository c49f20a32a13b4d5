// =============================================================================
// Simulated Analyst: stands in for an LLM market commentary call
// =============================================================================
//
// Picks a direction at random, projects a target 1–3 % away from the last
// close in that direction (or the close itself when neutral), and attaches a
// confidence between 0.60 and 0.95. The result is stamped with the time of
// the newest candle it was given.
// =============================================================================

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::SimError;
use crate::market_data::candle::round2;
use crate::market_data::Candle;
use crate::types::{AnalysisResult, Signal};

const MIN_CONFIDENCE: f64 = 0.60;
const MAX_CONFIDENCE: f64 = 0.95;
const MIN_TARGET_MOVE: f64 = 0.01;
const MAX_TARGET_MOVE: f64 = 0.03;
/// Distance from the last close quoted in the breakout/breakdown message.
const MESSAGE_LEVEL_OFFSET: f64 = 5.0;

/// Turns a window of recent candles into a directional call.
pub trait AnalysisEngine: Send + Sync {
    /// `window` is ordered oldest-first. A single candle is enough; an empty
    /// window is an error since there is nothing to stamp the result with.
    fn analyze(&self, window: &[Candle]) -> Result<AnalysisResult, SimError>;
}

pub struct SimulatedAnalyst {
    rng: Mutex<StdRng>,
}

impl SimulatedAnalyst {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SimulatedAnalyst {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisEngine for SimulatedAnalyst {
    fn analyze(&self, window: &[Candle]) -> Result<AnalysisResult, SimError> {
        let last = window
            .last()
            .ok_or_else(|| SimError::Analysis("no candles to analyse".into()))?;
        let last_close = last.close;

        let mut rng = self.rng.lock();
        let signal = *Signal::ALL
            .choose(&mut *rng)
            .unwrap_or(&Signal::Neutral);
        let confidence = round2(rng.gen_range(MIN_CONFIDENCE..MAX_CONFIDENCE));

        let (target_price, message) = match signal {
            Signal::Bullish => (
                last_close * (1.0 + rng.gen_range(MIN_TARGET_MOVE..MAX_TARGET_MOVE)),
                format!(
                    "Price shows bullish momentum. Potential breakout above {:.2}.",
                    last_close + MESSAGE_LEVEL_OFFSET
                ),
            ),
            Signal::Bearish => (
                last_close * (1.0 - rng.gen_range(MIN_TARGET_MOVE..MAX_TARGET_MOVE)),
                format!(
                    "Price shows bearish signs. Potential drop below {:.2}.",
                    last_close - MESSAGE_LEVEL_OFFSET
                ),
            ),
            Signal::Neutral => (
                last_close,
                "Market seems to be consolidating. No clear signal.".to_string(),
            ),
        };

        Ok(AnalysisResult {
            signal,
            target_price: round2(target_price),
            confidence,
            message,
            timestamp: last.time,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
