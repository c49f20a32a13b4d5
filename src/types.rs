// =============================================================================
// Shared types pushed to clients
// =============================================================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::market_data::candle::candle_time;
use crate::market_data::Candle;

/// Directional call produced by the analyst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Bullish, Signal::Bearish, Signal::Neutral];
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// One analysis pass over the recent window. Rebuilt every cycle and only
/// ever lives inside the outgoing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub signal: Signal,
    pub target_price: f64,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub message: String,
    /// Time of the newest candle the analysis looked at.
    #[serde(with = "candle_time")]
    pub timestamp: NaiveDateTime,
}

/// Envelope for everything the stream endpoint pushes.
///
/// ```json
/// {"type":"kline","data":{...}}
/// {"type":"llm_analysis","data":{...}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage {
    Kline(Candle),
    LlmAnalysis(AnalysisResult),
}

impl StreamMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Kline(_) => "kline",
            Self::LlmAnalysis(_) => "llm_analysis",
        }
    }
}
