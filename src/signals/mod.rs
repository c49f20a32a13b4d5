// =============================================================================
// Signals Module
// =============================================================================
//
// Analysis collaborators that turn the recent candle window into a directional
// call pushed alongside every new candle.

pub mod analyst;

pub use analyst::{AnalysisEngine, SimulatedAnalyst};
