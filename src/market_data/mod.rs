pub mod candle;
pub mod candle_series;
pub mod generator;

// Re-export the core types for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle::Candle;
pub use candle_series::CandleSeries;
pub use generator::{DataGenerator, RandomWalkGenerator};
