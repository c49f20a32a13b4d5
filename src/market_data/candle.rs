use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Wire format for candle and analysis timestamps.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Spacing between consecutive candles, in seconds.
pub const CANDLE_INTERVAL_SECS: i64 = 60;

/// Spacing between consecutive candles.
pub fn candle_interval() -> TimeDelta {
    TimeDelta::seconds(CANDLE_INTERVAL_SECS)
}

// ---------------------------------------------------------------------------
// Candle
// ---------------------------------------------------------------------------

/// One simulated one-minute OHLCV candle.
///
/// Values are rounded to two decimals when the candle is built and never
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(with = "candle_time")]
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Build a candle, rounding every value to two decimals.
    pub fn new(time: NaiveDateTime, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            time,
            open: round2(open),
            high: round2(high),
            low: round2(low),
            close: round2(close),
            volume: round2(volume),
        }
    }

    /// `low <= min(open, close) <= max(open, close) <= high`, everything
    /// strictly positive.
    pub fn is_well_formed(&self) -> bool {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        self.low > 0.0
            && self.volume > 0.0
            && self.low <= body_low
            && body_high <= self.high
    }

    /// Time the candle after this one must carry.
    pub fn next_time(&self) -> NaiveDateTime {
        self.time + candle_interval()
    }
}

/// Round to two decimal places (half away from zero).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Serde adapter for `"YYYY-MM-DD HH:MM:SS"` timestamps.
pub mod candle_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIME_FORMAT;

    pub fn serialize<S>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
