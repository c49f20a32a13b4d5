// =============================================================================
// Candle Synthesis: random-walk OHLCV generator
// =============================================================================
//
// Each candle opens within ±1.0 of the previous close, stretches its wick up
// to 2.0 above and below its body, closes somewhere inside the wick, and
// trades between 1 000 and 5 000 units. Prices are floored at MIN_PRICE so a
// long walk can never cross zero.
// =============================================================================

use chrono::{DurationRound, Local, NaiveDateTime, TimeDelta};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SimError;
use crate::market_data::candle::{candle_interval, Candle, CANDLE_INTERVAL_SECS};

/// Price every fresh seed series starts from.
pub const DEFAULT_START_PRICE: f64 = 100.0;

/// Lowest price the walk may reach.
const MIN_PRICE: f64 = 0.01;

const OPEN_JITTER: f64 = 1.0;
const MAX_WICK: f64 = 2.0;
const MIN_VOLUME: f64 = 1_000.0;
const MAX_VOLUME: f64 = 5_000.0;

/// Produces the initial history and every subsequent candle.
///
/// Implementations must keep each candle well-formed and advance time by
/// exactly one minute per step.
pub trait DataGenerator: Send + Sync {
    /// `n` consecutive candles ordered oldest-first.
    fn generate_seed_series(&self, n: usize) -> Result<Vec<Candle>, SimError>;

    /// The candle that follows `previous`.
    fn generate_next(&self, previous: &Candle) -> Result<Candle, SimError>;
}

// ---------------------------------------------------------------------------
// RandomWalkGenerator
// ---------------------------------------------------------------------------

pub struct RandomWalkGenerator {
    rng: Mutex<StdRng>,
    start_price: f64,
    /// Time of the newest seed candle. `None` means "one minute before now".
    anchor: Option<NaiveDateTime>,
}

impl RandomWalkGenerator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            start_price: DEFAULT_START_PRICE,
            anchor: None,
        }
    }

    /// Deterministic generator for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..Self::new()
        }
    }

    /// Pin the time of the newest seed candle instead of deriving it from the
    /// wall clock.
    #[cfg(test)]
    pub fn anchored_at(mut self, last_time: NaiveDateTime) -> Self {
        self.anchor = Some(last_time);
        self
    }

    pub fn starting_from(mut self, price: f64) -> Self {
        self.start_price = price;
        self
    }

    fn seed_anchor(&self) -> Result<NaiveDateTime, SimError> {
        if let Some(anchor) = self.anchor {
            return Ok(anchor);
        }
        let now = Local::now().naive_local();
        let minute = now
            .duration_trunc(candle_interval())
            .map_err(|e| SimError::Generator(format!("cannot truncate clock to minute: {e}")))?;
        Ok(minute - candle_interval())
    }

    /// One step of the walk. `reference` is the price the new candle is drawn
    /// around; the body is widened to include it when `include_reference`.
    fn step(
        rng: &mut StdRng,
        time: NaiveDateTime,
        reference: f64,
        include_reference: bool,
    ) -> Candle {
        let open = (reference + rng.gen_range(-OPEN_JITTER..OPEN_JITTER)).max(MIN_PRICE);
        let (body_low, body_high) = if include_reference {
            (open.min(reference), open.max(reference))
        } else {
            (open, open)
        };
        let high = body_high + rng.gen_range(0.0..MAX_WICK);
        let low = (body_low - rng.gen_range(0.0..MAX_WICK)).max(MIN_PRICE);
        let close = rng.gen_range(low..=high);
        let volume = rng.gen_range(MIN_VOLUME..MAX_VOLUME);

        Candle::new(time, open, high, low, close, volume)
    }
}

impl Default for RandomWalkGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataGenerator for RandomWalkGenerator {
    fn generate_seed_series(&self, n: usize) -> Result<Vec<Candle>, SimError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let last_time = self.seed_anchor()?;
        let mut time = i64::try_from(n - 1)
            .ok()
            .and_then(|steps| steps.checked_mul(CANDLE_INTERVAL_SECS))
            .and_then(TimeDelta::try_seconds)
            .and_then(|span| last_time.checked_sub_signed(span))
            .ok_or_else(|| {
                SimError::Generator(format!("cannot place {n} candles before {last_time}"))
            })?;

        let mut rng = self.rng.lock();
        let mut price = self.start_price;
        let mut series = Vec::with_capacity(n);
        for _ in 0..n {
            let candle = Self::step(&mut rng, time, price, false);
            price = candle.close;
            time = candle.next_time();
            series.push(candle);
        }
        Ok(series)
    }

    fn generate_next(&self, previous: &Candle) -> Result<Candle, SimError> {
        if !previous.close.is_finite() || previous.close <= 0.0 {
            return Err(SimError::Generator(format!(
                "previous close {} is not a usable price",
                previous.close
            )));
        }
        let mut rng = self.rng.lock();
        Ok(Self::step(&mut rng, previous.next_time(), previous.close, true))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 30)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn seed_series_ends_at_anchor_and_steps_by_minute() {
        let generator = RandomWalkGenerator::with_seed(7).anchored_at(at(10, 2));
        let series = generator.generate_seed_series(3).unwrap();
        let times: Vec<_> = series.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![at(10, 0), at(10, 1), at(10, 2)]);
    }

    #[test]
    fn next_after_seed_is_one_minute_later_and_well_formed() {
        let generator = RandomWalkGenerator::with_seed(11).anchored_at(at(10, 2));
        let series = generator.generate_seed_series(3).unwrap();
        let next = generator.generate_next(series.last().unwrap()).unwrap();

        assert_eq!(next.time, at(10, 3));
        assert!(next.low <= next.close && next.close <= next.high);
        assert!(next.low <= next.open && next.open <= next.high);
    }

    #[test]
    fn long_walk_keeps_invariants() {
        let generator = RandomWalkGenerator::with_seed(42).anchored_at(at(0, 0));
        let mut series = generator.generate_seed_series(200).unwrap();
        for _ in 0..2_000 {
            let next = generator.generate_next(series.last().unwrap()).unwrap();
            series.push(next);
        }

        for candle in &series {
            assert!(candle.is_well_formed(), "malformed candle: {candle:?}");
        }
        for pair in series.windows(2) {
            assert_eq!(pair[1].time - pair[0].time, candle_interval());
        }
    }

    #[test]
    fn walk_near_zero_stays_positive() {
        let generator = RandomWalkGenerator::with_seed(3)
            .anchored_at(at(0, 0))
            .starting_from(0.5);
        let mut last = generator.generate_seed_series(1).unwrap().remove(0);
        for _ in 0..500 {
            last = generator.generate_next(&last).unwrap();
            assert!(last.is_well_formed(), "malformed candle: {last:?}");
        }
    }

    #[test]
    fn same_seed_same_series() {
        let a = RandomWalkGenerator::with_seed(5).anchored_at(at(9, 0));
        let b = RandomWalkGenerator::with_seed(5).anchored_at(at(9, 0));
        assert_eq!(
            a.generate_seed_series(20).unwrap(),
            b.generate_seed_series(20).unwrap()
        );
    }

    #[test]
    fn unanchored_seed_is_minute_aligned() {
        let series = RandomWalkGenerator::with_seed(1).generate_seed_series(2).unwrap();
        assert_eq!(series[1].time.and_utc().timestamp() % 60, 0);
        assert_eq!(series[1].time - series[0].time, candle_interval());
    }

    #[test]
    fn rejects_unusable_previous_close() {
        let generator = RandomWalkGenerator::with_seed(1);
        let bad = Candle {
            time: at(10, 0),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: f64::NAN,
            volume: 1.0,
        };
        assert!(matches!(
            generator.generate_next(&bad),
            Err(SimError::Generator(_))
        ));
    }

    #[test]
    fn oversized_seed_request_is_an_error() {
        let generator = RandomWalkGenerator::with_seed(1).anchored_at(at(10, 0));
        for n in [10_000_000_000_000usize, usize::MAX] {
            assert!(matches!(
                generator.generate_seed_series(n),
                Err(SimError::Generator(_))
            ));
        }
    }

    #[test]
    fn empty_seed_request_yields_nothing() {
        let generator = RandomWalkGenerator::with_seed(1);
        assert!(generator.generate_seed_series(0).unwrap().is_empty());
    }
}
