use std::collections::VecDeque;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::SimError;
use crate::market_data::candle::Candle;
use crate::market_data::generator::DataGenerator;

/// Upper bound on the up-front ring allocation; larger caps grow on demand.
const MAX_PREALLOCATED: usize = 4096;

// ---------------------------------------------------------------------------
// CandleSeries -- bounded, time-ordered history
// ---------------------------------------------------------------------------

/// Thread-safe ring buffer holding the most recent `max_len` one-minute
/// candles, newest last.
///
/// The scheduler is the only writer. Readers always get owned copies, so a
/// reader can never see a candle half-way through `append`.
pub struct CandleSeries {
    candles: RwLock<VecDeque<Candle>>,
    max_len: usize,
}

impl CandleSeries {
    /// Create an empty series retaining at most `max_len` candles.
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            candles: RwLock::new(VecDeque::with_capacity(
                max_len.saturating_add(1).min(MAX_PREALLOCATED),
            )),
            max_len,
        }
    }

    /// Fill the empty series with `n` generated candles.
    ///
    /// Seeding twice is a programming error and is rejected. When `n` exceeds
    /// the retention cap only the newest `max_len` candles are kept.
    pub fn seed(&self, generator: &dyn DataGenerator, n: usize) -> Result<(), SimError> {
        if n == 0 {
            return Err(SimError::EmptySeed);
        }
        if !self.candles.read().is_empty() {
            return Err(SimError::AlreadySeeded);
        }

        // Anything beyond the cap would be evicted straight away.
        let history = generator.generate_seed_series(n.min(self.max_len))?;
        if history.is_empty() {
            return Err(SimError::Generator("seed series came back empty".into()));
        }
        if let Some(pair) = history.windows(2).find(|p| p[1].time != p[0].next_time()) {
            return Err(SimError::OutOfOrderCandle {
                expected: pair[0].next_time(),
                got: pair[1].time,
            });
        }

        let mut ring = self.candles.write();
        if !ring.is_empty() {
            return Err(SimError::AlreadySeeded);
        }
        ring.extend(history);
        while ring.len() > self.max_len {
            ring.pop_front();
        }

        info!(
            candles = ring.len(),
            max_len = self.max_len,
            "candle series seeded"
        );
        Ok(())
    }

    /// Append the next candle, evicting the oldest ones beyond the cap.
    ///
    /// `candle.time` must be exactly one minute after the current last candle;
    /// anything else is rejected and leaves the series untouched. Returns how
    /// many candles were evicted.
    pub fn append(&self, candle: Candle) -> Result<usize, SimError> {
        let mut ring = self.candles.write();
        let last = ring.back().ok_or(SimError::EmptySeries)?;

        let expected = last.next_time();
        if candle.time != expected {
            return Err(SimError::OutOfOrderCandle {
                expected,
                got: candle.time,
            });
        }

        ring.push_back(candle);
        let mut evicted = 0;
        while ring.len() > self.max_len {
            ring.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, len = ring.len(), "candle series trimmed");
        }
        Ok(evicted)
    }

    /// Owned copy of the whole history, oldest first.
    pub fn snapshot(&self) -> Vec<Candle> {
        self.candles.read().iter().cloned().collect()
    }

    /// The newest `k` candles (or all of them when fewer are held), oldest
    /// first.
    pub fn tail(&self, k: usize) -> Vec<Candle> {
        let ring = self.candles.read();
        let start = ring.len().saturating_sub(k);
        ring.range(start..).cloned().collect()
    }

    /// Most recent candle.
    pub fn last(&self) -> Result<Candle, SimError> {
        self.candles.read().back().cloned().ok_or(SimError::EmptySeries)
    }

    pub fn len(&self) -> usize {
        self.candles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.read().is_empty()
    }

    /// Retention cap.
    pub fn capacity(&self) -> usize {
        self.max_len
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
