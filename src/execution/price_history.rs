use rust_decimal::Decimal;
use std::collections::VecDeque;

use crate::models::PriceSample;

/// Rolling window of recent samples, oldest first
///
/// A sample for a minute that is already the newest entry replaces it
/// instead of being appended, so overlapping candle fetches never
/// double-count a candle.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    samples: VecDeque<PriceSample>,
    max_samples: usize,
}

impl PriceHistory {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn push(&mut self, sample: PriceSample) {
        match self.samples.back_mut() {
            Some(last) if last.timestamp_minute == sample.timestamp_minute => *last = sample,
            Some(last) if last.timestamp_minute > sample.timestamp_minute => {
                tracing::debug!(
                    newest = last.timestamp_minute,
                    got = sample.timestamp_minute,
                    "Ignoring out-of-order sample"
                );
            }
            _ => {
                self.samples.push_back(sample);
                while self.samples.len() > self.max_samples {
                    self.samples.pop_front();
                }
            }
        }
    }

    /// Prices, oldest first
    pub fn prices(&self) -> Vec<Decimal> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
