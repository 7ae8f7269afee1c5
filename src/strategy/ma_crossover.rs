use super::{SignalEvaluator, SignalInput};
use crate::indicators::calculate_sma;
use crate::models::Signal;

/// Moving average crossover
///
/// Buy when the short SMA crosses above the long SMA between the previous
/// and the current sample, sell when it crosses below. Anything else,
/// including too little history, is a hold.
#[derive(Debug, Clone)]
pub struct MovingAverageCrossover {
    short_period: usize,
    long_period: usize,
}

impl MovingAverageCrossover {
    pub fn new(short_period: usize, long_period: usize) -> Self {
        Self {
            short_period,
            long_period,
        }
    }
}

impl Default for MovingAverageCrossover {
    fn default() -> Self {
        Self::new(5, 20)
    }
}

impl SignalEvaluator for MovingAverageCrossover {
    fn evaluate(&self, input: &SignalInput<'_>) -> Signal {
        let history = input.history;
        if history.len() < self.min_samples_required() {
            return Signal::Hold;
        }

        let previous = &history[..history.len() - 1];
        let averages = (
            calculate_sma(previous, self.short_period),
            calculate_sma(previous, self.long_period),
            calculate_sma(history, self.short_period),
            calculate_sma(history, self.long_period),
        );

        let (Some(prev_short), Some(prev_long), Some(short), Some(long)) = averages else {
            return Signal::Hold;
        };

        tracing::debug!(
            short = %short,
            long = %long,
            "Moving averages"
        );

        if prev_short <= prev_long && short > long {
            Signal::Buy
        } else if prev_short >= prev_long && short < long {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    fn name(&self) -> &str {
        "MovingAverageCrossover"
    }

    fn min_samples_required(&self) -> usize {
        // One extra sample to compare against the previous window
        self.long_period + 1
    }
}
