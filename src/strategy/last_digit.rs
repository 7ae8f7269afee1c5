use super::{SignalEvaluator, SignalInput};
use crate::models::Signal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Signals on the last digit of the price rounded to a whole number
///
/// With the defaults a price ending in 1 (e.g. 2001.3) is a buy and one
/// ending in 8 is a sell. Buy digits win if a digit is in both sets.
#[derive(Debug, Clone)]
pub struct LastDigitStrategy {
    buy_digits: Vec<u8>,
    sell_digits: Vec<u8>,
}

impl LastDigitStrategy {
    pub fn new(buy_digits: Vec<u8>, sell_digits: Vec<u8>) -> Self {
        Self {
            buy_digits,
            sell_digits,
        }
    }

    /// Last digit of `price` rounded half away from zero
    pub fn last_digit(price: Decimal) -> u8 {
        let whole = price
            .abs()
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        (whole % Decimal::TEN).to_u8().unwrap_or(0)
    }
}

impl Default for LastDigitStrategy {
    fn default() -> Self {
        Self::new(vec![1], vec![8])
    }
}

impl SignalEvaluator for LastDigitStrategy {
    fn evaluate(&self, input: &SignalInput<'_>) -> Signal {
        let digit = Self::last_digit(input.current_price);

        if self.buy_digits.contains(&digit) {
            Signal::Buy
        } else if self.sell_digits.contains(&digit) {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    fn name(&self) -> &str {
        "LastDigit"
    }

    fn min_samples_required(&self) -> usize {
        1
    }
}
