// Signal evaluators
pub mod last_digit;
pub mod ma_crossover;

pub use last_digit::LastDigitStrategy;
pub use ma_crossover::MovingAverageCrossover;

use crate::config::{Settings, StrategyKind};
use crate::error::ConfigError;
use crate::models::Signal;
use rust_decimal::Decimal;

/// Numeric inputs for one evaluation
#[derive(Debug, Clone, Copy)]
pub struct SignalInput<'a> {
    pub current_price: Decimal,
    /// Recent prices, oldest first, ending with `current_price`
    pub history: &'a [Decimal],
    /// Price recorded when the open buy was placed, if any
    pub reference_price: Option<Decimal>,
}

/// Turns prices into a trading signal
///
/// Implementations must be pure and total: same input, same signal, and
/// `Hold` whenever there is not enough data.
pub trait SignalEvaluator: Send + Sync {
    fn evaluate(&self, input: &SignalInput<'_>) -> Signal;

    fn name(&self) -> &str;

    /// History length below which the evaluator can only return `Hold`
    fn min_samples_required(&self) -> usize;
}

/// Build the evaluator selected in settings
pub fn from_settings(settings: &Settings) -> Result<Box<dyn SignalEvaluator>, ConfigError> {
    Ok(match settings.strategy {
        StrategyKind::MaCrossover => Box::new(MovingAverageCrossover::new(
            settings.short_ma_period,
            settings.long_ma_period,
        )),
        StrategyKind::LastDigit => Box::new(LastDigitStrategy::new(
            settings.buy_digit_set()?,
            settings.sell_digit_set()?,
        )),
    })
}
