// Technical indicators used by the signal evaluators
pub mod moving_average;

pub use moving_average::{calculate_mean, calculate_sma};
