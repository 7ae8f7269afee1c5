use rust_decimal::Decimal;

/// Calculate Simple Moving Average (SMA) over the last `period` prices
pub fn calculate_sma(prices: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: Decimal = prices.iter().rev().take(period).sum();
    Some(sum / Decimal::from(period))
}

/// Mean of all prices, `None` when empty
pub fn calculate_mean(prices: &[Decimal]) -> Option<Decimal> {
    calculate_sma(prices, prices.len())
}
