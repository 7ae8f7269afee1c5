// Exchange collaborator
pub mod binance;

pub use binance::BinanceClient;

use crate::error::ExchangeError;
use crate::models::{Candle, Order, OrderQuantity, OrderSide, RawBalance};
use rust_decimal::Decimal;
use std::future::Future;

/// Everything the trading loop needs from an exchange
///
/// The decision loop only talks to this trait, so tests can drive it with an
/// in-memory double instead of a live venue.
pub trait Exchange {
    /// Most recent `count` candles, oldest first
    fn recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Candle>, ExchangeError>> + Send;

    fn account_balances(&self) -> impl Future<Output = Result<Vec<RawBalance>, ExchangeError>> + Send;

    /// Best bid price as reported by the order book
    fn best_bid(&self, symbol: &str) -> impl Future<Output = Result<String, ExchangeError>> + Send;

    fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: OrderQuantity,
    ) -> impl Future<Output = Result<Order, ExchangeError>> + Send;

    /// Sell `quantity` of the base asset as a stop-loss exit
    fn place_stop_loss_order(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> impl Future<Output = Result<Order, ExchangeError>> + Send;
}
