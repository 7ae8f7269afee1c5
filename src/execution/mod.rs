// Balance sizing, order lifecycle and the tick loop
pub mod balance;
pub mod order_machine;
pub mod price_feed;
pub mod price_history;
pub mod scheduler;
pub mod trader;

pub use balance::{AssetRole, BalanceInspector, Holding, Holdings, OpenSlots};
pub use order_machine::{OrderMachine, Phase, Plan, TradingState};
pub use price_feed::PriceFeed;
pub use price_history::PriceHistory;
pub use scheduler::{next_boundary, Clock, ManualClock, Scheduler, SystemClock};
pub use trader::{TickOutcome, TickReport, Trader};

use crate::error::ExchangeError;
use std::future::Future;
use std::time::Duration;

/// Bound an exchange call; running out of time is a retryable error
pub async fn bounded<T, F>(call_timeout: Duration, call: F) -> Result<T, ExchangeError>
where
    F: Future<Output = Result<T, ExchangeError>>,
{
    match tokio::time::timeout(call_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ExchangeError::Timeout(call_timeout)),
    }
}
