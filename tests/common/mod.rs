#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;
use spotbot::api::Exchange;
use spotbot::error::ExchangeError;
use spotbot::models::{Candle, Order, OrderQuantity, OrderSide, RawBalance};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Order call as seen by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedCall {
    pub side: OrderSide,
    pub quantity: OrderQuantity,
}

#[derive(Debug, Default)]
struct MockState {
    price: String,
    closes: Option<Vec<String>>,
    minute: i64,
    quote: Decimal,
    base: Decimal,
    raw_quote_override: Option<String>,
    auto_fill: bool,
    fail_next_orders: usize,
    fail_candles: bool,
    fail_balances: bool,
    candle_delay: Option<Duration>,
    calls: Vec<PlacedCall>,
    attempts: usize,
    next_id: u64,
}

/// In-memory exchange. When `auto_fill` is on, orders fill at the current
/// price and move the balances accordingly.
#[derive(Clone, Default)]
pub struct MockExchange {
    state: Arc<Mutex<MockState>>,
}

impl MockExchange {
    pub fn new(quote: Decimal, base: Decimal) -> Self {
        let exchange = Self::default();
        {
            let mut s = exchange.state.lock().unwrap();
            s.quote = quote;
            s.base = base;
            s.price = "2000".to_string();
        }
        exchange
    }

    pub fn with_auto_fill(self) -> Self {
        self.state.lock().unwrap().auto_fill = true;
        self
    }

    pub fn set_price(&self, price: &str) {
        self.state.lock().unwrap().price = price.to_string();
    }

    /// Script candle closes, oldest first. The newest one lands in the
    /// current minute.
    pub fn set_closes(&self, closes: &[&str]) {
        self.state.lock().unwrap().closes = Some(closes.iter().map(|c| c.to_string()).collect());
    }

    /// Minute of the newest candle returned so far
    pub fn current_minute(&self) -> i64 {
        self.state.lock().unwrap().minute
    }

    pub fn set_raw_quote(&self, raw: &str) {
        self.state.lock().unwrap().raw_quote_override = Some(raw.to_string());
    }

    pub fn fail_next_orders(&self, n: usize) {
        self.state.lock().unwrap().fail_next_orders = n;
    }

    pub fn fail_candles(&self, fail: bool) {
        self.state.lock().unwrap().fail_candles = fail;
    }

    pub fn fail_balances(&self, fail: bool) {
        self.state.lock().unwrap().fail_balances = fail;
    }

    pub fn delay_candles(&self, delay: Duration) {
        self.state.lock().unwrap().candle_delay = Some(delay);
    }

    /// Successful placements
    pub fn calls(&self) -> Vec<PlacedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Placement attempts, including rejected ones
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn balances(&self) -> (Decimal, Decimal) {
        let s = self.state.lock().unwrap();
        (s.quote, s.base)
    }

    fn place(&self, side: OrderSide, quantity: OrderQuantity) -> Result<Order, ExchangeError> {
        let mut s = self.state.lock().unwrap();
        s.attempts += 1;

        if s.fail_next_orders > 0 {
            s.fail_next_orders -= 1;
            return Err(ExchangeError::Rejected {
                code: -2010,
                msg: "Account has insufficient balance for requested action.".to_string(),
            });
        }

        let price: Decimal = s.price.parse().unwrap();
        if s.auto_fill {
            match quantity {
                OrderQuantity::Quote(q) => {
                    s.quote -= q;
                    s.base += (q / price).round_dp(8);
                }
                OrderQuantity::Base(q) => {
                    s.base -= q;
                    s.quote += (q * price).round_dp(8);
                }
            }
        }

        s.next_id += 1;
        s.calls.push(PlacedCall { side, quantity });

        Ok(Order {
            id: s.next_id.to_string(),
            side,
            requested_quantity: quantity.amount(),
            filled_price: Some(price),
            placed_at: Utc::now(),
        })
    }
}

impl Exchange for MockExchange {
    async fn recent_candles(
        &self,
        _symbol: &str,
        _interval: &str,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let delay = self.state.lock().unwrap().candle_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut s = self.state.lock().unwrap();
        if s.fail_candles {
            return Err(ExchangeError::Network("connection reset".to_string()));
        }

        s.minute += 1;
        let newest = s.minute;
        let closes: Vec<String> = match &s.closes {
            Some(script) => script[script.len().saturating_sub(count)..].to_vec(),
            None => vec![s.price.clone(); count],
        };
        let oldest = newest - closes.len() as i64 + 1;

        Ok(closes
            .into_iter()
            .enumerate()
            .map(|(i, close)| {
                let minute = oldest + i as i64;
                Candle {
                    open_time_ms: minute * 60_000,
                    close_time_ms: minute * 60_000 + 59_999,
                    close,
                }
            })
            .collect())
    }

    async fn account_balances(&self) -> Result<Vec<RawBalance>, ExchangeError> {
        let s = self.state.lock().unwrap();
        if s.fail_balances {
            return Err(ExchangeError::Http {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        Ok(vec![
            RawBalance {
                asset: "ETH".to_string(),
                free: s.base.to_string(),
            },
            RawBalance {
                asset: "USDT".to_string(),
                free: s
                    .raw_quote_override
                    .clone()
                    .unwrap_or_else(|| s.quote.to_string()),
            },
            RawBalance {
                asset: "BNB".to_string(),
                free: "0.00000000".to_string(),
            },
        ])
    }

    async fn best_bid(&self, _symbol: &str) -> Result<String, ExchangeError> {
        Ok(self.state.lock().unwrap().price.clone())
    }

    async fn place_market_order(
        &self,
        _symbol: &str,
        side: OrderSide,
        quantity: OrderQuantity,
    ) -> Result<Order, ExchangeError> {
        self.place(side, quantity)
    }

    async fn place_stop_loss_order(
        &self,
        _symbol: &str,
        quantity: Decimal,
    ) -> Result<Order, ExchangeError> {
        self.place(OrderSide::StopLoss, OrderQuantity::Base(quantity))
    }
}
