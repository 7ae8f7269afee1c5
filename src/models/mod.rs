use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Price observed for one tick
///
/// Built from the latest closed candle, an average of recent closes,
/// or the order-book best bid depending on configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    pub value: Decimal,
    pub timestamp_minute: i64,
}

/// Candle as returned by the exchange. The close stays a raw string until
/// the price feed parses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time_ms: i64,
    pub close_time_ms: i64,
    pub close: String,
}

/// Unparsed account balance entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBalance {
    pub asset: String,
    pub free: String,
}

/// Parsed free balance for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
}

/// Quantity that can be traded from a balance
///
/// `fee_adjusted = raw * (1 - fee_pct / 100)` and
/// `rounded_to_lot_size <= fee_adjusted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeQuantity {
    pub raw: Decimal,
    pub fee_adjusted: Decimal,
    pub rounded_to_lot_size: Decimal,
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
    StopLoss,
}

/// Amount attached to an order request. Buys spend quote, sells release base.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderQuantity {
    Quote(Decimal),
    Base(Decimal),
}

impl OrderQuantity {
    pub fn amount(&self) -> Decimal {
        match self {
            OrderQuantity::Quote(q) | OrderQuantity::Base(q) => *q,
        }
    }
}

/// What the state machine wants placed this tick
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderRequest {
    pub side: OrderSide,
    pub quantity: OrderQuantity,
}

/// An order accepted by the exchange. Never amended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub side: OrderSide,
    pub requested_quantity: Decimal,
    pub filled_price: Option<Decimal>,
    pub placed_at: DateTime<Utc>,
}
