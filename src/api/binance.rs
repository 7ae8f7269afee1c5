use super::Exchange;
use crate::config::Credentials;
use crate::error::ExchangeError;
use crate::models::{Candle, Order, OrderQuantity, OrderSide, RawBalance};
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// Spot REST API
// Docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
pub const BINANCE_API_BASE: &str = "https://api.binance.com";
pub const BINANCE_TESTNET_BASE: &str = "https://testnet.binance.vision";

const RECV_WINDOW_MS: u64 = 5000;
const RATE_LIMIT_RPM: u32 = 600; // Well under the 6000 weight/min IP limit
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const HTTP_TIMEOUT_SECS: u64 = 30;

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Signed client for the Binance spot REST API
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    rate_limiter: Arc<BinanceRateLimiter>,
    initial_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct DepthResponse {
    bids: Vec<[String; 2]>, // [price, qty]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    #[serde(default)]
    transact_time: Option<i64>,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
    #[serde(default)]
    fills: Vec<FillEntry>,
}

#[derive(Debug, Deserialize)]
struct FillEntry {
    price: String,
    qty: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl BinanceClient {
    /// Client against production or testnet
    pub fn new(credentials: Credentials, testnet: bool) -> Result<Self, ExchangeError> {
        let base_url = if testnet {
            BINANCE_TESTNET_BASE
        } else {
            BINANCE_API_BASE
        };
        Self::with_base_url(credentials, base_url)
    }

    /// Client against an arbitrary base URL (mock servers, proxies)
    pub fn with_base_url(credentials: Credentials, base_url: &str) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| ExchangeError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first retry delay (doubles on each attempt)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// HMAC-SHA256 of the query string, hex encoded
    fn sign(&self, query: &str) -> Result<String, ExchangeError> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Append timestamp, recvWindow and signature to a parameter string
    fn signed_query(&self, params: &str) -> Result<String, ExchangeError> {
        let timestamp = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={}&recvWindow={}", timestamp, RECV_WINDOW_MS)
        } else {
            format!("{}&timestamp={}&recvWindow={}", params, timestamp, RECV_WINDOW_MS)
        };
        let signature = self.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    /// Rate-limited GET with retry on transient failures
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &str,
        signed: bool,
    ) -> Result<T, ExchangeError> {
        let mut attempt = 1;
        loop {
            match self.get_once(path, params, signed).await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < MAX_RETRIES => {
                    let backoff = self.initial_backoff * 2_u32.pow(attempt - 1);
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {:?}...",
                        attempt,
                        MAX_RETRIES,
                        path,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &str,
        signed: bool,
    ) -> Result<T, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let query = if signed {
            self.signed_query(params)?
        } else {
            params.to_string()
        };
        let url = format!("{}{}?{}", self.base_url, path, query);

        let mut request = self.client.get(&url);
        if signed {
            request = request.header("X-MBX-APIKEY", &self.credentials.api_key);
        }

        let response = request.send().await?;
        read_json(response).await
    }

    /// Signed POST /api/v3/order. Never retried here: a lost response could
    /// mean the order exists, and the next tick decides again anyway.
    async fn post_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: OrderQuantity,
    ) -> Result<Order, ExchangeError> {
        self.rate_limiter.until_ready().await;

        let wire_side = match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell | OrderSide::StopLoss => "SELL",
        };
        let quantity_param = match quantity {
            OrderQuantity::Quote(q) => format!("quoteOrderQty={}", q),
            OrderQuantity::Base(q) => format!("quantity={}", q),
        };
        let params = format!(
            "symbol={}&side={}&type=MARKET&{}&newOrderRespType=FULL&newClientOrderId={}",
            symbol,
            wire_side,
            quantity_param,
            client_order_id(side)
        );
        let url = format!("{}/api/v3/order?{}", self.base_url, self.signed_query(&params)?);

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.credentials.api_key)
            .send()
            .await?;
        let body: OrderResponse = read_json(response).await?;

        let placed_at = body
            .transact_time
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        Ok(Order {
            id: body.order_id.to_string(),
            side,
            requested_quantity: quantity.amount(),
            filled_price: average_fill_price(&body),
            placed_at,
        })
    }
}

fn is_transient(e: &ExchangeError) -> bool {
    match e {
        ExchangeError::Network(_) | ExchangeError::Timeout(_) => true,
        ExchangeError::Http { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Client order ids must match ^[.A-Z:/a-z0-9_-]{1,36}$
fn client_order_id(side: OrderSide) -> String {
    let prefix = match side {
        OrderSide::Buy => "b",
        OrderSide::Sell => "s",
        OrderSide::StopLoss => "sl",
    };
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ExchangeError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| ExchangeError::Decode(e.to_string()));
    }

    if status.as_u16() == 429 || status.is_server_error() {
        return Err(ExchangeError::Http {
            status: status.as_u16(),
            body,
        });
    }

    match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(err) => Err(ExchangeError::Rejected {
            code: err.code,
            msg: err.msg,
        }),
        Err(_) => Err(ExchangeError::Http {
            status: status.as_u16(),
            body,
        }),
    }
}

/// Volume-weighted fill price, falling back to cumulative quote / executed qty
fn average_fill_price(body: &OrderResponse) -> Option<Decimal> {
    let mut notional = Decimal::ZERO;
    let mut filled = Decimal::ZERO;
    for fill in &body.fills {
        let price: Decimal = fill.price.parse().ok()?;
        let qty: Decimal = fill.qty.parse().ok()?;
        notional += price * qty;
        filled += qty;
    }
    if filled > Decimal::ZERO {
        return Some(notional / filled);
    }

    let executed: Decimal = body.executed_qty.as_deref()?.parse().ok()?;
    let quote: Decimal = body.cummulative_quote_qty.as_deref()?.parse().ok()?;
    if executed > Decimal::ZERO {
        Some(quote / executed)
    } else {
        None
    }
}

impl Exchange for BinanceClient {
    async fn recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let params = format!("symbol={}&interval={}&limit={}", symbol, interval, count);
        let rows: Vec<Vec<serde_json::Value>> =
            self.get_json("/api/v3/klines", &params, false).await?;

        // [openTime, open, high, low, close, volume, closeTime, ...]
        rows.into_iter()
            .map(|row| {
                let open_time_ms = row
                    .first()
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| ExchangeError::Decode("kline missing open time".into()))?;
                let close = row
                    .get(4)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ExchangeError::Decode("kline missing close".into()))?;
                let close_time_ms = row
                    .get(6)
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| ExchangeError::Decode("kline missing close time".into()))?;
                Ok(Candle {
                    open_time_ms,
                    close_time_ms,
                    close: close.to_string(),
                })
            })
            .collect()
    }

    async fn account_balances(&self) -> Result<Vec<RawBalance>, ExchangeError> {
        let account: AccountResponse = self.get_json("/api/v3/account", "", true).await?;

        Ok(account
            .balances
            .into_iter()
            .map(|b| RawBalance {
                asset: b.asset,
                free: b.free,
            })
            .collect())
    }

    async fn best_bid(&self, symbol: &str) -> Result<String, ExchangeError> {
        let params = format!("symbol={}&limit=5", symbol);
        let depth: DepthResponse = self.get_json("/api/v3/depth", &params, false).await?;

        depth
            .bids
            .into_iter()
            .next()
            .map(|[price, _qty]| price)
            .ok_or_else(|| ExchangeError::Decode(format!("empty order book for {}", symbol)))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: OrderQuantity,
    ) -> Result<Order, ExchangeError> {
        self.post_order(symbol, side, quantity).await
    }

    /// Executed as a MARKET sell: by the time the guard fires the price is
    /// already through the stop level, where a resting STOP_LOSS would be
    /// rejected as immediately triggering.
    async fn place_stop_loss_order(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<Order, ExchangeError> {
        self.post_order(symbol, OrderSide::StopLoss, OrderQuantity::Base(quantity))
            .await
    }
}
