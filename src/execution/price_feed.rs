use super::{bounded, PriceHistory};
use crate::api::Exchange;
use crate::config::{PriceSource, Settings};
use crate::error::TickError;
use crate::indicators::calculate_mean;
use crate::models::{Candle, PriceSample};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;

/// Produces one price sample per tick and keeps the recent history
pub struct PriceFeed {
    symbol: String,
    candle_interval: String,
    source: PriceSource,
    average_window: usize,
    history: PriceHistory,
}

impl PriceFeed {
    pub fn new(
        symbol: impl Into<String>,
        candle_interval: impl Into<String>,
        source: PriceSource,
        average_window: usize,
        history_size: usize,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            candle_interval: candle_interval.into(),
            source,
            average_window: average_window.max(1),
            history: PriceHistory::new(history_size),
        }
    }

    pub fn from_settings(settings: &Settings, history_size: usize) -> Self {
        Self::new(
            settings.symbol.clone(),
            settings.candle_interval.clone(),
            settings.price_source,
            settings.candles_per_tick(),
            history_size,
        )
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    /// Seed the history with up to `count` closed candles
    pub async fn warm_up<E: Exchange>(
        &mut self,
        exchange: &E,
        count: usize,
        now: DateTime<Utc>,
        call_timeout: Duration,
    ) -> Result<usize, TickError> {
        let closes = self.closed_candles(exchange, count, now, call_timeout).await?;
        for (minute, close) in closes {
            self.history.push(PriceSample {
                value: close,
                timestamp_minute: minute,
            });
        }

        tracing::info!(
            symbol = %self.symbol,
            samples = self.history.len(),
            "Warmed up price history"
        );
        Ok(self.history.len())
    }

    /// Fetch this tick's sample and append it to the history
    pub async fn fetch<E: Exchange>(
        &mut self,
        exchange: &E,
        now: DateTime<Utc>,
        call_timeout: Duration,
    ) -> Result<PriceSample, TickError> {
        let sample = match self.source {
            PriceSource::LastClose => {
                let closes = self.closed_candles(exchange, 1, now, call_timeout).await?;
                let (minute, close) = closes.last().copied().ok_or(TickError::NoPriceData)?;
                PriceSample {
                    value: close,
                    timestamp_minute: minute,
                }
            }
            PriceSource::CandleAverage => {
                let closes = self
                    .closed_candles(exchange, self.average_window, now, call_timeout)
                    .await?;
                let (minute, _) = closes.last().copied().ok_or(TickError::NoPriceData)?;
                let values: Vec<Decimal> = closes.iter().map(|(_, close)| *close).collect();
                PriceSample {
                    value: calculate_mean(&values).ok_or(TickError::NoPriceData)?,
                    timestamp_minute: minute,
                }
            }
            PriceSource::BestBid => {
                let raw = bounded(call_timeout, exchange.best_bid(&self.symbol))
                    .await
                    .map_err(|source| TickError::DataFetch {
                        what: "order book",
                        source,
                    })?;
                PriceSample {
                    value: parse_price("best bid", &raw)?,
                    timestamp_minute: now.timestamp().div_euclid(60),
                }
            }
        };

        self.history.push(sample);

        tracing::debug!(
            symbol = %self.symbol,
            price = %sample.value,
            minute = sample.timestamp_minute,
            "Fetched price sample"
        );

        Ok(sample)
    }

    /// Up to `count` most recent candles that closed before `now`, as
    /// (open minute, close)
    async fn closed_candles<E: Exchange>(
        &self,
        exchange: &E,
        count: usize,
        now: DateTime<Utc>,
        call_timeout: Duration,
    ) -> Result<Vec<(i64, Decimal)>, TickError> {
        // One extra to cover the candle that is still forming
        let candles = bounded(
            call_timeout,
            exchange.recent_candles(&self.symbol, &self.candle_interval, count + 1),
        )
        .await
        .map_err(|source| TickError::DataFetch {
            what: "candles",
            source,
        })?;

        select_closed(&candles, count, now)
    }
}

fn select_closed(
    candles: &[Candle],
    count: usize,
    now: DateTime<Utc>,
) -> Result<Vec<(i64, Decimal)>, TickError> {
    let now_ms = now.timestamp_millis();
    let closed: Vec<&Candle> = candles.iter().filter(|c| c.close_time_ms < now_ms).collect();
    let start = closed.len().saturating_sub(count);

    closed[start..]
        .iter()
        .map(|c| Ok((c.open_time_ms.div_euclid(60_000), parse_price("close", &c.close)?)))
        .collect()
}

fn parse_price(field: &'static str, raw: &str) -> Result<Decimal, TickError> {
    match raw.trim().parse::<Decimal>() {
        Ok(v) if v > Decimal::ZERO => Ok(v),
        _ => Err(TickError::Parse {
            field,
            value: raw.to_string(),
        }),
    }
}
