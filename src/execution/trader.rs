use chrono::{DateTime, Utc};
use std::time::Duration;

use super::{bounded, BalanceInspector, OrderMachine, Phase, PriceFeed, TradingState};
use crate::api::Exchange;
use crate::config::Settings;
use crate::error::{ConfigError, ExchangeError, TickError};
use crate::models::{Order, OrderRequest, OrderSide, PriceSample, Signal};
use crate::strategy::{self, SignalEvaluator, SignalInput};

/// What happened to the order side of a tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    NoAction {
        reason: String,
    },
    Placed {
        order: Order,
        reason: String,
    },
    /// The guard stays open and the same transition is retried next tick
    PlacementFailed {
        request: OrderRequest,
        error: String,
        retryable: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub sample: PriceSample,
    pub signal: Signal,
    pub phase_before: Phase,
    pub phase_after: Phase,
    pub outcome: TickOutcome,
}

/// Owns the trading state and runs one fetch → evaluate → transition cycle
/// per call to [`Trader::tick`]
pub struct Trader<E: Exchange> {
    exchange: E,
    symbol: String,
    inspector: BalanceInspector,
    evaluator: Box<dyn SignalEvaluator>,
    machine: OrderMachine,
    feed: PriceFeed,
    state: TradingState,
    call_timeout: Duration,
}

impl<E: Exchange> Trader<E> {
    pub fn new(
        exchange: E,
        symbol: impl Into<String>,
        inspector: BalanceInspector,
        evaluator: Box<dyn SignalEvaluator>,
        machine: OrderMachine,
        feed: PriceFeed,
        call_timeout: Duration,
    ) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            inspector,
            evaluator,
            machine,
            feed,
            state: TradingState::new(),
            call_timeout,
        }
    }

    pub fn from_settings(exchange: E, settings: &Settings) -> Result<Self, ConfigError> {
        let evaluator = strategy::from_settings(settings)?;
        let history_size = evaluator.min_samples_required().max(1);

        Ok(Self::new(
            exchange,
            settings.symbol.clone(),
            BalanceInspector::from_settings(settings),
            evaluator,
            OrderMachine::new(settings.stop_loss_fraction),
            PriceFeed::from_settings(settings, history_size),
            Duration::from_secs(settings.call_timeout_secs),
        ))
    }

    pub fn state(&self) -> &TradingState {
        &self.state
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn evaluator_name(&self) -> &str {
        self.evaluator.name()
    }

    /// Pre-load enough closed candles for the evaluator to produce signals
    /// from the first tick
    pub async fn warm_up(&mut self, now: DateTime<Utc>) -> Result<usize, TickError> {
        let needed = self.evaluator.min_samples_required();
        if needed <= 1 {
            return Ok(0);
        }
        self.feed
            .warm_up(&self.exchange, needed, now, self.call_timeout)
            .await
    }

    /// Run one tick
    ///
    /// Fetch failures abort the tick before anything changes. Placement
    /// failures are reported in the outcome and leave the state as planned.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickReport, TickError> {
        let sample = self
            .feed
            .fetch(&self.exchange, now, self.call_timeout)
            .await?;

        let balances = bounded(self.call_timeout, self.exchange.account_balances())
            .await
            .map_err(|source| TickError::DataFetch {
                what: "balances",
                source,
            })?;
        let holdings = self.inspector.holdings(&balances);

        let prices = self.feed.history().prices();
        let signal = self.evaluator.evaluate(&SignalInput {
            current_price: sample.value,
            history: &prices,
            reference_price: self.state.reference_buy_price,
        });

        let phase_before = self.state.phase();
        let quantity = holdings
            .select(self.state.open_slots())
            .map(|(_, h)| h.quantity.rounded_to_lot_size);

        tracing::info!(
            price = %sample.value,
            quantity = ?quantity,
            signal = ?signal,
            phase = ?phase_before,
            "Tick"
        );

        let plan = self.machine.plan(&self.state, &sample, signal, &holdings);
        self.state = plan.state;

        let outcome = match plan.request {
            None => TickOutcome::NoAction {
                reason: plan.reason,
            },
            Some(request) => match self.place(&request).await {
                Ok(order) => {
                    tracing::info!(
                        side = ?order.side,
                        id = %order.id,
                        quantity = %order.requested_quantity,
                        filled_price = ?order.filled_price,
                        "✓ Order placed: {}",
                        plan.reason
                    );
                    self.state =
                        OrderMachine::record(&self.state, &request, order.clone(), &sample);
                    TickOutcome::Placed {
                        order,
                        reason: plan.reason,
                    }
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    if retryable {
                        tracing::warn!(side = ?request.side, "✗ Order placement failed, will retry: {}", e);
                    } else {
                        tracing::error!(side = ?request.side, "✗ Order placement rejected: {}", e);
                    }
                    TickOutcome::PlacementFailed {
                        request,
                        error: e.to_string(),
                        retryable,
                    }
                }
            },
        };

        Ok(TickReport {
            sample,
            signal,
            phase_before,
            phase_after: self.state.phase(),
            outcome,
        })
    }

    async fn place(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
        match request.side {
            OrderSide::StopLoss => {
                bounded(
                    self.call_timeout,
                    self.exchange
                        .place_stop_loss_order(&self.symbol, request.quantity.amount()),
                )
                .await
            }
            OrderSide::Buy | OrderSide::Sell => {
                bounded(
                    self.call_timeout,
                    self.exchange
                        .place_market_order(&self.symbol, request.side, request.quantity),
                )
                .await
            }
        }
    }
}
