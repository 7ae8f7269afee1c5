use rust_decimal::Decimal;

use crate::execution::balance::{Holdings, OpenSlots};
use crate::models::{Order, OrderQuantity, OrderRequest, OrderSide, PriceSample, Signal};

/// Lifecycle phase, derived from which slots are occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No open buy or sell
    Idle,
    /// Buy open, no stop-loss yet
    LongOpen,
    /// Buy open and stop-loss placed
    LongProtected,
    /// Sell placed, waiting for balances to confirm
    Closed,
}

/// The three order slots plus the price the position was opened at
///
/// Invariants: `open_buy_order` and `open_sell_order` are never both set,
/// and `reference_buy_price` is set iff `open_buy_order` is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingState {
    pub open_buy_order: Option<Order>,
    pub open_sell_order: Option<Order>,
    pub open_stop_loss_order: Option<Order>,
    pub reference_buy_price: Option<Decimal>,
}

impl TradingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match (
            &self.open_buy_order,
            &self.open_sell_order,
            &self.open_stop_loss_order,
        ) {
            (Some(_), _, Some(_)) => Phase::LongProtected,
            (Some(_), _, None) => Phase::LongOpen,
            (None, Some(_), _) => Phase::Closed,
            (None, None, _) => Phase::Idle,
        }
    }

    pub fn open_slots(&self) -> OpenSlots {
        OpenSlots {
            buy: self.open_buy_order.is_some(),
            sell: self.open_sell_order.is_some(),
        }
    }
}

/// Outcome of planning one tick: the (possibly settled) state and at most
/// one order to place
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub state: TradingState,
    pub request: Option<OrderRequest>,
    pub reason: String,
}

impl Plan {
    fn idle(state: TradingState, reason: impl Into<String>) -> Self {
        Self {
            state,
            request: None,
            reason: reason.into(),
        }
    }

    fn place(state: TradingState, side: OrderSide, quantity: OrderQuantity, reason: String) -> Self {
        Self {
            state,
            request: Some(OrderRequest { side, quantity }),
            reason,
        }
    }
}

/// Decides buy / sell / stop-loss transitions
///
/// Both entry points are pure: the caller owns the state and only commits
/// the result of [`OrderMachine::record`] after the exchange accepted the
/// order, so a failed placement leaves the guard open for the next tick.
#[derive(Debug, Clone)]
pub struct OrderMachine {
    stop_loss_fraction: Decimal,
}

impl OrderMachine {
    pub fn new(stop_loss_fraction: Decimal) -> Self {
        Self { stop_loss_fraction }
    }

    pub fn stop_loss_fraction(&self) -> Decimal {
        self.stop_loss_fraction
    }

    /// Price below which the stop-loss fires
    pub fn stop_loss_price(&self, reference: Decimal) -> Decimal {
        reference * (Decimal::ONE - self.stop_loss_fraction)
    }

    /// Settle completed exits, then check stop-loss, buy and sell in that
    /// order. The first eligible transition wins.
    pub fn plan(
        &self,
        state: &TradingState,
        sample: &PriceSample,
        signal: Signal,
        holdings: &Holdings,
    ) -> Plan {
        let state = settle(state, holdings);
        let price = sample.value;

        // Stop-loss overrides everything else while long
        if let Some(reference) = state.reference_buy_price {
            if state.open_buy_order.is_some() && state.open_stop_loss_order.is_none() {
                let stop_price = self.stop_loss_price(reference);
                if price < stop_price {
                    return match &holdings.base {
                        Some(holding) => Plan::place(
                            state,
                            OrderSide::StopLoss,
                            OrderQuantity::Base(holding.quantity.rounded_to_lot_size),
                            format!("Price {} below stop-loss {}", price, stop_price),
                        ),
                        None => Plan::idle(
                            state,
                            format!(
                                "Stop-loss at {} triggered but no base balance to sell",
                                stop_price
                            ),
                        ),
                    };
                }
            }
        }

        match signal {
            Signal::Buy if state.open_buy_order.is_none() => match &holdings.quote {
                Some(holding) => Plan::place(
                    state,
                    OrderSide::Buy,
                    OrderQuantity::Quote(holding.quantity.rounded_to_lot_size),
                    format!("Buy signal at {}", price),
                ),
                None => Plan::idle(state, "Buy signal but no quote balance"),
            },
            Signal::Buy => Plan::idle(state, "Buy signal ignored, buy already open"),

            Signal::Sell => {
                let Some(reference) = state.reference_buy_price else {
                    return Plan::idle(state, "Sell signal but no open buy");
                };
                if state.open_sell_order.is_some() {
                    return Plan::idle(state, "Sell signal ignored, sell already open");
                }
                if state.open_stop_loss_order.is_some() {
                    return Plan::idle(state, "Sell signal ignored, stop-loss already placed");
                }
                if price <= reference {
                    return Plan::idle(
                        state,
                        format!(
                            "Sell signal ignored, price {} not above reference {}",
                            price, reference
                        ),
                    );
                }
                match &holdings.base {
                    Some(holding) => Plan::place(
                        state,
                        OrderSide::Sell,
                        OrderQuantity::Base(holding.quantity.rounded_to_lot_size),
                        format!("Sell signal at {} above reference {}", price, reference),
                    ),
                    None => Plan::idle(state, "Sell signal but no base balance"),
                }
            }

            Signal::Hold => Plan::idle(state, "Hold"),
        }
    }

    /// State after the exchange accepted `order` for `request`
    pub fn record(
        state: &TradingState,
        request: &OrderRequest,
        order: Order,
        sample: &PriceSample,
    ) -> TradingState {
        let mut next = state.clone();

        match request.side {
            OrderSide::Buy => {
                next.reference_buy_price = Some(order.filled_price.unwrap_or(sample.value));
                next.open_buy_order = Some(order);
                next.open_sell_order = None;
                next.open_stop_loss_order = None;
            }
            OrderSide::Sell => {
                next.open_sell_order = Some(order);
                next.open_buy_order = None;
                next.open_stop_loss_order = None;
                next.reference_buy_price = None;
            }
            OrderSide::StopLoss => {
                next.open_stop_loss_order = Some(order);
            }
        }

        next
    }
}

/// Clear slots whose exit has visibly completed
///
/// An exit sells `requested_quantity` of base. Once less than that is left
/// (or nothing above the threshold), the remainder is fee and lot-size
/// residue and the position counts as closed.
fn settle(state: &TradingState, holdings: &Holdings) -> TradingState {
    match state.phase() {
        Phase::Closed if exit_filled(state.open_sell_order.as_ref(), holdings) => {
            tracing::info!("Sell completed, back to idle");
            TradingState {
                open_sell_order: None,
                ..state.clone()
            }
        }
        Phase::LongProtected if exit_filled(state.open_stop_loss_order.as_ref(), holdings) => {
            tracing::info!("Stop-loss completed, back to idle");
            TradingState::default()
        }
        _ => state.clone(),
    }
}

fn exit_filled(exit: Option<&Order>, holdings: &Holdings) -> bool {
    let Some(exit) = exit else {
        return false;
    };
    holdings
        .base
        .as_ref()
        .map_or(true, |base| base.balance.free < exit.requested_quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::balance::Holding;
    use crate::models::{Balance, TradeQuantity};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sample(value: Decimal) -> PriceSample {
        PriceSample {
            value,
            timestamp_minute: 0,
        }
    }

    fn holding(asset: &str, amount: Decimal) -> Holding {
        Holding {
            balance: Balance {
                asset: asset.to_string(),
                free: amount,
            },
            quantity: TradeQuantity {
                raw: amount,
                fee_adjusted: amount,
                rounded_to_lot_size: amount,
            },
        }
    }

    fn quote_only(amount: Decimal) -> Holdings {
        Holdings {
            quote: Some(holding("USDT", amount)),
            base: None,
        }
    }

    fn base_only(amount: Decimal) -> Holdings {
        Holdings {
            quote: None,
            base: Some(holding("ETH", amount)),
        }
    }

    fn order(side: OrderSide, filled_price: Option<Decimal>) -> Order {
        Order {
            id: "1".to_string(),
            side,
            requested_quantity: dec!(1),
            filled_price,
            placed_at: Utc::now(),
        }
    }

    fn long_state(reference: Decimal) -> TradingState {
        TradingState {
            open_buy_order: Some(order(OrderSide::Buy, Some(reference))),
            open_sell_order: None,
            open_stop_loss_order: None,
            reference_buy_price: Some(reference),
        }
    }

    fn machine() -> OrderMachine {
        OrderMachine::new(dec!(0.05))
    }

    #[test]
    fn test_phases() {
        let mut state = TradingState::new();
        assert_eq!(state.phase(), Phase::Idle);

        state = long_state(dec!(2000));
        assert_eq!(state.phase(), Phase::LongOpen);

        state.open_stop_loss_order = Some(order(OrderSide::StopLoss, None));
        assert_eq!(state.phase(), Phase::LongProtected);

        let closed = TradingState {
            open_sell_order: Some(order(OrderSide::Sell, None)),
            ..TradingState::default()
        };
        assert_eq!(closed.phase(), Phase::Closed);
    }

    #[test]
    fn test_idle_buy_signal_places_buy() {
        let plan = machine().plan(
            &TradingState::new(),
            &sample(dec!(2000)),
            Signal::Buy,
            &quote_only(dec!(99)),
        );

        assert_eq!(
            plan.request,
            Some(OrderRequest {
                side: OrderSide::Buy,
                quantity: OrderQuantity::Quote(dec!(99)),
            })
        );
    }

    #[test]
    fn test_buy_without_quote_balance_does_nothing() {
        let plan = machine().plan(
            &TradingState::new(),
            &sample(dec!(2000)),
            Signal::Buy,
            &Holdings::default(),
        );

        assert!(plan.request.is_none());
        assert!(plan.reason.contains("no quote balance"));
    }

    #[test]
    fn test_buy_not_repeated_while_open() {
        let plan = machine().plan(
            &long_state(dec!(2000)),
            &sample(dec!(2001)),
            Signal::Buy,
            &Holdings {
                quote: Some(holding("USDT", dec!(50))),
                base: Some(holding("ETH", dec!(0.05))),
            },
        );

        assert!(plan.request.is_none());
    }

    #[test]
    fn test_record_buy_uses_fill_price_and_clears_sell() {
        let state = TradingState {
            open_sell_order: Some(order(OrderSide::Sell, None)),
            ..TradingState::default()
        };
        let request = OrderRequest {
            side: OrderSide::Buy,
            quantity: OrderQuantity::Quote(dec!(99)),
        };

        let next = OrderMachine::record(
            &state,
            &request,
            order(OrderSide::Buy, Some(dec!(2000.4))),
            &sample(dec!(2000)),
        );

        assert_eq!(next.phase(), Phase::LongOpen);
        assert_eq!(next.reference_buy_price, Some(dec!(2000.4)));
        assert!(next.open_sell_order.is_none());
    }

    #[test]
    fn test_record_buy_falls_back_to_sample_price() {
        let request = OrderRequest {
            side: OrderSide::Buy,
            quantity: OrderQuantity::Quote(dec!(99)),
        };
        let next = OrderMachine::record(
            &TradingState::new(),
            &request,
            order(OrderSide::Buy, None),
            &sample(dec!(2000)),
        );

        assert_eq!(next.reference_buy_price, Some(dec!(2000)));
    }

    #[test]
    fn test_stop_loss_boundary() {
        let state = long_state(dec!(2000));
        let holdings = base_only(dec!(0.0495));

        // 2000 * 0.95 = 1900
        let plan = machine().plan(&state, &sample(dec!(1899.99)), Signal::Hold, &holdings);
        assert_eq!(
            plan.request,
            Some(OrderRequest {
                side: OrderSide::StopLoss,
                quantity: OrderQuantity::Base(dec!(0.0495)),
            })
        );

        let plan = machine().plan(&state, &sample(dec!(1900.00)), Signal::Hold, &holdings);
        assert!(plan.request.is_none());

        let plan = machine().plan(&state, &sample(dec!(1900.01)), Signal::Hold, &holdings);
        assert!(plan.request.is_none());
    }

    #[test]
    fn test_stop_loss_takes_priority_over_sell() {
        // Reference 2000 but price far below: a Sell signal must not win
        let plan = machine().plan(
            &long_state(dec!(2000)),
            &sample(dec!(1800)),
            Signal::Sell,
            &base_only(dec!(0.05)),
        );

        assert_eq!(plan.request.map(|r| r.side), Some(OrderSide::StopLoss));
    }

    #[test]
    fn test_stop_loss_only_once() {
        let mut state = long_state(dec!(2000));
        state.open_stop_loss_order = Some(order(OrderSide::StopLoss, None));

        // Stop-loss for 1 not filled yet
        let plan = machine().plan(&state, &sample(dec!(1500)), Signal::Hold, &base_only(dec!(2)));
        assert!(plan.request.is_none());
        assert_eq!(plan.state.phase(), Phase::LongProtected);
    }

    #[test]
    fn test_stop_loss_needs_open_buy() {
        let plan = machine().plan(
            &TradingState::new(),
            &sample(dec!(1)),
            Signal::Hold,
            &base_only(dec!(0.05)),
        );
        assert!(plan.request.is_none());
    }

    #[test]
    fn test_sell_requires_profit() {
        let state = long_state(dec!(2000));
        let holdings = base_only(dec!(0.05));

        let plan = machine().plan(&state, &sample(dec!(2000)), Signal::Sell, &holdings);
        assert!(plan.request.is_none());
        assert!(plan.reason.contains("not above reference"));

        let plan = machine().plan(&state, &sample(dec!(1950)), Signal::Sell, &holdings);
        assert!(plan.request.is_none());

        let plan = machine().plan(&state, &sample(dec!(2000.01)), Signal::Sell, &holdings);
        assert_eq!(
            plan.request,
            Some(OrderRequest {
                side: OrderSide::Sell,
                quantity: OrderQuantity::Base(dec!(0.05)),
            })
        );
    }

    #[test]
    fn test_sell_without_open_buy_is_ignored() {
        let plan = machine().plan(
            &TradingState::new(),
            &sample(dec!(2100)),
            Signal::Sell,
            &base_only(dec!(1)),
        );
        assert!(plan.request.is_none());
    }

    #[test]
    fn test_record_sell_clears_buy() {
        let request = OrderRequest {
            side: OrderSide::Sell,
            quantity: OrderQuantity::Base(dec!(0.05)),
        };
        let next = OrderMachine::record(
            &long_state(dec!(2000)),
            &request,
            order(OrderSide::Sell, Some(dec!(2100))),
            &sample(dec!(2100)),
        );

        assert_eq!(next.phase(), Phase::Closed);
        assert!(next.open_buy_order.is_none());
        assert!(next.reference_buy_price.is_none());
    }

    #[test]
    fn test_closed_settles_to_idle_when_base_gone() {
        let closed = TradingState {
            open_sell_order: Some(order(OrderSide::Sell, None)),
            ..TradingState::default()
        };

        let plan = machine().plan(&closed, &sample(dec!(2100)), Signal::Hold, &quote_only(dec!(100)));
        assert_eq!(plan.state.phase(), Phase::Idle);
        assert!(plan.state.open_sell_order.is_none());

        // Base for the whole sell still visible: not confirmed yet
        let plan = machine().plan(&closed, &sample(dec!(2100)), Signal::Hold, &base_only(dec!(1.5)));
        assert_eq!(plan.state.phase(), Phase::Closed);
    }

    #[test]
    fn test_protected_settles_to_idle_when_base_gone() {
        let mut state = long_state(dec!(2000));
        state.open_stop_loss_order = Some(order(OrderSide::StopLoss, None));

        let plan = machine().plan(&state, &sample(dec!(1850)), Signal::Buy, &quote_only(dec!(94)));

        assert_eq!(plan.state.reference_buy_price, None);
        // Settled in the same tick, so the buy guard is open again
        assert_eq!(plan.request.map(|r| r.side), Some(OrderSide::Buy));
    }

    #[test]
    fn test_exit_residue_does_not_block_settling() {
        // Stop-loss sold 49.9 of 49.95; 0.05 stays behind above the threshold
        let mut state = long_state(dec!(2000));
        let mut stop = order(OrderSide::StopLoss, None);
        stop.requested_quantity = dec!(49.9);
        state.open_stop_loss_order = Some(stop);
        let residue = Holdings {
            quote: Some(holding("USDT", dec!(89820))),
            base: Some(holding("ETH", dec!(0.05))),
        };

        let plan = machine().plan(&state, &sample(dec!(1800)), Signal::Buy, &residue);
        assert_eq!(plan.request.map(|r| r.side), Some(OrderSide::Buy));
        assert!(plan.state.open_stop_loss_order.is_none());

        let mut sell = order(OrderSide::Sell, None);
        sell.requested_quantity = dec!(49.9);
        let closed = TradingState {
            open_sell_order: Some(sell),
            ..TradingState::default()
        };
        let plan = machine().plan(&closed, &sample(dec!(2100)), Signal::Hold, &residue);
        assert_eq!(plan.state.phase(), Phase::Idle);
    }

    #[test]
    fn test_no_sell_while_stop_loss_open() {
        let mut state = long_state(dec!(2000));
        state.open_stop_loss_order = Some(order(OrderSide::StopLoss, None));

        // Stop-loss for 1 still unfilled, price back above the reference
        let plan = machine().plan(&state, &sample(dec!(2100)), Signal::Sell, &base_only(dec!(2)));
        assert!(plan.request.is_none());
        assert!(plan.reason.contains("stop-loss already placed"));
    }

    #[test]
    fn test_long_open_not_settled_without_base() {
        // A buy whose base has not shown up yet stays open
        let plan = machine().plan(
            &long_state(dec!(2000)),
            &sample(dec!(2000)),
            Signal::Hold,
            &Holdings::default(),
        );
        assert_eq!(plan.state.phase(), Phase::LongOpen);
    }

    #[test]
    fn test_plan_does_not_mutate_input() {
        let state = TradingState::new();
        let before = state.clone();
        let _ = machine().plan(&state, &sample(dec!(2001)), Signal::Buy, &quote_only(dec!(99)));
        assert_eq!(state, before);
    }
}
