use crate::config::Settings;
use crate::models::{Balance, RawBalance, TradeQuantity};
use rust_decimal::{Decimal, RoundingStrategy};

/// Which side of the pair a balance belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    Quote,
    Base,
}

/// Which order slots are currently occupied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenSlots {
    pub buy: bool,
    pub sell: bool,
}

/// A balance that clears its minimum, with the quantity we may trade
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub balance: Balance,
    pub quantity: TradeQuantity,
}

/// Per-tick view of the tradable balances
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Holdings {
    pub quote: Option<Holding>,
    pub base: Option<Holding>,
}

impl Holdings {
    /// Pick the asset to act on given the open slots
    ///
    /// Quote is only usable while the buy slot is empty, base only while the
    /// sell slot is empty. If both qualify, the one matching the position
    /// wins: base while long, quote otherwise.
    pub fn select(&self, slots: OpenSlots) -> Option<(AssetRole, &Holding)> {
        let quote = self
            .quote
            .as_ref()
            .filter(|_| !slots.buy)
            .map(|h| (AssetRole::Quote, h));
        let base = self
            .base
            .as_ref()
            .filter(|_| !slots.sell)
            .map(|h| (AssetRole::Base, h));

        if slots.buy {
            base.or(quote)
        } else {
            quote.or(base)
        }
    }
}

/// Reads balances and sizes trades net of fees
#[derive(Debug, Clone)]
pub struct BalanceInspector {
    base_asset: String,
    quote_asset: String,
    min_base_balance: Decimal,
    min_quote_balance: Decimal,
    fee_percentage: Decimal,
    base_lot_decimals: u32,
    quote_lot_decimals: u32,
}

impl BalanceInspector {
    pub fn new(
        base_asset: impl Into<String>,
        quote_asset: impl Into<String>,
        min_base_balance: Decimal,
        min_quote_balance: Decimal,
        fee_percentage: Decimal,
    ) -> Self {
        Self {
            base_asset: base_asset.into(),
            quote_asset: quote_asset.into(),
            min_base_balance,
            min_quote_balance,
            fee_percentage,
            base_lot_decimals: 4,
            quote_lot_decimals: 2,
        }
    }

    pub fn with_lot_decimals(mut self, base: u32, quote: u32) -> Self {
        self.base_lot_decimals = base;
        self.quote_lot_decimals = quote;
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.base_asset.clone(),
            settings.quote_asset.clone(),
            settings.min_base_balance,
            settings.min_quote_balance,
            settings.fee_percentage,
        )
        .with_lot_decimals(settings.base_lot_decimals, settings.quote_lot_decimals)
    }

    /// Fee-adjust `raw` and truncate it to `lot_decimals` places
    pub fn trade_quantity(&self, raw: Decimal, lot_decimals: u32) -> TradeQuantity {
        let fee_adjusted = raw * (Decimal::ONE - self.fee_percentage / Decimal::ONE_HUNDRED);
        let rounded_to_lot_size =
            fee_adjusted.round_dp_with_strategy(lot_decimals, RoundingStrategy::ToZero);

        TradeQuantity {
            raw,
            fee_adjusted,
            rounded_to_lot_size,
        }
    }

    /// Parse balances for both assets of the pair
    ///
    /// A balance that fails to parse is logged and treated as unavailable.
    pub fn holdings(&self, balances: &[RawBalance]) -> Holdings {
        Holdings {
            quote: self.holding_for(
                balances,
                &self.quote_asset,
                self.min_quote_balance,
                self.quote_lot_decimals,
            ),
            base: self.holding_for(
                balances,
                &self.base_asset,
                self.min_base_balance,
                self.base_lot_decimals,
            ),
        }
    }

    /// Asset to act on and its quantity, or `None` if nothing is tradable
    pub fn inspect(
        &self,
        balances: &[RawBalance],
        slots: OpenSlots,
    ) -> Option<(AssetRole, Holding)> {
        self.holdings(balances)
            .select(slots)
            .map(|(role, holding)| (role, holding.clone()))
    }

    fn holding_for(
        &self,
        balances: &[RawBalance],
        asset: &str,
        threshold: Decimal,
        lot_decimals: u32,
    ) -> Option<Holding> {
        let raw = balances.iter().find(|b| b.asset == asset)?;

        let free: Decimal = match raw.free.trim().parse() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    asset = %asset,
                    value = %raw.free,
                    "Unparseable balance, treating as unavailable: {}",
                    e
                );
                return None;
            }
        };

        if free <= threshold {
            return None;
        }

        let quantity = self.trade_quantity(free, lot_decimals);
        if quantity.rounded_to_lot_size <= Decimal::ZERO {
            return None;
        }

        Some(Holding {
            balance: Balance {
                asset: asset.to_string(),
                free,
            },
            quantity,
        })
    }
}
