use crate::error::ConfigError;
use rust_decimal::Decimal;
use serde::Deserialize;

const API_KEY_VAR: &str = "BINANCE_API_KEY";
const API_SECRET_VAR: &str = "BINANCE_SECRET_KEY";

/// Exchange API credentials
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the environment. Missing either one is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingCredential(API_KEY_VAR))?;
        let api_secret = lookup(API_SECRET_VAR)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingCredential(API_SECRET_VAR))?;

        Ok(Self {
            api_key,
            api_secret,
        })
    }
}

/// Where the per-tick price comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Close of the most recent candle
    LastClose,
    /// Mean close over `average_window` candles
    CandleAverage,
    /// Best bid from the order book
    BestBid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MaCrossover,
    LastDigit,
}

/// Tunables for the trading loop, loaded from `BOT_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub poll_interval_secs: u64,
    pub candle_interval: String,
    pub price_source: PriceSource,
    pub average_window: usize,
    pub stop_loss_fraction: Decimal,
    pub fee_percentage: Decimal,
    pub min_quote_balance: Decimal,
    pub min_base_balance: Decimal,
    pub base_lot_decimals: u32,
    pub quote_lot_decimals: u32,
    pub strategy: StrategyKind,
    pub short_ma_period: usize,
    pub long_ma_period: usize,
    pub buy_digits: String,
    pub sell_digits: String,
    pub call_timeout_secs: u64,
    pub testnet: bool,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(config::Environment::with_prefix("BOT"))
    }

    /// Load settings from an arbitrary environment source (used by tests)
    pub fn load(env: config::Environment) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .set_default("symbol", "ETHUSDT")?
            .set_default("base_asset", "ETH")?
            .set_default("quote_asset", "USDT")?
            .set_default("poll_interval_secs", 60)?
            .set_default("candle_interval", "1m")?
            .set_default("price_source", "last_close")?
            .set_default("average_window", 1)?
            .set_default("stop_loss_fraction", "0.05")?
            .set_default("fee_percentage", "0.1")?
            .set_default("min_quote_balance", "1.0")?
            .set_default("min_base_balance", "0.01")?
            .set_default("base_lot_decimals", 4)?
            .set_default("quote_lot_decimals", 2)?
            .set_default("strategy", "ma_crossover")?
            .set_default("short_ma_period", 5)?
            .set_default("long_ma_period", 20)?
            .set_default("buy_digits", "1")?
            .set_default("sell_digits", "8")?
            .set_default("call_timeout_secs", 10)?
            .set_default("testnet", false)?
            .add_source(env)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs", "must be positive"));
        }
        if self.stop_loss_fraction <= Decimal::ZERO || self.stop_loss_fraction >= Decimal::ONE {
            return Err(invalid("stop_loss_fraction", "must be between 0 and 1"));
        }
        if self.fee_percentage < Decimal::ZERO || self.fee_percentage >= Decimal::ONE_HUNDRED {
            return Err(invalid("fee_percentage", "must be between 0 and 100"));
        }
        if self.average_window == 0 {
            return Err(invalid("average_window", "must be at least 1"));
        }
        if self.short_ma_period == 0 || self.short_ma_period >= self.long_ma_period {
            return Err(invalid(
                "short_ma_period",
                "must be positive and less than long_ma_period",
            ));
        }
        self.buy_digit_set()?;
        self.sell_digit_set()?;
        Ok(())
    }

    pub fn buy_digit_set(&self) -> Result<Vec<u8>, ConfigError> {
        parse_digits("buy_digits", &self.buy_digits)
    }

    pub fn sell_digit_set(&self) -> Result<Vec<u8>, ConfigError> {
        parse_digits("sell_digits", &self.sell_digits)
    }

    /// Number of candles to request per tick
    pub fn candles_per_tick(&self) -> usize {
        match self.price_source {
            PriceSource::CandleAverage => self.average_window,
            PriceSource::LastClose | PriceSource::BestBid => 1,
        }
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        name,
        reason: reason.to_string(),
    }
}

/// Parse a comma separated digit list like "1,3"
fn parse_digits(name: &'static str, raw: &str) -> Result<Vec<u8>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u8>() {
            Ok(d) if d <= 9 => Ok(d),
            _ => Err(invalid(name, &format!("{:?} is not a digit", s))),
        })
        .collect()
}
