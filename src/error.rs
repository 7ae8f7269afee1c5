use std::time::Duration;
use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found in environment")]
    MissingCredential(&'static str),

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors reported by the exchange collaborator
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Exchange rejected request ({code}): {msg}")]
    Rejected { code: i64, msg: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to sign request: {0}")]
    Signing(String),
}

// Binance: "Account has insufficient balance for requested action."
const INSUFFICIENT_BALANCE_CODE: i64 = -2010;

impl ExchangeError {
    /// Whether retrying the same request on a later tick can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::Network(_) | ExchangeError::Timeout(_) => true,
            ExchangeError::Http { status, .. } => *status == 429 || *status >= 500,
            ExchangeError::Rejected { code, .. } => *code == INSUFFICIENT_BALANCE_CODE,
            ExchangeError::Decode(_) | ExchangeError::Signing(_) => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ExchangeError::Decode(e.to_string())
        } else {
            ExchangeError::Network(e.to_string())
        }
    }
}

/// Errors that abort a single tick. The loop continues at the next boundary.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("Failed to fetch {what}: {source}")]
    DataFetch {
        what: &'static str,
        #[source]
        source: ExchangeError,
    },

    #[error("Malformed {field} value {value:?}")]
    Parse { field: &'static str, value: String },

    #[error("No closed candles returned")]
    NoPriceData,
}
