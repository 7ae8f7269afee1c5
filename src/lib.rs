// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use api::Exchange;
pub use error::{ConfigError, ExchangeError, TickError};
pub use models::*;
pub use strategy::SignalEvaluator;
