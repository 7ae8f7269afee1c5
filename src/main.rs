use anyhow::Context;
use chrono::Utc;
use spotbot::api::BinanceClient;
use spotbot::config::{Credentials, Settings};
use spotbot::execution::{Scheduler, SystemClock, Trader};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    tracing::info!("🚀 spotbot starting");

    let credentials = Credentials::from_env().context("Cannot start without API credentials")?;
    let settings = Settings::from_env().context("Invalid configuration")?;

    let client = match &settings.base_url {
        Some(url) => BinanceClient::with_base_url(credentials, url)?,
        None => BinanceClient::new(credentials, settings.testnet)?,
    };

    let mut trader = Trader::from_settings(client, &settings)?;
    log_configuration(&settings, trader.evaluator_name());

    match trader.warm_up(Utc::now()).await {
        Ok(samples) if samples > 0 => tracing::info!("✅ Loaded {} historical prices", samples),
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to warm up price history ({}), collecting live", e),
    }

    let mut scheduler = Scheduler::new(
        trader,
        SystemClock,
        Duration::from_secs(settings.poll_interval_secs),
    );

    tracing::info!("\nPress Ctrl+C to stop...\n");
    let ticks = scheduler.run(shutdown_signal()).await;

    tracing::info!("👋 spotbot stopped after {} ticks", ticks);
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spotbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn log_configuration(settings: &Settings, strategy: &str) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!(
        "  Pair: {} ({}/{})",
        settings.symbol,
        settings.base_asset,
        settings.quote_asset
    );
    tracing::info!("  Poll interval: {}s", settings.poll_interval_secs);
    tracing::info!("  Price source: {:?}", settings.price_source);
    tracing::info!("  Strategy: {}", strategy);
    tracing::info!("  Stop loss: {}%", settings.stop_loss_fraction * rust_decimal::Decimal::ONE_HUNDRED);
    tracing::info!("  Fee allowance: {}%", settings.fee_percentage);
    if settings.testnet {
        tracing::info!("  Using Binance testnet");
    }
}
