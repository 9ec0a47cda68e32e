// src/main.rs
use arb_trade::config::Config;
use arb_trade::domain::errors::AppResult;
use arb_trade::exchange::account::AccountManager;
use arb_trade::exchange::client::DummyClient;
use arb_trade::market_data::watchdog::MarketDataWatchdog;
use arb_trade::trading::strategy::ArbitrageStrategy;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tokio::sync::mpsc;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting arb_trade v{}", env!("CARGO_PKG_VERSION"));
    let exchange_names: Vec<&str> = config.exchanges.iter().map(|e| e.name.as_str()).collect();
    log::info!("Configured exchanges: {}", exchange_names.join(", "));

    // One account manager per exchange. Real exchange adapters plug in
    // behind the same ExchangeClient trait; the dry-run client acknowledges
    // orders without touching any venue.
    let symbols = config.symbol_pairs();
    let mut account_managers = HashMap::new();
    let mut refreshers = Vec::new();
    for exchange in &config.exchanges {
        let client = Arc::new(DummyClient::new(
            &exchange.name,
            config.account.paper_balances.clone(),
        ));
        let manager = Arc::new(AccountManager::new(client, symbols.clone()));
        refreshers.push(
            manager.spawn_refresher(Duration::from_secs(config.account.balance_refresh_secs)),
        );
        account_managers.insert(exchange.name.clone(), manager);
    }

    log::info!("Initializing strategy...");
    let strategy = Arc::new(ArbitrageStrategy::new(
        config.strategy_options(),
        account_managers,
    )?);
    strategy.initialize().await;

    // Liveness watchdog; stale feeds are reported so the transport layer
    // can reconnect them
    let watchdog = Arc::new(MarketDataWatchdog::new(Duration::from_secs(
        config.account.watchdog_stale_secs,
    )));
    let (stale_tx, mut stale_rx) = mpsc::channel(16);
    let watchdog_task = watchdog
        .clone()
        .spawn(
            Duration::from_secs(config.account.watchdog_interval_secs),
            stale_tx,
        );
    tokio::spawn(async move {
        while let Some((exchange, symbol)) = stale_rx.recv().await {
            log::warn!("Feed {} {} went quiet, reconnect required", exchange, symbol);
        }
    });

    // Wait for shutdown signal
    log::info!("Bot is running. Press Ctrl+C to stop.");
    ctrl_c().await.expect("Failed to listen for control-c event");

    // Shutdown
    log::info!("Shutting down...");
    watchdog_task.abort();
    for refresher in refreshers {
        refresher.abort();
    }

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}
