// src/trading/strategy.rs
use crate::domain::errors::{TradingError, TradingResult};
use crate::domain::models::{ExchangeParams, Order, Side, SymbolPair, TradeTicker, Ticker};
use crate::exchange::account::AccountManager;
use crate::exchange::client::{ExchangeClient, MarketDataSink};
use crate::market_data::order_book::OrderBook;
use crate::trading::matcher::{ArbitrageMatch, ArbitrageMatcher};
use crate::trading::sizing::{ArbitrageOrderCalculator, ArbitrageOrders};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{timeout, Duration};

pub struct ArbitrageStrategyOptions {
    pub exchange_params: HashMap<String, ExchangeParams>,
    /// Safety buffer subtracted from both legs' profit estimate
    pub profit_margin: f64,
    /// Minimum order quantity per base asset
    pub min_amounts: HashMap<String, Decimal>,
    /// Reject tickers older than this
    pub max_ticker_age_us: i64,
    /// Reject tickers whose source-to-arrival delay exceeds this
    pub max_ticker_delay_us: i64,
    /// Minimum interval between trades
    pub min_trade_interval_us: i64,
    pub leg_timeout: Duration,
}

impl Default for ArbitrageStrategyOptions {
    fn default() -> Self {
        Self {
            exchange_params: HashMap::new(),
            profit_margin: 0.0,
            min_amounts: HashMap::new(),
            max_ticker_age_us: 2_000_000,
            max_ticker_delay_us: 1_000_000,
            min_trade_interval_us: 10_000_000,
            leg_timeout: Duration::from_secs(5),
        }
    }
}

/// Turns synchronized market and account state into two concurrently
/// dispatched limit orders when a cross-exchange spread is worth taking.
///
/// The per-symbol ticker map and the match evaluation share one critical
/// section, so a match is always computed against a mutually consistent set
/// of tickers.
pub struct ArbitrageStrategy<C: ExchangeClient> {
    opts: ArbitrageStrategyOptions,
    matcher: ArbitrageMatcher,
    calculator: ArbitrageOrderCalculator,
    account_managers: HashMap<String, Arc<AccountManager<C>>>,
    tickers: Mutex<HashMap<SymbolPair, BTreeMap<String, Ticker>>>,
    /// Only one thread sends orders at any given point; an evaluation that
    /// finds it taken skips the opportunity
    dispatch_lock: tokio::sync::Mutex<()>,
    last_trade_us: AtomicI64,
}

impl<C: ExchangeClient> ArbitrageStrategy<C> {
    pub fn new(
        opts: ArbitrageStrategyOptions,
        account_managers: HashMap<String, Arc<AccountManager<C>>>,
    ) -> TradingResult<Self> {
        if opts.exchange_params.len() < 2 {
            return Err(TradingError::InvalidOptions(
                "parameters for at least 2 exchanges required".to_string(),
            ));
        }
        if opts.min_amounts.values().any(|amount| *amount < Decimal::ZERO) {
            return Err(TradingError::InvalidOptions(
                "minimum order amounts must not be negative".to_string(),
            ));
        }
        let matcher = ArbitrageMatcher::new(opts.exchange_params.clone(), opts.profit_margin);
        let calculator = ArbitrageOrderCalculator::new(opts.exchange_params.clone());
        Ok(Self {
            opts,
            matcher,
            calculator,
            account_managers,
            tickers: Mutex::new(HashMap::new()),
            dispatch_lock: tokio::sync::Mutex::new(()),
            last_trade_us: AtomicI64::new(0),
        })
    }

    pub async fn initialize(&self) {
        for manager in self.account_managers.values() {
            if let Err(e) = manager.initialize().await {
                log::error!(
                    "Failed initializing account state for {}: {}",
                    manager.exchange(),
                    e
                );
            }
        }
    }

    pub async fn evaluate_ticker(&self, ticker: Ticker) {
        let symbol = ticker.symbol.clone();
        let match_opt = {
            let mut tickers = self.tickers.lock().unwrap();
            let per_symbol = tickers.entry(symbol.clone()).or_default();
            per_symbol.insert(ticker.exchange.clone(), ticker);
            self.matcher.find_match(per_symbol)
        };
        let Some(arb_match) = match_opt else {
            return;
        };
        if !self.passes_guards(&arb_match) {
            return;
        }

        let Some(bid_manager) = self.account_managers.get(&arb_match.best_bid.exchange) else {
            return;
        };
        let Some(ask_manager) = self.account_managers.get(&arb_match.best_ask.exchange) else {
            return;
        };
        if !bid_manager.is_account_synced() || !ask_manager.is_account_synced() {
            log::warn!("Accounts not synced, skipping match for {}", symbol);
            return;
        }
        if self.has_open_orders_for(&symbol).await {
            log::warn!("Open orders exist for {}, skipping match", symbol);
            return;
        }

        let base_balance = bid_manager
            .free_balance(&symbol.base)
            .await
            .to_f64()
            .unwrap_or(0.0);
        let quote_balance = ask_manager
            .free_balance(&symbol.quote)
            .await
            .to_f64()
            .unwrap_or(0.0);
        let orders = match self.calculator.calculate(
            &arb_match.best_bid,
            &arb_match.best_ask,
            base_balance,
            quote_balance,
        ) {
            Ok(orders) => orders,
            Err(e) => {
                log::warn!("Skipping match for {}: {}", symbol, e);
                return;
            }
        };
        let min_amount = self
            .opts
            .min_amounts
            .get(&symbol.base)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if orders.buy_order.quantity < min_amount {
            log::warn!(
                "Order amount {} below minimum {} for {}",
                orders.buy_order.quantity,
                min_amount,
                symbol.base
            );
            return;
        }

        let Ok(_dispatch) = self.dispatch_lock.try_lock() else {
            return;
        };
        self.last_trade_us
            .store(chrono::Utc::now().timestamp_micros(), Ordering::SeqCst);
        log::info!("Arbitrage match for {}: {}", symbol, arb_match);
        self.send_arbitrage_orders(bid_manager, ask_manager, &orders)
            .await;
    }

    /// Staleness and rate-limiter checks; all are plain timestamp
    /// comparisons.
    fn passes_guards(&self, arb_match: &ArbitrageMatch) -> bool {
        let now_us = chrono::Utc::now().timestamp_micros();
        for ticker in [&arb_match.best_bid, &arb_match.best_ask] {
            let age = now_us - ticker.arrived_ts;
            if age > self.opts.max_ticker_age_us {
                log::debug!(
                    "Ticker {} {} is too old ({} us)",
                    ticker.exchange,
                    ticker.symbol,
                    age
                );
                return false;
            }
            if let Some(source_ts) = ticker.source_ts {
                let delay = ticker.arrived_ts - source_ts;
                if delay > self.opts.max_ticker_delay_us {
                    log::warn!(
                        "Ticker {} {} arrived with too big delay ({} us)",
                        ticker.exchange,
                        ticker.symbol,
                        delay
                    );
                    return false;
                }
            }
        }
        let since_last_trade = now_us - self.last_trade_us.load(Ordering::SeqCst);
        if since_last_trade < self.opts.min_trade_interval_us {
            log::debug!(
                "Last trade was {} us ago, waiting out the trade interval",
                since_last_trade
            );
            return false;
        }
        true
    }

    /// Both legs are dispatched concurrently with a per-leg timeout, and
    /// both results are awaited before the outcome is logged.
    async fn send_arbitrage_orders(
        &self,
        bid_manager: &Arc<AccountManager<C>>,
        ask_manager: &Arc<AccountManager<C>>,
        orders: &ArbitrageOrders,
    ) {
        let sell = &orders.sell_order;
        let buy = &orders.buy_order;
        let sell_leg = timeout(
            self.opts.leg_timeout,
            bid_manager.limit_order(&sell.symbol, Side::Sell, sell.quantity, sell.price),
        );
        let buy_leg = timeout(
            self.opts.leg_timeout,
            ask_manager.limit_order(&buy.symbol, Side::Buy, buy.quantity, buy.price),
        );
        let (sell_result, buy_result) = tokio::join!(sell_leg, buy_leg);
        log_leg_outcome(bid_manager.exchange(), sell_result);
        log_leg_outcome(ask_manager.exchange(), buy_result);
    }

    async fn has_open_orders_for(&self, symbol: &SymbolPair) -> bool {
        for manager in self.account_managers.values() {
            if manager.has_open_orders_for(symbol).await {
                return true;
            }
        }
        false
    }
}

fn log_leg_outcome(
    exchange: &str,
    result: Result<crate::domain::errors::ExchangeResult<Order>, tokio::time::error::Elapsed>,
) {
    match result {
        Ok(Ok(order)) => log::info!("{}: arbitrage leg placed: {}", exchange, order),
        Ok(Err(e)) => log::warn!("Error sending order for {}: {}", exchange, e),
        Err(_) => log::warn!("Order placement for {} timed out", exchange),
    }
}

#[async_trait]
impl<C: ExchangeClient> MarketDataSink for ArbitrageStrategy<C> {
    async fn on_ticker(&self, ticker: Ticker) {
        self.evaluate_ticker(ticker).await;
    }

    async fn on_order_book_update(&self, order_book: &OrderBook) {
        if let Some(ticker) = order_book.ticker() {
            self.evaluate_ticker(ticker).await;
        }
    }

    async fn on_trade_ticker(&self, trade: TradeTicker) {
        log::debug!(
            "Trade on {} {}: {} @ {}",
            trade.exchange,
            trade.symbol,
            trade.quantity,
            trade.price
        );
    }

    async fn on_connection_open(&self, name: &str) {
        log::info!("Market data connection open: {}", name);
    }

    async fn on_connection_close(&self, name: &str) {
        log::info!("Market data connection closed: {}", name);
        let mut tickers = self.tickers.lock().unwrap();
        for per_symbol in tickers.values_mut() {
            per_symbol.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::client::DummyClient;
    use rust_decimal_macros::dec;

    fn ada_usdt() -> SymbolPair {
        SymbolPair::new("ADA", "USDT")
    }

    fn params() -> HashMap<String, ExchangeParams> {
        let mut params = HashMap::new();
        params.insert(
            "binance".to_string(),
            ExchangeParams::new("binance", 0.00075, 0.0, 10.0),
        );
        params.insert(
            "kraken".to_string(),
            ExchangeParams::new("kraken", 0.0026, 0.0, 1.0),
        );
        params
    }

    fn manager(exchange: &str) -> Arc<AccountManager<DummyClient>> {
        let mut balances = HashMap::new();
        balances.insert("ADA".to_string(), dec!(100000));
        balances.insert("USDT".to_string(), dec!(1000000));
        Arc::new(AccountManager::new(
            Arc::new(DummyClient::new(exchange, balances)),
            vec![ada_usdt()],
        ))
    }

    fn strategy() -> ArbitrageStrategy<DummyClient> {
        let mut managers = HashMap::new();
        managers.insert("binance".to_string(), manager("binance"));
        managers.insert("kraken".to_string(), manager("kraken"));
        let opts = ArbitrageStrategyOptions {
            exchange_params: params(),
            ..Default::default()
        };
        ArbitrageStrategy::new(opts, managers).unwrap()
    }

    fn fresh_ticker(exchange: &str, bid: f64, ask: f64) -> Ticker {
        Ticker {
            exchange: exchange.to_string(),
            symbol: ada_usdt(),
            bid,
            bid_volume: Some(30000.0),
            ask,
            ask_volume: Some(20000.0),
            source_ts: None,
            arrived_ts: chrono::Utc::now().timestamp_micros(),
        }
    }

    #[tokio::test]
    async fn profitable_spread_places_both_legs() {
        let strategy = strategy();
        strategy.initialize().await;

        strategy
            .evaluate_ticker(fresh_ticker("kraken", 1.7600, 1.7674))
            .await;
        strategy
            .evaluate_ticker(fresh_ticker("binance", 1.7762, 1.7770))
            .await;

        assert!(
            strategy.account_managers["binance"]
                .has_open_orders_for(&ada_usdt())
                .await
        );
        assert!(
            strategy.account_managers["kraken"]
                .has_open_orders_for(&ada_usdt())
                .await
        );
    }

    #[tokio::test]
    async fn open_orders_block_further_matches() {
        let strategy = strategy();
        strategy.initialize().await;
        // Allow back-to-back trades so only the open-order guard applies
        let strategy = ArbitrageStrategy {
            opts: ArbitrageStrategyOptions {
                exchange_params: params(),
                min_trade_interval_us: 0,
                ..Default::default()
            },
            ..strategy
        };

        strategy
            .evaluate_ticker(fresh_ticker("kraken", 1.7600, 1.7674))
            .await;
        strategy
            .evaluate_ticker(fresh_ticker("binance", 1.7762, 1.7770))
            .await;
        let balance_after_first = strategy.account_managers["kraken"]
            .cached_balance()
            .await
            .locked("USDT");
        assert!(balance_after_first > Decimal::ZERO);

        // A second profitable ticker while legs are open must not add locks
        strategy
            .evaluate_ticker(fresh_ticker("binance", 1.7790, 1.7800))
            .await;
        let balance_after_second = strategy.account_managers["kraken"]
            .cached_balance()
            .await
            .locked("USDT");
        assert_eq!(balance_after_first, balance_after_second);
    }

    #[tokio::test]
    async fn stale_ticker_is_skipped() {
        let strategy = strategy();
        strategy.initialize().await;

        let mut old = fresh_ticker("kraken", 1.7600, 1.7674);
        old.arrived_ts -= 10_000_000;
        strategy.evaluate_ticker(old).await;
        strategy
            .evaluate_ticker(fresh_ticker("binance", 1.7762, 1.7770))
            .await;

        assert!(
            !strategy.account_managers["binance"]
                .has_open_orders_for(&ada_usdt())
                .await
        );
    }

    #[tokio::test]
    async fn delayed_ticker_is_skipped() {
        let strategy = strategy();
        strategy.initialize().await;

        let mut delayed = fresh_ticker("kraken", 1.7600, 1.7674);
        delayed.source_ts = Some(delayed.arrived_ts - 5_000_000);
        strategy.evaluate_ticker(delayed).await;
        strategy
            .evaluate_ticker(fresh_ticker("binance", 1.7762, 1.7770))
            .await;

        assert!(
            !strategy.account_managers["kraken"]
                .has_open_orders_for(&ada_usdt())
                .await
        );
    }

    #[tokio::test]
    async fn connection_close_drops_exchange_tickers() {
        let strategy = strategy();
        strategy.initialize().await;

        strategy
            .evaluate_ticker(fresh_ticker("kraken", 1.7600, 1.7674))
            .await;
        strategy.on_connection_close("kraken").await;
        // With kraken gone the binance ticker alone cannot match
        strategy
            .evaluate_ticker(fresh_ticker("binance", 1.7762, 1.7770))
            .await;
        assert!(
            !strategy.account_managers["binance"]
                .has_open_orders_for(&ada_usdt())
                .await
        );
    }

    #[test]
    fn fewer_than_two_exchanges_is_invalid() {
        let mut managers = HashMap::new();
        managers.insert("binance".to_string(), manager("binance"));
        let mut single = HashMap::new();
        single.insert(
            "binance".to_string(),
            ExchangeParams::new("binance", 0.001, 0.0, 10.0),
        );
        let opts = ArbitrageStrategyOptions {
            exchange_params: single,
            ..Default::default()
        };
        assert!(matches!(
            ArbitrageStrategy::new(opts, managers),
            Err(TradingError::InvalidOptions(_))
        ));
    }
}
