// src/exchange/client.rs
use crate::domain::errors::ExchangeResult;
use crate::domain::models::{Order, OrderStatus, OrderType, Side, SymbolPair, TradeTicker, Ticker};
use crate::exchange::balance::AccountBalance;
use crate::market_data::order_book::OrderBook;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Trade-execution interface implemented by concrete exchange adapters.
///
/// `get_account_balance` returns totals only; locked amounts are
/// reconstructed by the account manager from its tracked orders.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn exchange(&self) -> &str;

    /// Place a market order
    async fn market_order(
        &self,
        symbol: &SymbolPair,
        side: Side,
        quantity: Decimal,
    ) -> ExchangeResult<Order>;

    /// Place a limit order
    async fn limit_order(
        &self,
        symbol: &SymbolPair,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<Order>;

    /// Get current account balance totals
    async fn get_account_balance(&self) -> ExchangeResult<AccountBalance>;

    /// Get currently open orders
    async fn get_open_orders(&self) -> ExchangeResult<Vec<Order>>;

    /// Cancel every open order; status updates arrive via the user-data
    /// stream
    async fn cancel_all_orders(&self) -> ExchangeResult<()>;
}

/// Sink for parsed market-data events. Transports call these as events
/// arrive; default implementations just log.
#[async_trait]
pub trait MarketDataSink: Send + Sync {
    async fn on_ticker(&self, ticker: Ticker) {
        log::info!("MarketDataSink::on_ticker, ticker={}", ticker);
    }

    async fn on_order_book_update(&self, order_book: &OrderBook) {
        log::info!(
            "MarketDataSink::on_order_book_update, {} {}",
            order_book.exchange(),
            order_book.symbol()
        );
    }

    async fn on_trade_ticker(&self, trade: TradeTicker) {
        log::info!(
            "MarketDataSink::on_trade_ticker, {} {} price={}",
            trade.exchange,
            trade.symbol,
            trade.price
        );
    }

    async fn on_connection_open(&self, name: &str) {
        log::info!("MarketDataSink::on_connection_open {}", name);
    }

    async fn on_connection_close(&self, name: &str) {
        log::info!("MarketDataSink::on_connection_close {}", name);
    }
}

/// Sink for parsed user-data (account) events.
#[async_trait]
pub trait UserDataSink: Send + Sync {
    async fn on_order_update(&self, order: Order);

    /// Fresh total amounts for the listed assets
    async fn on_account_balance_update(&self, totals: HashMap<String, Decimal>);

    async fn on_connection_open(&self, name: &str) {
        log::info!("UserDataSink::on_connection_open {}", name);
    }

    async fn on_connection_close(&self, name: &str) {
        log::info!("UserDataSink::on_connection_close {}", name);
    }
}

/// An exchange client that acknowledges every order without talking to any
/// venue. Serves a configured starting balance; used for dry runs and tests.
pub struct DummyClient {
    exchange: String,
    starting_balance: HashMap<String, Decimal>,
    next_order_id: AtomicU64,
}

impl DummyClient {
    pub fn new(exchange: &str, starting_balance: HashMap<String, Decimal>) -> Self {
        Self {
            exchange: exchange.to_string(),
            starting_balance,
            next_order_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> String {
        let id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.exchange, id)
    }
}

#[async_trait]
impl ExchangeClient for DummyClient {
    fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn market_order(
        &self,
        symbol: &SymbolPair,
        side: Side,
        quantity: Decimal,
    ) -> ExchangeResult<Order> {
        Ok(Order::builder()
            .id(&self.next_id())
            .symbol(symbol.clone())
            .side(side)
            .order_type(OrderType::Market)
            .quantity(quantity)
            .status(OrderStatus::New)
            .build())
    }

    async fn limit_order(
        &self,
        symbol: &SymbolPair,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<Order> {
        Ok(Order::builder()
            .id(&self.next_id())
            .symbol(symbol.clone())
            .side(side)
            .order_type(OrderType::Limit)
            .quantity(quantity)
            .price(price)
            .status(OrderStatus::New)
            .build())
    }

    async fn get_account_balance(&self) -> ExchangeResult<AccountBalance> {
        Ok(AccountBalance::with_totals(self.starting_balance.clone()))
    }

    async fn get_open_orders(&self) -> ExchangeResult<Vec<Order>> {
        Ok(Vec::new())
    }

    async fn cancel_all_orders(&self) -> ExchangeResult<()> {
        Ok(())
    }
}
