// src/exchange/account.rs
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{Order, OrderStatus, Side, SymbolPair};
use crate::exchange::balance::AccountBalance;
use crate::exchange::client::{ExchangeClient, UserDataSink};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

#[derive(Default)]
struct AccountState {
    balance: AccountBalance,
    /// Orders this process placed
    our_orders: HashMap<String, Order>,
    /// Orders observed open at startup or placed by another actor on the
    /// same account
    external_orders: HashMap<String, Order>,
}

/// Reconciles locally-placed orders against asynchronous exchange
/// acknowledgements and keeps locked/free balances correct while doing so.
///
/// All order and balance state lives behind a single mutex. The lock is
/// deliberately held across "send order request -> register order": a
/// user-data push for a freshly placed order can overtake the HTTP
/// response, and handling it before the order is registered would classify
/// it as external and lock its balance a second time.
pub struct AccountManager<C: ExchangeClient> {
    client: Arc<C>,
    symbols: HashSet<SymbolPair>,
    state: Mutex<AccountState>,
    is_synced: AtomicBool,
}

impl<C: ExchangeClient> AccountManager<C> {
    pub fn new(client: Arc<C>, symbols: Vec<SymbolPair>) -> Self {
        Self {
            client,
            symbols: symbols.into_iter().collect(),
            state: Mutex::new(AccountState::default()),
            is_synced: AtomicBool::new(false),
        }
    }

    pub fn exchange(&self) -> &str {
        self.client.exchange()
    }

    /// Fetch the current balance and open-order list, classifying every
    /// order we did not place as external.
    pub async fn initialize(&self) -> ExchangeResult<()> {
        let mut state = self.state.lock().await;
        self.is_synced.store(false, Ordering::SeqCst);
        let balance = self.client.get_account_balance().await?;
        state.balance = balance;
        let open_orders = self.client.get_open_orders().await?;
        state.external_orders.clear();
        for order in open_orders {
            if !self.symbols.contains(&order.symbol) {
                log::warn!(
                    "{}: open order {} for unconfigured symbol {}",
                    self.exchange(),
                    order.id,
                    order.symbol
                );
                continue;
            }
            handle_external_order(&mut state, &order);
        }
        log::debug!(
            "{}: account balance after initialization: {}",
            self.exchange(),
            state.balance
        );
        self.is_synced.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn market_order(
        &self,
        symbol: &SymbolPair,
        side: Side,
        quantity: Decimal,
    ) -> ExchangeResult<Order> {
        self.place_order(symbol, side, quantity, None).await
    }

    pub async fn limit_order(
        &self,
        symbol: &SymbolPair,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<Order> {
        self.place_order(symbol, side, quantity, Some(price)).await
    }

    async fn place_order(
        &self,
        symbol: &SymbolPair,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> ExchangeResult<Order> {
        if !self.symbols.contains(symbol) {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        }
        // Held across the request on purpose; see the struct docs.
        let mut state = self.state.lock().await;
        self.is_synced.store(false, Ordering::SeqCst);
        let result = match price {
            Some(p) => self.client.limit_order(symbol, side, quantity, p).await,
            None => self.client.market_order(symbol, side, quantity).await,
        };
        let placed = match result {
            Ok(mut order) => {
                if let Some(p) = price {
                    // Not every venue echoes the price in the placement
                    // response
                    order.price = p;
                }
                state.our_orders.insert(order.id.clone(), order.clone());
                add_locked(&mut state.balance, &order);
                log::debug!(
                    "{}: balance after placing order: {}",
                    self.exchange(),
                    state.balance
                );
                Ok(order)
            }
            Err(e) => Err(e),
        };
        self.is_synced.store(true, Ordering::SeqCst);
        placed
    }

    /// Apply an order status update from the user-data stream. Updates for
    /// unconfigured symbols are rejected with a typed error so the caller
    /// can skip the message.
    pub async fn handle_order_update(&self, update: Order) -> ExchangeResult<()> {
        if !self.symbols.contains(&update.symbol) {
            return Err(ExchangeError::UnknownSymbol(update.symbol.to_string()));
        }
        log::debug!("{}: order update: {}", self.exchange(), update);
        let mut state = self.state.lock().await;
        if state.our_orders.contains_key(&update.id) {
            update_our_order(&mut state, update);
        } else {
            log::info!(
                "{}: update for order which did not originate here",
                self.exchange()
            );
            handle_external_order(&mut state, &update);
        }
        log::debug!(
            "{}: balance after order update: {}",
            self.exchange(),
            state.balance
        );
        Ok(())
    }

    /// Re-fetch the authoritative balance and replay the locked
    /// contributions of every tracked order on top of it, healing any drift
    /// from missed events. The fetch happens before the state lock is
    /// taken.
    pub async fn refresh_balance(&self) -> ExchangeResult<()> {
        self.is_synced.store(false, Ordering::SeqCst);
        let balance = self.client.get_account_balance().await?;
        let mut state = self.state.lock().await;
        state.balance = balance;
        let tracked: Vec<Order> = state
            .external_orders
            .values()
            .chain(state.our_orders.values())
            .cloned()
            .collect();
        for order in &tracked {
            add_locked(&mut state.balance, order);
        }
        log::debug!(
            "{}: account balance after refresh: {}",
            self.exchange(),
            state.balance
        );
        self.is_synced.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Periodically re-sync the balance from the exchange.
    pub fn spawn_refresher(self: &Arc<Self>, refresh_interval: Duration) -> JoinHandle<()>
    where
        C: 'static,
    {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(refresh_interval);
            // The immediate first tick duplicates initialize()
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = manager.refresh_balance().await {
                    log::warn!(
                        "{}: failed refreshing account balance: {}",
                        manager.exchange(),
                        e
                    );
                }
            }
        })
    }

    pub async fn cancel_all_orders(&self) -> ExchangeResult<()> {
        // Status updates for every affected order arrive via the user-data
        // stream
        self.client.cancel_all_orders().await
    }

    pub async fn free_balance(&self, asset: &str) -> Decimal {
        let state = self.state.lock().await;
        state.balance.free(asset)
    }

    pub async fn total_balance(&self, asset: &str) -> Decimal {
        let state = self.state.lock().await;
        state.balance.total(asset)
    }

    pub async fn cached_balance(&self) -> AccountBalance {
        let state = self.state.lock().await;
        state.balance.clone()
    }

    pub async fn has_open_orders(&self) -> bool {
        let state = self.state.lock().await;
        !state.our_orders.is_empty()
    }

    pub async fn has_open_orders_for(&self, symbol: &SymbolPair) -> bool {
        let state = self.state.lock().await;
        state.our_orders.values().any(|o| &o.symbol == symbol)
    }

    /// False while a balance fetch or an order placement is outstanding.
    pub fn is_account_synced(&self) -> bool {
        self.is_synced.load(Ordering::SeqCst)
    }
}

fn update_our_order(state: &mut AccountState, update: Order) {
    match update.status {
        OrderStatus::New => {
            // The acknowledgement carries the complete order; replace the
            // placement-response copy
            state.our_orders.insert(update.id.clone(), update);
        }
        OrderStatus::PartiallyFilled => {
            if let Some(order) = state.our_orders.get_mut(&update.id) {
                order.status = update.status;
                order.executed_quantity = update.executed_quantity;
            }
        }
        OrderStatus::Filled => {
            if let Some(mut order) = state.our_orders.remove(&update.id) {
                order.status = OrderStatus::Filled;
                order.executed_quantity = order.quantity;
                order.total_cost = order.quantity * order.price;
                settle_closed_order(&mut state.balance, &order);
            }
        }
        OrderStatus::Canceled | OrderStatus::Expired => {
            if let Some(mut order) = state.our_orders.remove(&update.id) {
                order.status = update.status;
                sub_locked(&mut state.balance, &order);
                log::info!("Order closed without fill: {}", order);
            }
        }
        OrderStatus::PendingCancel => {
            if let Some(order) = state.our_orders.get_mut(&update.id) {
                order.status = update.status;
                log::info!("Order pending cancel: {}", order);
            }
        }
        OrderStatus::Rejected => {
            // No balance was ever locked for a rejected order
            log::error!("Unexpected order status for {}", update);
        }
    }
}

fn handle_external_order(state: &mut AccountState, order: &Order) {
    let was_seen = state.external_orders.contains_key(&order.id);
    match order.status {
        OrderStatus::New => {
            if was_seen {
                log::warn!("External order already tracked: {}", order.id);
                return;
            }
            state.external_orders.insert(order.id.clone(), order.clone());
            add_locked(&mut state.balance, order);
        }
        OrderStatus::PendingCancel | OrderStatus::PartiallyFilled => {}
        OrderStatus::Filled => {
            if let Some(mut tracked) = state.external_orders.remove(&order.id) {
                tracked.status = OrderStatus::Filled;
                tracked.executed_quantity = tracked.quantity;
                tracked.total_cost = tracked.quantity * tracked.price;
                settle_closed_order(&mut state.balance, &tracked);
            } else {
                log::warn!("External order not tracked: {}", order.id);
            }
        }
        OrderStatus::Canceled | OrderStatus::Expired => {
            if let Some(mut tracked) = state.external_orders.remove(&order.id) {
                tracked.status = order.status;
                sub_locked(&mut state.balance, &tracked);
            } else {
                log::warn!("External order not tracked: {}", order.id);
            }
        }
        OrderStatus::Rejected => {
            log::error!("Unexpected status for external order {}", order.id);
        }
    }
}

/// BUY reserves `quantity x price` of the quote asset, SELL reserves the
/// base quantity.
fn add_locked(balance: &mut AccountBalance, order: &Order) {
    match order.side {
        Side::Buy => balance.add_locked(&order.symbol.quote, order.quantity * order.price),
        Side::Sell => balance.add_locked(&order.symbol.base, order.quantity),
    }
}

fn sub_locked(balance: &mut AccountBalance, order: &Order) {
    match order.side {
        Side::Buy => balance.sub_locked(&order.symbol.quote, order.quantity * order.price),
        Side::Sell => balance.sub_locked(&order.symbol.base, order.quantity),
    }
}

/// Release the lock and move executed amounts between the pair's assets.
fn settle_closed_order(balance: &mut AccountBalance, order: &Order) {
    log::debug!("Settling closed order: {}", order);
    sub_locked(balance, order);
    let executed_quantity = order.executed_quantity;
    let executed_cost = order.total_cost;
    match order.side {
        Side::Buy => {
            balance.add_total(&order.symbol.base, executed_quantity);
            balance.add_total(&order.symbol.quote, -executed_cost);
        }
        Side::Sell => {
            balance.add_total(&order.symbol.base, -executed_quantity);
            balance.add_total(&order.symbol.quote, executed_cost);
        }
    }
}

#[async_trait]
impl<C: ExchangeClient> UserDataSink for AccountManager<C> {
    async fn on_order_update(&self, order: Order) {
        if let Err(e) = self.handle_order_update(order).await {
            log::warn!("{}: skipping order update: {}", self.exchange(), e);
        }
    }

    async fn on_account_balance_update(&self, totals: HashMap<String, Decimal>) {
        log::info!("{}: account balance update", self.exchange());
        let mut state = self.state.lock().await;
        state.balance.update_totals(&totals);
    }

    async fn on_connection_open(&self, name: &str) {
        log::info!("AccountManager::on_connection_open {}", name);
        if let Err(e) = self.initialize().await {
            log::error!("{}: failed initializing account state: {}", name, e);
        }
    }

    async fn on_connection_close(&self, name: &str) {
        log::info!("AccountManager::on_connection_close {}", name);
    }
}
