// src/domain/models.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A traded pair, e.g. BTC_USDT. Pairs are built from configuration,
/// never from a process-wide lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolPair {
    pub base: String,
    pub quote: String,
}

impl SymbolPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_string(),
            quote: quote.to_string(),
        }
    }
}

impl fmt::Display for SymbolPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.quote)
    }
}

/// Decimal digit counts used to scale wire strings into integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionSettings {
    pub price: u32,
    pub volume: u32,
    pub timestamp: u32,
}

impl PrecisionSettings {
    pub fn new(price: u32, volume: u32, timestamp: u32) -> Self {
        Self {
            price,
            volume,
            timestamp,
        }
    }
}

/// Per-exchange trading parameters consumed by the matcher and the
/// order calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeParams {
    pub exchange: String,

    /// Taker fee as a fraction (e.g. 0.001 for 0.1%)
    pub fee: f64,

    /// Expected price slippage in quote units
    pub slippage: f64,

    /// Daily exchange traded volume in billion USD, used as a liquidity
    /// weight when allocating the price margin between legs
    pub daily_volume: f64,
}

impl ExchangeParams {
    pub fn new(exchange: &str, fee: f64, slippage: f64, daily_volume: f64) -> Self {
        Self {
            exchange: exchange.to_string(),
            fee,
            slippage,
            daily_volume,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn from_str(status: &str) -> Option<Self> {
        match status {
            "NEW" => Some(OrderStatus::New),
            "PARTIALLY_FILLED" => Some(OrderStatus::PartiallyFilled),
            "FILLED" => Some(OrderStatus::Filled),
            "CANCELED" => Some(OrderStatus::Canceled),
            "PENDING_CANCEL" => Some(OrderStatus::PendingCancel),
            "REJECTED" => Some(OrderStatus::Rejected),
            "EXPIRED" => Some(OrderStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Canceled => write!(f, "CANCELED"),
            OrderStatus::PendingCancel => write!(f, "PENDING_CANCEL"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// An order as tracked by the account manager. Created when a trade
/// request is sent or when an unseen open order is first observed.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub client_id: Option<String>,
    pub symbol: SymbolPair,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Decimal,
    pub executed_quantity: Decimal,
    pub total_cost: Decimal,
    pub status: OrderStatus,
}

impl Order {
    pub fn builder() -> OrderBuilder {
        OrderBuilder::default()
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} qty={} price={} executed={} status={}",
            self.id, self.symbol, self.side, self.order_type, self.quantity, self.price,
            self.executed_quantity, self.status
        )
    }
}

#[derive(Debug, Default)]
pub struct OrderBuilder {
    id: Option<String>,
    client_id: Option<String>,
    symbol: Option<SymbolPair>,
    side: Option<Side>,
    order_type: Option<OrderType>,
    quantity: Option<Decimal>,
    price: Option<Decimal>,
    status: Option<OrderStatus>,
}

impl OrderBuilder {
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn client_id(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    pub fn symbol(mut self, symbol: SymbolPair) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = Some(order_type);
        self
    }

    pub fn quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn build(self) -> Order {
        Order {
            id: self.id.unwrap_or_default(),
            client_id: self.client_id,
            symbol: self.symbol.unwrap_or_else(|| SymbolPair::new("", "")),
            side: self.side.unwrap_or(Side::Buy),
            order_type: self.order_type.unwrap_or(OrderType::Limit),
            quantity: self.quantity.unwrap_or(Decimal::ZERO),
            price: self.price.unwrap_or(Decimal::ZERO),
            executed_quantity: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            status: self.status.unwrap_or(OrderStatus::New),
        }
    }
}

/// Best bid/ask snapshot for one symbol on one exchange.
#[derive(Debug, Clone)]
pub struct Ticker {
    pub exchange: String,
    pub symbol: SymbolPair,
    pub bid: f64,
    pub bid_volume: Option<f64>,
    pub ask: f64,
    pub ask_volume: Option<f64>,
    /// Event time reported by the exchange, microseconds since epoch
    pub source_ts: Option<i64>,
    /// Local arrival time, microseconds since epoch
    pub arrived_ts: i64,
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} bid={} ({:?}) ask={} ({:?})",
            self.exchange, self.symbol, self.bid, self.bid_volume, self.ask, self.ask_volume
        )
    }
}

/// A single public trade reported by an exchange.
#[derive(Debug, Clone)]
pub struct TradeTicker {
    pub exchange: String,
    pub symbol: SymbolPair,
    pub trade_id: String,
    pub price: f64,
    pub quantity: f64,
    pub event_ts: i64,
    pub trade_ts: i64,
    pub arrived_ts: i64,
    /// Is the buyer the market maker?
    pub buyer_is_maker: bool,
}
