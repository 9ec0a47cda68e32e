// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Trading error: {0}")]
    Trading(#[from] TradingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error: {message} (raw response: {raw_response})")]
    Api {
        message: String,
        raw_response: String,
    },

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Order error: {0}")]
    Order(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Request error: {0}")]
    Request(String),
}

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Data parse error: {0}")]
    Parse(String),

    #[error("Unexpected decimal precision for \"{value}\", expected {expected} fractional digits")]
    PrecisionMismatch { value: String, expected: u32 },
}

#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Missing book volume for exchange: {0}")]
    MissingBookVolume(String),

    #[error("Missing exchange parameters for: {0}")]
    MissingExchangeParams(String),

    #[error("Invalid strategy options: {0}")]
    InvalidOptions(String),

    #[error("Numeric conversion error: {0}")]
    Numeric(String),
}

// Result type aliases for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type ExchangeResult<T> = Result<T, ExchangeError>;
pub type MarketDataResult<T> = Result<T, MarketDataError>;
pub type TradingResult<T> = Result<T, TradingError>;
