// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use crate::domain::models::{ExchangeParams, PrecisionSettings, SymbolPair};
use crate::trading::strategy::ArbitrageStrategyOptions;
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tokio::time::Duration;

/// Arbitrage bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Parameters per connected exchange
    pub exchanges: Vec<ExchangeConfig>,

    /// Traded symbols with their precision settings
    pub symbols: Vec<SymbolConfig>,

    /// Strategy configuration
    pub strategy: StrategyConfig,

    /// Account management configuration
    pub account: AccountConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Per-exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Exchange name (e.g., "binance")
    pub name: String,

    /// Taker fee as a fraction
    pub fee: f64,

    /// Expected slippage in quote units
    pub slippage: f64,

    /// Daily traded volume in billion USD
    pub daily_volume: f64,
}

/// Per-symbol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Base asset (e.g., "ADA")
    pub base: String,

    /// Quote asset (e.g., "USDT")
    pub quote: String,

    /// Fractional digits of wire price strings
    pub price_precision: u32,

    /// Fractional digits of wire volume strings
    pub volume_precision: u32,

    /// Fractional digits of wire timestamp strings
    pub timestamp_precision: u32,

    /// Minimum order quantity in base units
    pub min_amount: Decimal,
}

impl SymbolConfig {
    pub fn pair(&self) -> SymbolPair {
        SymbolPair::new(&self.base, &self.quote)
    }

    pub fn precision(&self) -> PrecisionSettings {
        PrecisionSettings::new(
            self.price_precision,
            self.volume_precision,
            self.timestamp_precision,
        )
    }
}

/// Strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Safety buffer subtracted from both legs' profit estimate
    pub profit_margin: f64,

    /// Minimum interval between trades in milliseconds
    pub min_trade_interval_ms: u64,

    /// Reject tickers older than this, milliseconds
    pub max_ticker_age_ms: u64,

    /// Reject tickers delayed at the source longer than this, milliseconds
    pub max_ticker_delay_ms: u64,

    /// Per-leg order placement timeout in milliseconds
    pub leg_timeout_ms: u64,

    /// Maximum price levels retained per book side
    pub book_depth: usize,
}

/// Account management configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Interval between authoritative balance re-fetches, seconds
    pub balance_refresh_secs: u64,

    /// Market-data liveness check interval, seconds
    pub watchdog_interval_secs: u64,

    /// A feed with no data for this long is reported stale, seconds
    pub watchdog_stale_secs: u64,

    /// Starting balances served by the dry-run exchange client
    pub paper_balances: HashMap<String, Decimal>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let mut config = Config::default();

        if let Ok(symbols) = env::var("TRADING_SYMBOLS") {
            config.symbols = symbols
                .split(',')
                .filter_map(|name| {
                    let (base, quote) = name.trim().split_once('_')?;
                    Some(SymbolConfig {
                        base: base.to_string(),
                        quote: quote.to_string(),
                        price_precision: 4,
                        volume_precision: 8,
                        timestamp_precision: 3,
                        min_amount: Decimal::ZERO,
                    })
                })
                .collect();
        }

        config.strategy = StrategyConfig {
            profit_margin: env::var("PROFIT_MARGIN")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0.0),
            min_trade_interval_ms: env::var("MIN_TRADE_INTERVAL_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10_000),
            max_ticker_age_ms: env::var("MAX_TICKER_AGE_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2_000),
            max_ticker_delay_ms: env::var("MAX_TICKER_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1_000),
            leg_timeout_ms: env::var("LEG_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5_000),
            book_depth: env::var("BOOK_DEPTH")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1_000),
        };

        config.account.balance_refresh_secs = env::var("BALANCE_REFRESH_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .unwrap_or(300);

        config.logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env::var("LOG_TO_FILE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| AppError::Config(format!("Failed to open config file: {}", e)))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)
            .map_err(|e| AppError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn exchange_params(&self) -> HashMap<String, ExchangeParams> {
        self.exchanges
            .iter()
            .map(|e| {
                (
                    e.name.clone(),
                    ExchangeParams::new(&e.name, e.fee, e.slippage, e.daily_volume),
                )
            })
            .collect()
    }

    pub fn symbol_pairs(&self) -> Vec<SymbolPair> {
        self.symbols.iter().map(|s| s.pair()).collect()
    }

    pub fn precision_for(&self, pair: &SymbolPair) -> Option<PrecisionSettings> {
        self.symbols
            .iter()
            .find(|s| s.base == pair.base && s.quote == pair.quote)
            .map(|s| s.precision())
    }

    pub fn min_amounts(&self) -> HashMap<String, Decimal> {
        self.symbols
            .iter()
            .map(|s| (s.base.clone(), s.min_amount))
            .collect()
    }

    pub fn strategy_options(&self) -> ArbitrageStrategyOptions {
        ArbitrageStrategyOptions {
            exchange_params: self.exchange_params(),
            profit_margin: self.strategy.profit_margin,
            min_amounts: self.min_amounts(),
            max_ticker_age_us: self.strategy.max_ticker_age_ms as i64 * 1000,
            max_ticker_delay_us: self.strategy.max_ticker_delay_ms as i64 * 1000,
            min_trade_interval_us: self.strategy.min_trade_interval_ms as i64 * 1000,
            leg_timeout: Duration::from_millis(self.strategy.leg_timeout_ms),
        }
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path)
                    .map_err(|e| AppError::Config(format!("Failed to create log file: {}", e)))?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        // Initialize the logger
        builder.init();

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut paper_balances = HashMap::new();
        paper_balances.insert("ADA".to_string(), Decimal::new(100_000, 0));
        paper_balances.insert("USDT".to_string(), Decimal::new(1_000_000, 0));
        Self {
            exchanges: vec![
                ExchangeConfig {
                    name: "binance".to_string(),
                    fee: 0.00075,
                    slippage: 0.0,
                    daily_volume: 10.0,
                },
                ExchangeConfig {
                    name: "kraken".to_string(),
                    fee: 0.0026,
                    slippage: 0.0,
                    daily_volume: 1.0,
                },
            ],
            symbols: vec![SymbolConfig {
                base: "ADA".to_string(),
                quote: "USDT".to_string(),
                price_precision: 4,
                volume_precision: 8,
                timestamp_precision: 3,
                min_amount: Decimal::new(50, 0),
            }],
            strategy: StrategyConfig {
                profit_margin: 0.0,
                min_trade_interval_ms: 10_000,
                max_ticker_age_ms: 2_000,
                max_ticker_delay_ms: 1_000,
                leg_timeout_ms: 5_000,
                book_depth: 1_000,
            },
            account: AccountConfig {
                balance_refresh_secs: 300,
                watchdog_interval_secs: 30,
                watchdog_stale_secs: 30,
                paper_balances,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_exposes_two_exchanges() {
        let config = Config::default();
        let params = config.exchange_params();
        assert_eq!(params.len(), 2);
        assert!(params.contains_key("binance"));
        assert!(params.contains_key("kraken"));
    }

    #[test]
    fn strategy_options_convert_milliseconds_to_micros() {
        let config = Config::default();
        let opts = config.strategy_options();
        assert_eq!(opts.max_ticker_age_us, 2_000_000);
        assert_eq!(opts.min_trade_interval_us, 10_000_000);
    }

    #[test]
    fn precision_lookup_by_pair() {
        let config = Config::default();
        let pair = SymbolPair::new("ADA", "USDT");
        let precision = config.precision_for(&pair).unwrap();
        assert_eq!(precision.price, 4);
        assert!(config.precision_for(&SymbolPair::new("XYZ", "EUR")).is_none());
    }
}
