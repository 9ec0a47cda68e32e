// src/market_data/order_book.rs
use crate::domain::errors::{MarketDataError, MarketDataResult};
use crate::domain::models::{PrecisionSettings, SymbolPair, Ticker};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Parse a decimal string into an integer scaled by 10^precision.
///
/// The fractional digit count must match the configured precision exactly;
/// a mismatch means the message does not belong to this symbol's feed.
pub fn parse_scaled(value: &str, precision: u32) -> MarketDataResult<u64> {
    let (int_part, frac_part) = match value.split_once('.') {
        Some((i, f)) => (i, f),
        None => (value, ""),
    };
    if frac_part.len() as u32 != precision {
        return Err(MarketDataError::PrecisionMismatch {
            value: value.to_string(),
            expected: precision,
        });
    }
    format!("{}{}", int_part, frac_part)
        .parse::<u64>()
        .map_err(|e| MarketDataError::Parse(format!("invalid decimal \"{}\": {}", value, e)))
}

/// Parse a volume string, validating its fractional digit count.
pub fn parse_volume(value: &str, precision: u32) -> MarketDataResult<Decimal> {
    let frac_len = value.split_once('.').map(|(_, f)| f.len()).unwrap_or(0) as u32;
    if frac_len != precision {
        return Err(MarketDataError::PrecisionMismatch {
            value: value.to_string(),
            expected: precision,
        });
    }
    Decimal::from_str(value)
        .map_err(|e| MarketDataError::Parse(format!("invalid volume \"{}\": {}", value, e)))
}

pub fn scaled_to_f64(scaled: u64, precision: u32) -> f64 {
    scaled as f64 / 10u64.pow(precision) as f64
}

/// One price slot on a side of the book. Equality is price-only, which is
/// what upsert matching relies on.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: u64,
    pub volume: Decimal,
    pub timestamp: u64,
}

impl PriceLevel {
    pub fn new(price: u64, volume: Decimal, timestamp: u64) -> Self {
        Self {
            price,
            volume,
            timestamp,
        }
    }
}

impl PartialEq for PriceLevel {
    fn eq(&self, other: &Self) -> bool {
        self.price == other.price
    }
}

impl Eq for PriceLevel {}

/// A raw price level as delivered by a market-data transport. Strings are
/// parsed against the symbol's precision settings when applied.
#[derive(Debug, Clone)]
pub struct RawLevel {
    pub price: String,
    pub volume: String,
    pub timestamp: Option<String>,
}

impl RawLevel {
    pub fn new(price: &str, volume: &str) -> Self {
        Self {
            price: price.to_string(),
            volume: volume.to_string(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(price: &str, volume: &str, timestamp: &str) -> Self {
        Self {
            price: price.to_string(),
            volume: volume.to_string(),
            timestamp: Some(timestamp.to_string()),
        }
    }
}

/// A batch of level changes for one book. Zero volume marks a deletion.
#[derive(Debug, Clone, Default)]
pub struct BookUpdate {
    pub bids: Vec<RawLevel>,
    pub asks: Vec<RawLevel>,
}

/// Depth-bounded sorted ladder of price levels for one (exchange, symbol).
///
/// Bids are kept ascending and asks descending, so the best level of either
/// side sits at the tail. Not thread-safe by itself; callers serialize
/// access per (exchange, symbol).
#[derive(Debug, Clone)]
pub struct OrderBook {
    exchange: String,
    symbol: SymbolPair,
    depth: usize,
    precision: PrecisionSettings,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

impl OrderBook {
    pub fn new(
        exchange: &str,
        symbol: SymbolPair,
        depth: usize,
        precision: PrecisionSettings,
    ) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol,
            depth,
            precision,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Upsert a bid level: replace the level at the same price keeping its
    /// position, otherwise insert in price order. Evicts the level farthest
    /// from best when the side grows beyond the configured depth.
    pub fn upsert_bid(&mut self, level: PriceLevel) {
        let mut insert_at = self.bids.len();
        for (i, current) in self.bids.iter_mut().enumerate() {
            if current.price == level.price {
                *current = level;
                return;
            }
            if level.price < current.price {
                insert_at = i;
                break;
            }
        }
        self.bids.insert(insert_at, level);
        if self.bids.len() > self.depth {
            self.bids.remove(0);
        }
    }

    /// Upsert an ask level; same contract as [`upsert_bid`](Self::upsert_bid).
    pub fn upsert_ask(&mut self, level: PriceLevel) {
        let mut insert_at = self.asks.len();
        for (i, current) in self.asks.iter_mut().enumerate() {
            if current.price == level.price {
                *current = level;
                return;
            }
            if level.price > current.price {
                insert_at = i;
                break;
            }
        }
        self.asks.insert(insert_at, level);
        if self.asks.len() > self.depth {
            self.asks.remove(0);
        }
    }

    /// Remove the bid at `price`. Absence is not an error.
    pub fn delete_bid(&mut self, price: u64) {
        if let Some(pos) = self.bids.iter().rposition(|l| l.price == price) {
            self.bids.remove(pos);
        }
    }

    /// Remove the ask at `price`. Absence is not an error.
    pub fn delete_ask(&mut self, price: u64) {
        if let Some(pos) = self.asks.iter().rposition(|l| l.price == price) {
            self.asks.remove(pos);
        }
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.last()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.last()
    }

    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn symbol(&self) -> &SymbolPair {
        &self.symbol
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn precision(&self) -> &PrecisionSettings {
        &self.precision
    }

    pub fn latest_update_timestamp(&self) -> u64 {
        self.bids
            .iter()
            .chain(self.asks.iter())
            .map(|l| l.timestamp)
            .max()
            .unwrap_or(0)
    }

    /// Apply a batch of raw level changes. A level with zero volume is a
    /// deletion; anything else is an upsert. The whole batch is parsed
    /// before the book is touched, so a malformed message is rejected
    /// without leaving a half-applied update behind.
    pub fn apply(&mut self, update: &BookUpdate) -> MarketDataResult<()> {
        let bids: Vec<LevelChange> = update
            .bids
            .iter()
            .map(|raw| self.parse_level(raw))
            .collect::<MarketDataResult<_>>()?;
        let asks: Vec<LevelChange> = update
            .asks
            .iter()
            .map(|raw| self.parse_level(raw))
            .collect::<MarketDataResult<_>>()?;
        for change in bids {
            match change {
                LevelChange::Delete(price) => self.delete_bid(price),
                LevelChange::Upsert(level) => self.upsert_bid(level),
            }
        }
        for change in asks {
            match change {
                LevelChange::Delete(price) => self.delete_ask(price),
                LevelChange::Upsert(level) => self.upsert_ask(level),
            }
        }
        Ok(())
    }

    /// Best-of-book snapshot, or None until both sides are populated.
    pub fn ticker(&self) -> Option<Ticker> {
        let best_bid = self.bids.last()?;
        let best_ask = self.asks.last()?;
        let source_ts = best_bid.timestamp.min(best_ask.timestamp);
        Some(Ticker {
            exchange: self.exchange.clone(),
            symbol: self.symbol.clone(),
            bid: scaled_to_f64(best_bid.price, self.precision.price),
            bid_volume: best_bid.volume.to_f64(),
            ask: scaled_to_f64(best_ask.price, self.precision.price),
            ask_volume: best_ask.volume.to_f64(),
            source_ts: if source_ts > 0 {
                Some(source_ts as i64)
            } else {
                None
            },
            arrived_ts: chrono::Utc::now().timestamp_micros(),
        })
    }

    fn parse_level(&self, raw: &RawLevel) -> MarketDataResult<LevelChange> {
        let price = parse_scaled(&raw.price, self.precision.price)?;
        let volume = parse_volume(&raw.volume, self.precision.volume)?;
        if volume.is_zero() {
            return Ok(LevelChange::Delete(price));
        }
        let timestamp = match &raw.timestamp {
            Some(ts) => parse_scaled(ts, self.precision.timestamp)?,
            None => 0,
        };
        Ok(LevelChange::Upsert(PriceLevel::new(price, volume, timestamp)))
    }
}

enum LevelChange {
    Delete(u64),
    Upsert(PriceLevel),
}

impl fmt::Display for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "ASKS:")?;
        for lvl in &self.asks {
            writeln!(f, "  {} @ {}", lvl.volume, lvl.price)?;
        }
        writeln!(f, "BIDS:")?;
        for lvl in &self.bids {
            writeln!(f, "  {} @ {}", lvl.volume, lvl.price)?;
        }
        Ok(())
    }
}
