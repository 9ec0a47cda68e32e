// src/market_data/kraken_book.rs
use crate::domain::errors::MarketDataResult;
use crate::market_data::order_book::{BookUpdate, OrderBook, PriceLevel};
use crate::market_data::SyncOutcome;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Number of levels per side covered by the exchange checksum.
const CHECKSUM_DEPTH: usize = 10;

/// An incremental book update, optionally carrying the CRC-32 the exchange
/// computed over its own top-of-book after this update.
#[derive(Debug, Clone)]
pub struct KrakenBookUpdate {
    pub update: BookUpdate,
    pub checksum: Option<u32>,
}

/// Maintains an order book from self-describing snapshot/update messages,
/// Kraken style.
///
/// Every message after subscription is applied directly; integrity is
/// verified by recomputing the exchange checksum over the ten best levels
/// of each side. A mismatch means diffs were lost: the book is cleared and
/// [`SyncOutcome::ResubscribeRequired`] tells the transport to re-issue the
/// subscription.
#[derive(Debug)]
pub struct KrakenBookSynchronizer {
    book: OrderBook,
}

impl KrakenBookSynchronizer {
    pub fn new(book: OrderBook) -> Self {
        Self { book }
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn on_snapshot(&mut self, snapshot: &BookUpdate) -> MarketDataResult<SyncOutcome> {
        log::debug!(
            "{} {}: received order book snapshot",
            self.book.exchange(),
            self.book.symbol()
        );
        self.book.clear();
        self.book.apply(snapshot)?;
        Ok(SyncOutcome::Synced)
    }

    pub fn on_update(&mut self, update: &KrakenBookUpdate) -> MarketDataResult<SyncOutcome> {
        self.book.apply(&update.update)?;
        if let Some(expected) = update.checksum {
            let computed = self.compute_checksum();
            if computed != expected {
                log::warn!(
                    "{} {}: order book checksum mismatch (exchange {}, computed {}), resubscribing",
                    self.book.exchange(),
                    self.book.symbol(),
                    expected,
                    computed
                );
                self.book.clear();
                return Ok(SyncOutcome::ResubscribeRequired);
            }
        }
        Ok(SyncOutcome::Applied)
    }

    /// CRC-32 over the concatenated scaled (price, volume) integers of the
    /// ten best asks (ascending from best) followed by the ten best bids
    /// (descending from best).
    fn compute_checksum(&self) -> u32 {
        let volume_precision = self.book.precision().volume;
        let mut input = String::new();
        for lvl in self.book.asks().iter().rev().take(CHECKSUM_DEPTH) {
            push_level(&mut input, lvl, volume_precision);
        }
        for lvl in self.book.bids().iter().rev().take(CHECKSUM_DEPTH) {
            push_level(&mut input, lvl, volume_precision);
        }
        crc32fast::hash(input.as_bytes())
    }
}

fn push_level(input: &mut String, level: &PriceLevel, volume_precision: u32) {
    let scaled_volume = (level.volume * Decimal::from(10u64.pow(volume_precision)))
        .trunc()
        .to_u64()
        .unwrap_or(0);
    input.push_str(&level.price.to_string());
    input.push_str(&scaled_volume.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{PrecisionSettings, SymbolPair};
    use crate::market_data::order_book::RawLevel;

    fn test_sync() -> KrakenBookSynchronizer {
        KrakenBookSynchronizer::new(OrderBook::new(
            "kraken",
            SymbolPair::new("ADA", "USDT"),
            10,
            PrecisionSettings::new(1, 1, 6),
        ))
    }

    fn snapshot() -> BookUpdate {
        BookUpdate {
            bids: vec![
                RawLevel::with_timestamp("34.0", "2.0", "1612269825.123456"),
                RawLevel::with_timestamp("33.9", "1.5", "1612269825.123457"),
            ],
            asks: vec![
                RawLevel::with_timestamp("35.0", "0.5", "1612269825.123458"),
                RawLevel::with_timestamp("35.1", "1.0", "1612269825.123459"),
            ],
        }
    }

    #[test]
    fn snapshot_rebuilds_book_from_scratch() {
        let mut sync = test_sync();
        sync.on_snapshot(&BookUpdate {
            bids: vec![RawLevel::with_timestamp("30.0", "9.0", "1612269825.000001")],
            asks: vec![],
        })
        .unwrap();
        sync.on_snapshot(&snapshot()).unwrap();
        // The stale 30.0 bid from before the resubscription is gone
        let bid_prices: Vec<u64> = sync.book().bids().iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![339, 340]);
        assert_eq!(sync.book().best_ask().unwrap().price, 350);
    }

    #[test]
    fn matching_checksum_keeps_book() {
        let mut sync = test_sync();
        sync.on_snapshot(&snapshot()).unwrap();
        // Asks from best ascending, then bids from best descending, each
        // level as "<scaled price><scaled volume>"
        let input = concat!("3505", "35110", "34020", "33915");
        let update = KrakenBookUpdate {
            update: BookUpdate::default(),
            checksum: Some(crc32fast::hash(input.as_bytes())),
        };
        assert_eq!(sync.on_update(&update).unwrap(), SyncOutcome::Applied);
        assert_eq!(sync.book().bids().len(), 2);
    }

    #[test]
    fn checksum_mismatch_clears_book_and_resubscribes() {
        let mut sync = test_sync();
        sync.on_snapshot(&snapshot()).unwrap();
        let update = KrakenBookUpdate {
            update: BookUpdate {
                bids: vec![RawLevel::with_timestamp("34.1", "1.0", "1612269825.123460")],
                asks: vec![],
            },
            checksum: Some(1),
        };
        assert_eq!(
            sync.on_update(&update).unwrap(),
            SyncOutcome::ResubscribeRequired
        );
        assert!(sync.book().bids().is_empty());
        assert!(sync.book().asks().is_empty());
    }

    #[test]
    fn zero_volume_delta_deletes_level() {
        let mut sync = test_sync();
        sync.on_snapshot(&snapshot()).unwrap();
        let update = KrakenBookUpdate {
            update: BookUpdate {
                bids: vec![RawLevel::with_timestamp("33.9", "0.0", "1612269825.123460")],
                asks: vec![],
            },
            checksum: None,
        };
        assert_eq!(sync.on_update(&update).unwrap(), SyncOutcome::Applied);
        let bid_prices: Vec<u64> = sync.book().bids().iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![340]);
    }
}
