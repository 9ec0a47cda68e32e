// src/market_data/binance_book.rs
use crate::domain::errors::MarketDataResult;
use crate::market_data::order_book::{BookUpdate, OrderBook};
use crate::market_data::SyncOutcome;

/// An incremental depth update with its update-id range.
#[derive(Debug, Clone)]
pub struct DepthDiff {
    pub first_update_id: u64,
    pub final_update_id: u64,
    pub update: BookUpdate,
}

/// A full depth snapshot tagged with the last update id it covers.
#[derive(Debug, Clone)]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub update: BookUpdate,
}

#[derive(Debug)]
enum SyncState {
    /// Snapshot request in flight; diffs are buffered in arrival order.
    AwaitingSnapshot { buffer: Vec<DepthDiff> },
    Synced { previous_update_id: u64 },
}

/// Builds and repairs an order book from a depth snapshot plus an ordered
/// stream of diffs, Binance style.
///
/// The transport requests a snapshot asynchronously on stream open and keeps
/// feeding diffs here; everything received before the snapshot is buffered
/// and replayed once it lands. After catch-up each diff must continue the
/// update-id sequence exactly; a gap clears the book and reports
/// [`SyncOutcome::ResyncRequired`] so the caller fetches a new snapshot.
#[derive(Debug)]
pub struct BinanceBookSynchronizer {
    book: OrderBook,
    state: SyncState,
}

impl BinanceBookSynchronizer {
    pub fn new(book: OrderBook) -> Self {
        Self {
            book,
            state: SyncState::AwaitingSnapshot { buffer: Vec::new() },
        }
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn is_synced(&self) -> bool {
        matches!(self.state, SyncState::Synced { .. })
    }

    pub fn on_diff(&mut self, diff: DepthDiff) -> MarketDataResult<SyncOutcome> {
        match &mut self.state {
            SyncState::AwaitingSnapshot { buffer } => {
                log::debug!(
                    "{} {}: buffering depth diff [{}, {}]",
                    self.book.exchange(),
                    self.book.symbol(),
                    diff.first_update_id,
                    diff.final_update_id
                );
                buffer.push(diff);
                Ok(SyncOutcome::Buffered)
            }
            SyncState::Synced { previous_update_id } => {
                if diff.first_update_id > *previous_update_id + 1 {
                    log::warn!(
                        "{} {}: missing depth update (applied up to {}, received [{}, {}]), requesting snapshot",
                        self.book.exchange(),
                        self.book.symbol(),
                        previous_update_id,
                        diff.first_update_id,
                        diff.final_update_id
                    );
                    self.book.clear();
                    self.state = SyncState::AwaitingSnapshot { buffer: Vec::new() };
                    return Ok(SyncOutcome::ResyncRequired);
                }
                self.book.apply(&diff.update)?;
                *previous_update_id = diff.final_update_id;
                Ok(SyncOutcome::Applied)
            }
        }
    }

    pub fn on_snapshot(&mut self, snapshot: DepthSnapshot) -> MarketDataResult<SyncOutcome> {
        let buffer = match &mut self.state {
            SyncState::AwaitingSnapshot { buffer } => std::mem::take(buffer),
            // A snapshot for an already-synced book rebuilds it in place
            SyncState::Synced { .. } => Vec::new(),
        };
        self.book.apply(&snapshot.update)?;
        let mut previous_update_id = snapshot.last_update_id;

        // Find the first buffered diff whose range covers last_update_id + 1
        // and replay from there; older diffs are covered by the snapshot.
        let start = buffer.iter().position(|d| {
            d.first_update_id <= snapshot.last_update_id + 1
                && d.final_update_id >= snapshot.last_update_id + 1
        });
        match start {
            Some(i) => {
                for diff in &buffer[i..] {
                    if diff.final_update_id <= snapshot.last_update_id {
                        continue;
                    }
                    self.book.apply(&diff.update)?;
                    previous_update_id = diff.final_update_id;
                }
            }
            None => {
                if !buffer.is_empty() {
                    log::info!(
                        "{} {}: no buffered depth diffs continue the snapshot",
                        self.book.exchange(),
                        self.book.symbol()
                    );
                }
            }
        }
        self.state = SyncState::Synced {
            previous_update_id,
        };
        Ok(SyncOutcome::Synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{PrecisionSettings, SymbolPair};
    use crate::market_data::order_book::RawLevel;

    fn test_book() -> OrderBook {
        OrderBook::new(
            "binance",
            SymbolPair::new("BTC", "USDT"),
            100,
            PrecisionSettings::new(2, 1, 0),
        )
    }

    fn diff(first: u64, last: u64, bids: Vec<RawLevel>, asks: Vec<RawLevel>) -> DepthDiff {
        DepthDiff {
            first_update_id: first,
            final_update_id: last,
            update: BookUpdate { bids, asks },
        }
    }

    #[test]
    fn buffered_diffs_replay_after_snapshot() {
        let mut sync = BinanceBookSynchronizer::new(test_book());
        // Entirely covered by the snapshot
        assert_eq!(
            sync.on_diff(diff(95, 98, vec![RawLevel::new("99.00", "9.0")], vec![]))
                .unwrap(),
            SyncOutcome::Buffered
        );
        // Straddles the snapshot boundary
        assert_eq!(
            sync.on_diff(diff(99, 101, vec![RawLevel::new("100.10", "2.0")], vec![]))
                .unwrap(),
            SyncOutcome::Buffered
        );
        assert_eq!(
            sync.on_diff(diff(102, 105, vec![], vec![RawLevel::new("100.50", "1.5")]))
                .unwrap(),
            SyncOutcome::Buffered
        );
        assert!(!sync.is_synced());

        let snapshot = DepthSnapshot {
            last_update_id: 100,
            update: BookUpdate {
                bids: vec![RawLevel::new("100.00", "1.0")],
                asks: vec![RawLevel::new("100.60", "3.0")],
            },
        };
        assert_eq!(sync.on_snapshot(snapshot).unwrap(), SyncOutcome::Synced);
        assert!(sync.is_synced());

        // The diff ending at 98 was discarded; 99.00 never made it in
        let bid_prices: Vec<u64> = sync.book().bids().iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![10000, 10010]);
        let ask_prices: Vec<u64> = sync.book().asks().iter().map(|l| l.price).collect();
        assert_eq!(ask_prices, vec![10060, 10050]);

        // Live diff continues the sequence
        assert_eq!(
            sync.on_diff(diff(106, 107, vec![RawLevel::new("100.20", "4.0")], vec![]))
                .unwrap(),
            SyncOutcome::Applied
        );
        assert_eq!(sync.book().best_bid().unwrap().price, 10020);
    }

    #[test]
    fn sequence_gap_clears_book_and_requests_resync() {
        let mut sync = BinanceBookSynchronizer::new(test_book());
        let snapshot = DepthSnapshot {
            last_update_id: 10,
            update: BookUpdate {
                bids: vec![RawLevel::new("100.00", "1.0")],
                asks: vec![RawLevel::new("100.50", "1.0")],
            },
        };
        sync.on_snapshot(snapshot).unwrap();
        assert_eq!(
            sync.on_diff(diff(11, 12, vec![RawLevel::new("100.10", "1.0")], vec![]))
                .unwrap(),
            SyncOutcome::Applied
        );

        // 13 never arrives
        assert_eq!(
            sync.on_diff(diff(14, 15, vec![RawLevel::new("100.30", "1.0")], vec![]))
                .unwrap(),
            SyncOutcome::ResyncRequired
        );
        assert!(!sync.is_synced());
        assert!(sync.book().bids().is_empty());
        assert!(sync.book().asks().is_empty());

        // Diffs buffer again until the fresh snapshot lands
        assert_eq!(
            sync.on_diff(diff(16, 17, vec![RawLevel::new("100.40", "1.0")], vec![]))
                .unwrap(),
            SyncOutcome::Buffered
        );
    }

    #[test]
    fn reapplying_snapshot_is_idempotent() {
        let mut sync = BinanceBookSynchronizer::new(test_book());
        let snapshot = DepthSnapshot {
            last_update_id: 42,
            update: BookUpdate {
                bids: vec![
                    RawLevel::new("100.00", "1.0"),
                    RawLevel::new("99.90", "2.0"),
                ],
                asks: vec![
                    RawLevel::new("100.50", "1.5"),
                    RawLevel::new("100.60", "2.5"),
                ],
            },
        };
        sync.on_snapshot(snapshot.clone()).unwrap();
        let bids_before: Vec<(u64, String)> = sync
            .book()
            .bids()
            .iter()
            .map(|l| (l.price, l.volume.to_string()))
            .collect();
        let asks_before: Vec<(u64, String)> = sync
            .book()
            .asks()
            .iter()
            .map(|l| (l.price, l.volume.to_string()))
            .collect();

        sync.on_snapshot(snapshot).unwrap();
        let bids_after: Vec<(u64, String)> = sync
            .book()
            .bids()
            .iter()
            .map(|l| (l.price, l.volume.to_string()))
            .collect();
        let asks_after: Vec<(u64, String)> = sync
            .book()
            .asks()
            .iter()
            .map(|l| (l.price, l.volume.to_string()))
            .collect();
        assert_eq!(bids_before, bids_after);
        assert_eq!(asks_before, asks_after);
    }
}
