// src/market_data/mod.rs
pub mod binance_book;
pub mod kraken_book;
pub mod order_book;
pub mod watchdog;

/// What a synchronizer did with an incoming message, and what the caller
/// (the transport) has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Message stored until the snapshot arrives
    Buffered,
    /// Message applied to the book
    Applied,
    /// Snapshot applied and buffered messages replayed
    Synced,
    /// Sequence gap detected; the book was cleared and a fresh snapshot
    /// must be requested
    ResyncRequired,
    /// Checksum mismatch; the book was cleared and the subscription must
    /// be re-issued
    ResubscribeRequired,
}
