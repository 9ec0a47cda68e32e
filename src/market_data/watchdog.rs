// src/market_data/watchdog.rs
use crate::domain::models::SymbolPair;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

/// Tracks the last arrival time of market data per (exchange, symbol) and
/// reports feeds that went quiet, so the transport can close and reopen
/// the connection.
pub struct MarketDataWatchdog {
    stale_after_us: i64,
    last_seen: Mutex<HashMap<(String, SymbolPair), i64>>,
}

impl MarketDataWatchdog {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after_us: stale_after.as_micros() as i64,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record that data arrived for a feed.
    pub fn mark(&self, exchange: &str, symbol: &SymbolPair, arrived_ts: i64) {
        let mut last_seen = self.last_seen.lock().unwrap();
        last_seen.insert((exchange.to_string(), symbol.clone()), arrived_ts);
    }

    /// Feeds with no data since `now_us - stale_after`.
    pub fn stale_feeds(&self, now_us: i64) -> Vec<(String, SymbolPair)> {
        let last_seen = self.last_seen.lock().unwrap();
        last_seen
            .iter()
            .filter(|(_, &ts)| now_us - ts > self.stale_after_us)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Periodically check all feeds and send stale ones to `notify`. The
    /// map lock is released before anything is sent.
    pub fn spawn(
        self: std::sync::Arc<Self>,
        check_interval: Duration,
        notify: Sender<(String, SymbolPair)>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(check_interval);
            loop {
                ticker.tick().await;
                let stale = self.stale_feeds(chrono::Utc::now().timestamp_micros());
                for (exchange, symbol) in stale {
                    log::warn!("No market data for {} {} within interval", exchange, symbol);
                    if notify.send((exchange, symbol)).await.is_err() {
                        return;
                    }
                }
            }
        })
    }
}
