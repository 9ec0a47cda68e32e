// src/trading/matcher.rs
use crate::domain::models::{ExchangeParams, Ticker};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The most profitable bid/ask exchange pair for one symbol at one instant.
/// Computed fresh per incoming ticker, never persisted.
#[derive(Debug, Clone)]
pub struct ArbitrageMatch {
    pub best_bid: Ticker,
    pub best_ask: Ticker,
    /// Estimated profit per base unit after fees, slippage and margin
    pub profit: f64,
}

impl fmt::Display for ArbitrageMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "sell on {} at {}, buy on {} at {}, estimated profit per unit {}",
            self.best_bid.exchange, self.best_bid.bid, self.best_ask.exchange, self.best_ask.ask,
            self.profit
        )
    }
}

/// Finds the exchange pair with the widest exploitable spread for one
/// symbol.
///
/// Tickers are scanned in lexicographic exchange order, so ties on equal
/// best bid or best ask resolve deterministically to the alphabetically
/// first exchange. Exchanges without configured parameters cannot be
/// matched and are skipped.
pub struct ArbitrageMatcher {
    params: HashMap<String, ExchangeParams>,
    /// Safety buffer subtracted from both legs' profit estimate
    profit_margin: f64,
}

impl ArbitrageMatcher {
    pub fn new(params: HashMap<String, ExchangeParams>, profit_margin: f64) -> Self {
        Self {
            params,
            profit_margin,
        }
    }

    /// All entries must carry the same symbol; the caller guarantees it.
    pub fn find_match(&self, tickers: &BTreeMap<String, Ticker>) -> Option<ArbitrageMatch> {
        let mut best_bid: Option<&Ticker> = None;
        let mut best_ask: Option<&Ticker> = None;
        for ticker in tickers.values() {
            if !self.params.contains_key(&ticker.exchange) {
                log::debug!("No exchange parameters for {}, skipping", ticker.exchange);
                continue;
            }
            if ticker.bid > 0.0 && best_bid.map_or(true, |t| ticker.bid > t.bid) {
                best_bid = Some(ticker);
            }
            if ticker.ask > 0.0 && best_ask.map_or(true, |t| ticker.ask < t.ask) {
                best_ask = Some(ticker);
            }
        }
        let (best_bid, best_ask) = match (best_bid, best_ask) {
            (Some(b), Some(a)) => (b, a),
            _ => return None,
        };
        if best_bid.exchange == best_ask.exchange {
            return None;
        }
        let profit = self.calculate_profit(best_bid, best_ask);
        if profit >= 0.0 {
            Some(ArbitrageMatch {
                best_bid: best_bid.clone(),
                best_ask: best_ask.clone(),
                profit,
            })
        } else {
            None
        }
    }

    fn calculate_profit(&self, best_bid: &Ticker, best_ask: &Ticker) -> f64 {
        let bid_params = &self.params[&best_bid.exchange];
        let ask_params = &self.params[&best_ask.exchange];
        (1.0 - bid_params.fee - self.profit_margin) * (best_bid.bid - bid_params.slippage)
            - (1.0 + ask_params.fee + self.profit_margin) * (best_ask.ask + ask_params.slippage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SymbolPair;

    fn ticker(exchange: &str, bid: f64, ask: f64) -> Ticker {
        Ticker {
            exchange: exchange.to_string(),
            symbol: SymbolPair::new("ADA", "USDT"),
            bid,
            bid_volume: Some(1000.0),
            ask,
            ask_volume: Some(1000.0),
            source_ts: None,
            arrived_ts: 0,
        }
    }

    fn params(fee_a: f64, fee_b: f64) -> HashMap<String, ExchangeParams> {
        let mut params = HashMap::new();
        params.insert("A".to_string(), ExchangeParams::new("A", fee_a, 0.01, 1.0));
        params.insert("B".to_string(), ExchangeParams::new("B", fee_b, 0.01, 1.0));
        params
    }

    #[test]
    fn selects_highest_bid_and_lowest_ask_exchanges() {
        let matcher = ArbitrageMatcher::new(params(0.01, 0.02), 0.0);
        let mut tickers = BTreeMap::new();
        tickers.insert("A".to_string(), ticker("A", 1.0, 1.1));
        tickers.insert("B".to_string(), ticker("B", 1.2, 1.3));

        let m = matcher.find_match(&tickers).expect("profitable match");
        assert_eq!(m.best_bid.exchange, "B");
        assert_eq!(m.best_ask.exchange, "A");
        // (1 - 0.02)(1.2 - 0.01) - (1 + 0.01)(1.1 + 0.01)
        assert!((m.profit - 0.0451).abs() < 1e-9);
    }

    #[test]
    fn margin_can_push_profit_negative() {
        let matcher = ArbitrageMatcher::new(params(0.01, 0.02), 0.05);
        let mut tickers = BTreeMap::new();
        tickers.insert("A".to_string(), ticker("A", 1.0, 1.1));
        tickers.insert("B".to_string(), ticker("B", 1.2, 1.3));
        assert!(matcher.find_match(&tickers).is_none());
    }

    #[test]
    fn single_exchange_never_matches_itself() {
        let matcher = ArbitrageMatcher::new(params(0.0, 0.0), 0.0);
        let mut tickers = BTreeMap::new();
        tickers.insert("A".to_string(), ticker("A", 1.2, 1.0));
        assert!(matcher.find_match(&tickers).is_none());
    }

    #[test]
    fn unparameterized_exchange_cannot_be_matched() {
        let matcher = ArbitrageMatcher::new(params(0.01, 0.02), 0.0);
        let mut tickers = BTreeMap::new();
        // C has the best bid but no configured parameters
        tickers.insert("C".to_string(), ticker("C", 2.0, 2.1));
        tickers.insert("A".to_string(), ticker("A", 1.0, 1.1));
        tickers.insert("B".to_string(), ticker("B", 1.2, 1.3));

        let m = matcher.find_match(&tickers).expect("match without C");
        assert_eq!(m.best_bid.exchange, "B");
    }

    #[test]
    fn empty_ticker_map_yields_no_match() {
        let matcher = ArbitrageMatcher::new(params(0.0, 0.0), 0.0);
        assert!(matcher.find_match(&BTreeMap::new()).is_none());
    }

    #[test]
    fn equal_bids_resolve_to_first_exchange_in_order() {
        let matcher = ArbitrageMatcher::new(params(0.0, 0.0), 0.0);
        let mut tickers = BTreeMap::new();
        tickers.insert("A".to_string(), ticker("A", 1.5, 1.6));
        tickers.insert("B".to_string(), ticker("B", 1.5, 1.2));
        let m = matcher.find_match(&tickers).expect("match");
        assert_eq!(m.best_bid.exchange, "A");
        assert_eq!(m.best_ask.exchange, "B");
    }
}
