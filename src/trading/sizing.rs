// src/trading/sizing.rs
use crate::domain::errors::{TradingError, TradingResult};
use crate::domain::models::{ExchangeParams, Order, OrderType, Side, Ticker};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Take at most this share of the smaller best-level book volume, so both
/// legs have a chance to fill immediately.
const BOOK_VOLUME_FRACTION: f64 = 0.3;

/// Trade at most this share of the available balance, buffering against a
/// stale balance or an unaccounted fee.
const BALANCE_FRACTION: f64 = 0.9;

/// The two legs of a matched opportunity, sized and priced.
#[derive(Debug, Clone)]
pub struct ArbitrageOrders {
    /// Placed on the best-bid exchange
    pub sell_order: Order,
    /// Placed on the best-ask exchange
    pub buy_order: Order,
}

struct ArbitragePrices {
    sell_price: f64,
    buy_price: f64,
}

/// Computes a safe trade quantity and the limit prices for both legs.
///
/// Prices are set so that the orders can fill at worse levels than the
/// current book shows and still close at no worse than zero profit.
pub struct ArbitrageOrderCalculator {
    params: HashMap<String, ExchangeParams>,
}

impl ArbitrageOrderCalculator {
    pub fn new(params: HashMap<String, ExchangeParams>) -> Self {
        Self { params }
    }

    pub fn calculate(
        &self,
        best_bid: &Ticker,
        best_ask: &Ticker,
        base_balance: f64,
        quote_balance: f64,
    ) -> TradingResult<ArbitrageOrders> {
        let quantity = self.calculate_quantity(best_bid, best_ask, base_balance, quote_balance)?;
        let prices = self.calculate_prices(best_bid, best_ask)?;
        debug_assert!(prices.buy_price <= prices.sell_price);

        let quantity = Decimal::from_f64(quantity)
            .ok_or_else(|| TradingError::Numeric(format!("invalid quantity {}", quantity)))?;
        let sell_price = Decimal::from_f64(prices.sell_price)
            .ok_or_else(|| TradingError::Numeric(format!("invalid price {}", prices.sell_price)))?;
        let buy_price = Decimal::from_f64(prices.buy_price)
            .ok_or_else(|| TradingError::Numeric(format!("invalid price {}", prices.buy_price)))?;

        Ok(ArbitrageOrders {
            sell_order: Order::builder()
                .symbol(best_bid.symbol.clone())
                .side(Side::Sell)
                .order_type(OrderType::Limit)
                .quantity(quantity)
                .price(sell_price)
                .build(),
            buy_order: Order::builder()
                .symbol(best_ask.symbol.clone())
                .side(Side::Buy)
                .order_type(OrderType::Limit)
                .quantity(quantity)
                .price(buy_price)
                .build(),
        })
    }

    fn calculate_quantity(
        &self,
        best_bid: &Ticker,
        best_ask: &Ticker,
        base_balance: f64,
        quote_balance: f64,
    ) -> TradingResult<f64> {
        let book_bid_volume = best_bid
            .bid_volume
            .ok_or_else(|| TradingError::MissingBookVolume(best_bid.exchange.clone()))?;
        let book_ask_volume = best_ask
            .ask_volume
            .ok_or_else(|| TradingError::MissingBookVolume(best_ask.exchange.clone()))?;
        let mut base_volume = book_bid_volume.min(book_ask_volume);
        log::debug!("Available for arbitrage: {} {}", base_volume, best_bid.symbol);
        base_volume *= BOOK_VOLUME_FRACTION;

        let tradable_base_balance = BALANCE_FRACTION * base_balance;
        let tradable_quote_balance = BALANCE_FRACTION * quote_balance;
        let quote_volume = (base_volume * best_ask.ask).min(tradable_quote_balance);
        base_volume = base_volume
            .min(quote_volume / best_ask.ask)
            .min(tradable_base_balance);
        log::debug!(
            "tradable_base_balance={}, tradable_quote_balance={}, quote_volume={}, base_volume={}",
            tradable_base_balance,
            tradable_quote_balance,
            quote_volume,
            base_volume
        );
        Ok(base_volume)
    }

    fn calculate_prices(&self, best_bid: &Ticker, best_ask: &Ticker) -> TradingResult<ArbitragePrices> {
        let bid_params = self
            .params
            .get(&best_bid.exchange)
            .ok_or_else(|| TradingError::MissingExchangeParams(best_bid.exchange.clone()))?;
        let ask_params = self
            .params
            .get(&best_ask.exchange)
            .ok_or_else(|| TradingError::MissingExchangeParams(best_ask.exchange.clone()))?;
        let book_bid_volume = best_bid
            .bid_volume
            .ok_or_else(|| TradingError::MissingBookVolume(best_bid.exchange.clone()))?;
        let book_ask_volume = best_ask
            .ask_volume
            .ok_or_else(|| TradingError::MissingBookVolume(best_ask.exchange.clone()))?;

        // Fraction of the quote sum received when selling / paid when buying
        let sell_cost_coeff = 1.0 - bid_params.fee;
        let buy_cost_coeff = 1.0 + ask_params.fee;
        // Zero-profit frontier implied by both legs' fees
        let max_buy_price = (sell_cost_coeff / buy_cost_coeff) * best_bid.bid;
        let min_sell_price = (buy_cost_coeff / sell_cost_coeff) * best_ask.ask;

        // The existing margin is split between the legs proportionally to a
        // liquidity weight: the less liquid, lower-volume side gets the
        // larger price cushion so its order fills first. Worst case is zero
        // profit.
        let volume_sum = book_bid_volume + book_ask_volume;
        let daily_volume_sum = bid_params.daily_volume + ask_params.daily_volume;
        let ask_coeff =
            (ask_params.daily_volume / daily_volume_sum + book_ask_volume / volume_sum) / 2.0;
        let bid_coeff =
            (bid_params.daily_volume / daily_volume_sum + book_bid_volume / volume_sum) / 2.0;
        log::debug!("Ask coeff: {}, bid coeff: {}", ask_coeff, bid_coeff);

        Ok(ArbitragePrices {
            buy_price: best_ask.ask * ask_coeff + max_buy_price * bid_coeff,
            sell_price: best_bid.bid * bid_coeff + min_sell_price * ask_coeff,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SymbolPair;
    use rust_decimal::prelude::ToPrimitive;

    fn calculator() -> ArbitrageOrderCalculator {
        let mut params = HashMap::new();
        params.insert(
            "binance".to_string(),
            ExchangeParams::new("binance", 0.00075, 0.0, 10.0),
        );
        params.insert(
            "kraken".to_string(),
            ExchangeParams::new("kraken", 0.0026, 0.0, 1.0),
        );
        ArbitrageOrderCalculator::new(params)
    }

    fn best_bid_ticker() -> Ticker {
        Ticker {
            exchange: "binance".to_string(),
            symbol: SymbolPair::new("ADA", "USDT"),
            bid: 1.7762,
            bid_volume: Some(30000.0),
            ask: 1.7770,
            ask_volume: Some(30000.0),
            source_ts: None,
            arrived_ts: 0,
        }
    }

    fn best_ask_ticker() -> Ticker {
        Ticker {
            exchange: "kraken".to_string(),
            symbol: SymbolPair::new("ADA", "USDT"),
            bid: 1.7600,
            bid_volume: Some(20000.0),
            ask: 1.7674,
            ask_volume: Some(20000.0),
            source_ts: None,
            arrived_ts: 0,
        }
    }

    #[test]
    fn leg_prices_close_at_zero_profit_worst_case() {
        let orders = calculator()
            .calculate(&best_bid_ticker(), &best_ask_ticker(), 100_000.0, 1_000_000.0)
            .unwrap();
        let sell_price = orders.sell_order.price.to_f64().unwrap();
        let buy_price = orders.buy_order.price.to_f64().unwrap();
        assert!(sell_price > buy_price);
        let profit = (1.0 - 0.00075) * sell_price - (1.0 + 0.0026) * buy_price;
        assert!(profit.abs() < 1e-9, "worst-case profit was {}", profit);
    }

    #[test]
    fn quantity_is_bounded_by_book_volume() {
        let orders = calculator()
            .calculate(&best_bid_ticker(), &best_ask_ticker(), 100_000.0, 1_000_000.0)
            .unwrap();
        // 30% of min(30000, 20000); balances are not the binding constraint
        let quantity = orders.sell_order.quantity.to_f64().unwrap();
        assert!((quantity - 6000.0).abs() < 1e-6);
        assert_eq!(orders.sell_order.quantity, orders.buy_order.quantity);
        assert_eq!(orders.sell_order.side, Side::Sell);
        assert_eq!(orders.buy_order.side, Side::Buy);
    }

    #[test]
    fn quantity_is_bounded_by_balances() {
        // Base balance caps the sell leg
        let orders = calculator()
            .calculate(&best_bid_ticker(), &best_ask_ticker(), 1000.0, 1_000_000.0)
            .unwrap();
        let quantity = orders.sell_order.quantity.to_f64().unwrap();
        assert!((quantity - 900.0).abs() < 1e-6);

        // Quote balance caps the buy leg: 0.9 * 1767.4 / 1.7674 = 900 base
        let orders = calculator()
            .calculate(&best_bid_ticker(), &best_ask_ticker(), 100_000.0, 1767.4)
            .unwrap();
        let quantity = orders.buy_order.quantity.to_f64().unwrap();
        assert!((quantity - 900.0).abs() < 1e-6);
    }

    #[test]
    fn missing_book_volume_is_an_error() {
        let mut bid = best_bid_ticker();
        bid.bid_volume = None;
        let err = calculator()
            .calculate(&bid, &best_ask_ticker(), 100_000.0, 1_000_000.0)
            .unwrap_err();
        assert!(matches!(err, TradingError::MissingBookVolume(_)));
    }
}
