// src/exchange/balance.rs
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;

/// Per-asset total and locked amounts for one exchange account.
///
/// The locked portion is the amount reserved by open orders; what can be
/// spent is `free = total - locked`. Owned exclusively by one account
/// manager, which serializes every mutation.
#[derive(Debug, Clone, Default)]
pub struct AccountBalance {
    totals: HashMap<String, Decimal>,
    locked: HashMap<String, Decimal>,
}

impl AccountBalance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_totals(totals: HashMap<String, Decimal>) -> Self {
        Self {
            totals,
            locked: HashMap::new(),
        }
    }

    pub fn total(&self, asset: &str) -> Decimal {
        self.totals.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn locked(&self, asset: &str) -> Decimal {
        self.locked.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Spendable amount. A negative result means the order state machine
    /// went wrong somewhere; it is reported, not corrected.
    pub fn free(&self, asset: &str) -> Decimal {
        let free = self.total(asset) - self.locked(asset);
        if free < Decimal::ZERO {
            log::error!(
                "Negative free balance for {}: total={}, locked={}",
                asset,
                self.total(asset),
                self.locked(asset)
            );
        }
        free
    }

    pub fn set_total(&mut self, asset: &str, amount: Decimal) {
        self.totals.insert(asset.to_string(), amount);
    }

    pub fn add_total(&mut self, asset: &str, delta: Decimal) {
        let amount = self.total(asset) + delta;
        self.totals.insert(asset.to_string(), amount);
    }

    pub fn add_locked(&mut self, asset: &str, amount: Decimal) {
        let locked = self.locked(asset) + amount;
        self.locked.insert(asset.to_string(), locked);
    }

    /// Release a previously locked amount. Unlocking more than is locked
    /// leaves the negative amount visible as a bug signal.
    pub fn sub_locked(&mut self, asset: &str, amount: Decimal) {
        let locked = self.locked(asset) - amount;
        if locked < Decimal::ZERO {
            log::error!(
                "Unlocking {} {} but only {} was locked",
                amount,
                asset,
                self.locked(asset)
            );
        }
        self.locked.insert(asset.to_string(), locked);
    }

    /// Overwrite totals for the listed assets; locked amounts are untouched.
    pub fn update_totals(&mut self, totals: &HashMap<String, Decimal>) {
        for (asset, amount) in totals {
            self.totals.insert(asset.clone(), *amount);
        }
    }

    pub fn totals(&self) -> &HashMap<String, Decimal> {
        &self.totals
    }
}

impl fmt::Display for AccountBalance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "totals: {{")?;
        for (asset, amount) in &self.totals {
            write!(f, " {}={}", asset, amount)?;
        }
        write!(f, " }}, locked: {{")?;
        for (asset, amount) in &self.locked {
            write!(f, " {}={}", asset, amount)?;
        }
        write!(f, " }}")
    }
}
