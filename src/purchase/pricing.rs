//! Resale prices
//!
//! Price = provider cost from the config table plus markup, rounded up to
//! the currency precision. Service codes missing from a table use its
//! `default` row.

use rust_decimal::Decimal;
use std::collections::HashMap;

use super::error::PurchaseError;
use crate::config::{LedgerConfig, PricingConfig};
use crate::money::apply_markup;

const DEFAULT_ROW: &str = "default";

#[derive(Debug, Clone)]
pub struct PriceBook {
    markup_percent: Decimal,
    activation_costs: HashMap<String, Decimal>,
    rental_hourly_costs: HashMap<String, Decimal>,
    decimals: u32,
    min_price: Decimal,
}

impl PriceBook {
    pub fn new(pricing: &PricingConfig, ledger: &LedgerConfig) -> Self {
        Self {
            markup_percent: pricing.markup_percent,
            activation_costs: lowercase_keys(&pricing.activation_costs),
            rental_hourly_costs: lowercase_keys(&pricing.rental_hourly_costs),
            decimals: ledger.decimals,
            min_price: ledger.min_price,
        }
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn activation_price(&self, service: &str) -> Result<Decimal, PurchaseError> {
        let cost = lookup(&self.activation_costs, service)?;
        self.finish(cost)
    }

    pub fn rental_price(&self, service: &str, hours: u32) -> Result<Decimal, PurchaseError> {
        let hourly = lookup(&self.rental_hourly_costs, service)?;
        self.finish(hourly * Decimal::from(hours))
    }

    /// Reject a quote above the client's `max_price`
    pub fn check_limit(price: Decimal, limit: Option<Decimal>) -> Result<(), PurchaseError> {
        match limit {
            Some(limit) if price > limit => Err(PurchaseError::PriceAboveLimit { price, limit }),
            _ => Ok(()),
        }
    }

    fn finish(&self, cost: Decimal) -> Result<Decimal, PurchaseError> {
        let price = apply_markup(cost, self.markup_percent, self.decimals);
        if price <= Decimal::ZERO || price < self.min_price {
            return Err(PurchaseError::PriceTooLow {
                price,
                min: self.min_price,
            });
        }
        Ok(price)
    }
}

fn lowercase_keys(table: &HashMap<String, Decimal>) -> HashMap<String, Decimal> {
    table
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), *v))
        .collect()
}

fn lookup(table: &HashMap<String, Decimal>, service: &str) -> Result<Decimal, PurchaseError> {
    table
        .get(service)
        .or_else(|| table.get(DEFAULT_ROW))
        .copied()
        .ok_or_else(|| PurchaseError::InvalidRequest(format!("no price for service {service}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn book() -> PriceBook {
        let pricing = PricingConfig {
            markup_percent: d("30"),
            activation_costs: HashMap::from([
                ("default".to_string(), d("0.50")),
                ("WA".to_string(), d("0.90")),
                ("free".to_string(), Decimal::ZERO),
            ]),
            rental_hourly_costs: HashMap::from([("default".to_string(), d("0.10"))]),
        };
        PriceBook::new(&pricing, &LedgerConfig::default())
    }

    #[test]
    fn test_activation_price_with_markup() {
        let book = book();
        // 0.90 * 1.3 = 1.17
        assert_eq!(book.activation_price("wa").unwrap(), d("1.17"));
        // 0.50 * 1.3 = 0.65
        assert_eq!(book.activation_price("tg").unwrap(), d("0.65"));
    }

    #[test]
    fn test_rental_price_scales_with_hours() {
        // 0.10 * 4 * 1.3 = 0.52
        assert_eq!(book().rental_price("wa", 4).unwrap(), d("0.52"));
    }

    #[test]
    fn test_zero_cost_rejected() {
        assert!(matches!(
            book().activation_price("free"),
            Err(PurchaseError::PriceTooLow { .. })
        ));
    }

    #[test]
    fn test_missing_table_row() {
        let pricing = PricingConfig {
            markup_percent: Decimal::ZERO,
            activation_costs: HashMap::new(),
            rental_hourly_costs: HashMap::new(),
        };
        let book = PriceBook::new(&pricing, &LedgerConfig::default());
        assert!(matches!(
            book.activation_price("wa"),
            Err(PurchaseError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_check_limit() {
        assert!(PriceBook::check_limit(d("1.17"), None).is_ok());
        assert!(PriceBook::check_limit(d("1.17"), Some(d("1.17"))).is_ok());
        assert_eq!(
            PriceBook::check_limit(d("1.17"), Some(d("1.00"))).unwrap_err(),
            PurchaseError::PriceAboveLimit {
                price: d("1.17"),
                limit: d("1.00")
            }
        );
    }
}
