//! Decoding of legacy price blobs into normalized prices.
//!
//! Products carry a cost blob keyed by currency:
//!
//! ```json
//! {"USD": {"amount": 10}, "EUR": {"amount": "9.50"}, "default": "EUR"}
//! ```
//!
//! Subscription packages carry a renewal blob keyed by currency and then by
//! interval unit, or a flat entry naming its interval:
//!
//! ```json
//! {"USD": {"month": {"amount": 5}, "year": {"amount": 50, "count": 1}}}
//! {"EUR": {"amount": 5, "interval": "month", "interval_count": 3}}
//! ```
//!
//! When no default is named (top-level `"default"` currency, or an entry
//! with `"default": true`), the first price encountered in document order
//! is the default.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::target::models::{BillingInterval, IntervalUnit, Price};
use crate::target::TargetId;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("price blob must be an object")]
    NotAnObject,
    #[error("invalid currency code '{0}'")]
    InvalidCurrency(String),
    #[error("invalid amount for {currency}: {value}")]
    InvalidAmount { currency: String, value: String },
    #[error("unknown interval '{0}'")]
    InvalidInterval(String),
    #[error("default currency {0} has no price")]
    UnknownDefault(String),
}

/// A price not yet attached to a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSpec {
    pub currency: String,
    pub amount_cents: i64,
    pub interval: Option<BillingInterval>,
    pub is_default: bool,
}

impl PriceSpec {
    pub fn for_product(&self, product_id: TargetId) -> Price {
        Price {
            product_id,
            currency: self.currency.clone(),
            amount_cents: self.amount_cents,
            interval: self.interval,
            is_default: self.is_default,
        }
    }
}

fn amount_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)(?:\.(\d{1,2}))?$").expect("amount regex"))
}

/// Major-unit amount (`10`, `9.99`, `"12.5"`) to cents. Negative amounts
/// are rejected.
pub fn parse_amount_cents(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return (i >= 0).then(|| i.checked_mul(100)).flatten();
            }
            let f = n.as_f64()?;
            (f.is_finite() && f >= 0.0).then(|| (f * 100.0).round() as i64)
        }
        Value::String(s) => {
            let caps = amount_pattern().captures(s.trim())?;
            let whole: i64 = caps.get(1)?.as_str().parse().ok()?;
            let cents = match caps.get(2) {
                Some(frac) if frac.as_str().len() == 1 => frac.as_str().parse::<i64>().ok()? * 10,
                Some(frac) => frac.as_str().parse().ok()?,
                None => 0,
            };
            whole.checked_mul(100)?.checked_add(cents)
        }
        _ => None,
    }
}

fn currency_code(raw: &str) -> Result<String, PriceError> {
    let code = raw.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(PriceError::InvalidCurrency(raw.to_string()))
    }
}

fn as_object(blob: &Value) -> Result<&Map<String, Value>, PriceError> {
    blob.as_object().ok_or(PriceError::NotAnObject)
}

fn amount_of(currency: &str, entry: &Value) -> Result<i64, PriceError> {
    let raw = match entry {
        Value::Object(map) => map.get("amount").or_else(|| map.get("price")),
        other => Some(other),
    };
    raw.and_then(parse_amount_cents)
        .ok_or_else(|| PriceError::InvalidAmount {
            currency: currency.to_string(),
            value: entry.to_string(),
        })
}

fn flagged_default(entry: &Value) -> bool {
    entry
        .get("default")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn interval_count(entry: &Value, keys: &[&str]) -> u32 {
    keys.iter()
        .find_map(|k| entry.get(*k))
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// Pick the default among decoded prices. `named` is the top-level default
/// currency, `flagged` the index of an entry marked default.
fn apply_default(
    mut prices: Vec<PriceSpec>,
    named: Option<String>,
    flagged: Option<usize>,
) -> Result<Vec<PriceSpec>, PriceError> {
    let index = match (named, flagged) {
        (Some(code), _) => Some(
            prices
                .iter()
                .position(|p| p.currency == code)
                .ok_or(PriceError::UnknownDefault(code))?,
        ),
        (None, Some(idx)) => Some(idx),
        (None, None) if prices.is_empty() => None,
        (None, None) => Some(0),
    };
    if let Some(index) = index {
        prices[index].is_default = true;
    }
    Ok(prices)
}

fn named_default(map: &Map<String, Value>) -> Result<Option<String>, PriceError> {
    match map.get("default") {
        Some(Value::String(code)) => currency_code(code).map(Some),
        _ => Ok(None),
    }
}

/// Decode a one-time cost blob. An empty object yields no prices.
pub fn decode_cost(blob: &Value) -> Result<Vec<PriceSpec>, PriceError> {
    let map = as_object(blob)?;
    let named = named_default(map)?;

    let mut prices = Vec::new();
    let mut flagged = None;
    for (key, entry) in map {
        if key == "default" {
            continue;
        }
        let currency = currency_code(key)?;
        if flagged.is_none() && flagged_default(entry) {
            flagged = Some(prices.len());
        }
        prices.push(PriceSpec {
            amount_cents: amount_of(&currency, entry)?,
            currency,
            interval: None,
            is_default: false,
        });
    }
    apply_default(prices, named, flagged)
}

/// Decode a subscription renewal blob into one price per currency and
/// interval.
pub fn decode_renewal(blob: &Value) -> Result<Vec<PriceSpec>, PriceError> {
    let map = as_object(blob)?;
    let named = named_default(map)?;

    let mut prices = Vec::new();
    let mut flagged = None;
    for (key, entry) in map {
        if key == "default" {
            continue;
        }
        let currency = currency_code(key)?;

        let flat = match entry {
            Value::Object(inner) => inner.contains_key("amount") || inner.contains_key("price"),
            _ => true,
        };
        if flat {
            let unit = match entry
                .get("interval")
                .or_else(|| entry.get("unit"))
                .and_then(Value::as_str)
            {
                Some(raw) => raw
                    .parse::<IntervalUnit>()
                    .map_err(|_| PriceError::InvalidInterval(raw.to_string()))?,
                None => IntervalUnit::Month,
            };
            if flagged.is_none() && flagged_default(entry) {
                flagged = Some(prices.len());
            }
            prices.push(PriceSpec {
                amount_cents: amount_of(&currency, entry)?,
                interval: Some(BillingInterval {
                    unit,
                    count: interval_count(entry, &["interval_count", "count"]),
                }),
                currency,
                is_default: false,
            });
            continue;
        }

        let Value::Object(per_unit) = entry else {
            continue;
        };
        for (unit_key, unit_entry) in per_unit {
            if unit_key == "default" {
                continue;
            }
            let unit = unit_key
                .parse::<IntervalUnit>()
                .map_err(|_| PriceError::InvalidInterval(unit_key.clone()))?;
            if flagged.is_none() && (flagged_default(unit_entry) || flagged_default(entry)) {
                flagged = Some(prices.len());
            }
            prices.push(PriceSpec {
                currency: currency.clone(),
                amount_cents: amount_of(&currency, unit_entry)?,
                interval: Some(BillingInterval {
                    unit,
                    count: interval_count(unit_entry, &["count", "interval_count"]),
                }),
                is_default: false,
            });
        }
    }
    apply_default(prices, named, flagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults(prices: &[PriceSpec]) -> Vec<&str> {
        prices
            .iter()
            .filter(|p| p.is_default)
            .map(|p| p.currency.as_str())
            .collect()
    }

    #[test]
    fn test_first_currency_is_default() {
        let prices = decode_cost(&json!({"USD": {"amount": 10}, "EUR": {"amount": 9}})).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].currency, "USD");
        assert_eq!(prices[0].amount_cents, 1000);
        assert_eq!(prices[1].amount_cents, 900);
        assert_eq!(defaults(&prices), vec!["USD"]);
    }

    #[test]
    fn test_explicit_defaults() {
        let prices = decode_cost(&json!({
            "USD": {"amount": 10},
            "EUR": {"amount": 9},
            "default": "eur"
        }))
        .unwrap();
        assert_eq!(defaults(&prices), vec!["EUR"]);

        let prices = decode_cost(&json!({
            "usd": 10,
            "gbp": {"amount": "7.5", "default": true}
        }))
        .unwrap();
        assert_eq!(defaults(&prices), vec!["GBP"]);
        assert_eq!(prices[1].amount_cents, 750);

        assert_eq!(
            decode_cost(&json!({"USD": 1, "default": "JPY"})),
            Err(PriceError::UnknownDefault("JPY".to_string()))
        );
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert!(matches!(
            decode_cost(&json!({"DOLLARS": 1})),
            Err(PriceError::InvalidCurrency(_))
        ));
        assert!(matches!(
            decode_cost(&json!({"USD": {"amount": -1}})),
            Err(PriceError::InvalidAmount { .. })
        ));
        assert_eq!(decode_cost(&json!([1, 2])), Err(PriceError::NotAnObject));
        assert!(decode_cost(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_parse_amount_cents() {
        assert_eq!(parse_amount_cents(&json!(12)), Some(1200));
        assert_eq!(parse_amount_cents(&json!(9.99)), Some(999));
        assert_eq!(parse_amount_cents(&json!("0.5")), Some(50));
        assert_eq!(parse_amount_cents(&json!(" 3.25 ")), Some(325));
        assert_eq!(parse_amount_cents(&json!("3.255")), None);
        assert_eq!(parse_amount_cents(&json!("abc")), None);
        assert_eq!(parse_amount_cents(&json!(null)), None);
    }

    #[test]
    fn test_renewal_per_unit_and_flat() {
        let prices = decode_renewal(&json!({
            "USD": {"month": {"amount": 5}, "year": {"amount": 50}},
            "EUR": {"amount": "4.50", "interval": "quarterly"}
        }));
        assert_eq!(
            prices,
            Err(PriceError::InvalidInterval("quarterly".to_string()))
        );

        let prices = decode_renewal(&json!({
            "USD": {"month": {"amount": 5}, "year": {"amount": 50, "count": 1}},
            "EUR": {"amount": "4.50", "interval": "monthly", "interval_count": 3}
        }))
        .unwrap();
        assert_eq!(prices.len(), 3);
        assert_eq!(
            prices[0].interval,
            Some(BillingInterval {
                unit: IntervalUnit::Month,
                count: 1
            })
        );
        assert_eq!(prices[1].amount_cents, 5000);
        assert_eq!(prices[2].currency, "EUR");
        assert_eq!(prices[2].interval.map(|i| i.count), Some(3));
        assert!(prices[0].is_default);
        assert_eq!(prices.iter().filter(|p| p.is_default).count(), 1);
    }
}
