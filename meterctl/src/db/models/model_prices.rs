//! Database models for the price catalog.

use crate::types::ModelId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Prices for a model, per million tokens, plus the flat per-message price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prices {
    pub input_price: Decimal,
    pub output_price: Decimal,
    /// Negative disables per-message pricing
    pub per_msg_price: Decimal,
}

/// Price columns are `NUMERIC(16, 6)`; values must stay below this magnitude.
pub const PRICE_LIMIT: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

impl Prices {
    /// Reject values the catalog columns cannot hold
    pub fn check_range(&self) -> Result<(), String> {
        for (field, value) in [
            ("input_price", self.input_price),
            ("output_price", self.output_price),
            ("per_msg_price", self.per_msg_price),
        ] {
            if value.abs() >= PRICE_LIMIT {
                return Err(format!("{field} {value} is out of range, must be below {PRICE_LIMIT}"));
            }
        }
        Ok(())
    }
}

/// Request to add a model to the catalog if it is not there yet
#[derive(Debug, Clone)]
pub struct ModelPriceCreateDBRequest {
    pub id: ModelId,
    /// Display name. `None` keeps the name of an existing row and falls back to the id on insert.
    pub name: Option<String>,
    pub base_model_id: Option<ModelId>,
    /// Prices used when neither the row nor its base exists
    pub default_prices: Prices,
}

/// Database response for one row of `model_prices`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ModelPriceDBResponse {
    pub id: ModelId,
    pub name: String,
    pub base_model_id: Option<ModelId>,
    pub input_price: Decimal,
    pub output_price: Decimal,
    pub per_msg_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl ModelPriceDBResponse {
    pub fn prices(&self) -> Prices {
        Prices {
            input_price: self.input_price,
            output_price: self.output_price,
            per_msg_price: self.per_msg_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(input_price: Decimal) -> Prices {
        Prices {
            input_price,
            output_price: Decimal::from(60),
            per_msg_price: Decimal::NEGATIVE_ONE,
        }
    }

    #[test]
    fn test_price_limit_is_ten_billion() {
        assert_eq!(PRICE_LIMIT, Decimal::from(10_000_000_000_i64));
    }

    #[test]
    fn test_check_range() {
        assert!(prices(Decimal::from(1_000_000)).check_range().is_ok());
        assert!(prices(Decimal::new(9_999_999_999_999_999, 6)).check_range().is_ok());

        let err = prices(PRICE_LIMIT).check_range().unwrap_err();
        assert!(err.starts_with("input_price"), "{err}");
        assert!(prices(-PRICE_LIMIT).check_range().is_err());
    }
}
