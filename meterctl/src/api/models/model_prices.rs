//! API request/response models for the price catalog.

use crate::db::models::model_prices::{ModelPriceDBResponse, Prices};
use crate::sync::prices::SyncResult;
use crate::types::ModelId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ModelPriceResponse {
    pub id: ModelId,
    pub name: String,
    pub base_model_id: Option<ModelId>,
    /// Price per million input tokens
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub input_price: Decimal,
    /// Price per million output tokens
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub output_price: Decimal,
    /// Flat price per message, negative when disabled
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub per_msg_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<ModelPriceDBResponse> for ModelPriceResponse {
    fn from(db: ModelPriceDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            base_model_id: db.base_model_id,
            input_price: db.input_price,
            output_price: db.output_price,
            per_msg_price: db.per_msg_price,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct SyncPriceRequest {
    #[serde(rename = "modelId", alias = "model_id")]
    pub model_id: ModelId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncPriceResponse {
    pub success: bool,
    pub message: String,
    pub data: ModelPriceResponse,
}

/// Outcome for one derived model in a bulk sync
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncResultResponse {
    pub id: ModelId,
    pub name: String,
    pub base_model_id: Option<ModelId>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prices: Option<ModelPriceResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<SyncResult> for SyncResultResponse {
    fn from(result: SyncResult) -> Self {
        let (prices, error) = match result.outcome {
            Ok(model) => (Some(model.into()), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Self {
            success: error.is_none(),
            id: result.model_id,
            name: result.name,
            base_model_id: result.base_model_id,
            prices,
            error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncAllPricesResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<SyncResultResponse>,
}

impl SyncAllPricesResponse {
    pub fn new(results: Vec<SyncResult>) -> Self {
        let total = results.len();
        let results: Vec<SyncResultResponse> = results.into_iter().map(Into::into).collect();
        let succeeded = results.iter().filter(|r| r.success).count();

        Self {
            success: true,
            message: format!("Successfully synced {succeeded} of {total} models"),
            results,
        }
    }
}

/// A direct price edit. Token prices must not be negative; an omitted per-message price leaves
/// the current one in place.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PriceUpdate {
    pub id: ModelId,
    #[schema(value_type = f64)]
    pub input_price: Decimal,
    #[schema(value_type = f64)]
    pub output_price: Decimal,
    #[serde(default)]
    #[schema(value_type = Option<f64>)]
    pub per_msg_price: Option<Decimal>,
}

impl PriceUpdate {
    /// Reject negative or oversized prices before anything is written
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Model id is required".to_string());
        }
        if self.input_price.is_sign_negative() || self.output_price.is_sign_negative() {
            return Err(format!("Prices for {} cannot be negative", self.id));
        }
        self.prices(&Prices {
            input_price: Decimal::ZERO,
            output_price: Decimal::ZERO,
            per_msg_price: Decimal::NEGATIVE_ONE,
        })
        .check_range()
        .map_err(|e| format!("Prices for {}: {e}", self.id))
    }

    pub fn prices(&self, current: &Prices) -> Prices {
        Prices {
            input_price: self.input_price,
            output_price: self.output_price,
            per_msg_price: self.per_msg_price.unwrap_or(current.per_msg_price),
        }
    }
}

/// Either one edit or a batch of them
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(untagged)]
pub enum PriceUpdateRequest {
    Batch { updates: Vec<PriceUpdate> },
    Single(PriceUpdate),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PriceUpdateResult {
    pub id: ModelId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ModelPriceResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchPriceUpdateResponse {
    pub success: bool,
    pub updated_count: usize,
    pub results: Vec<PriceUpdateResult>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct InletCostQuery {
    pub model: Option<ModelId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InletCostResponse {
    pub success: bool,
    pub model: ModelId,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub cost: Decimal,
}
