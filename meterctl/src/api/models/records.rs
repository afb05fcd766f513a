//! API request/response models for usage records.

use super::pagination::Pagination;
use crate::db::models::usage_records::UsageRecordDBResponse;
use crate::types::{ModelId, UsageRecordId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct UsageRecordResponse {
    pub id: UsageRecordId,
    pub user_id: UserId,
    pub nickname: String,
    pub use_time: DateTime<Utc>,
    pub model_name: ModelId,
    pub input_tokens: i32,
    pub output_tokens: i32,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub balance_after: Decimal,
}

impl From<UsageRecordDBResponse> for UsageRecordResponse {
    fn from(db: UsageRecordDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            nickname: db.nickname,
            use_time: db.use_time,
            model_name: db.model_name,
            input_tokens: db.input_tokens,
            output_tokens: db.output_tokens,
            cost: db.cost,
            balance_after: db.balance_after,
        }
    }
}

/// Query parameters for listing usage records, newest first
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListRecordsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only records of this user
    pub user_id: Option<UserId>,

    /// Only records of this model
    pub model: Option<ModelId>,
}
