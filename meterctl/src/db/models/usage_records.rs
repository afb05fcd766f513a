//! Database models for settled usage.

use crate::types::{UsageRecordId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Database request for appending a usage record
#[derive(Debug, Clone)]
pub struct UsageRecordCreateDBRequest {
    pub user_id: UserId,
    pub nickname: String,
    pub model_name: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub cost: Decimal,
    pub balance_after: Decimal,
}

/// Database response for one row of `user_usage_records`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsageRecordDBResponse {
    pub id: UsageRecordId,
    pub user_id: UserId,
    pub nickname: String,
    pub use_time: DateTime<Utc>,
    pub model_name: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub cost: Decimal,
    pub balance_after: Decimal,
}
