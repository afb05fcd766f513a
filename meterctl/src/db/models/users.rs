//! Database models for users.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identity fields refreshed every time the gateway reports a user
#[derive(Debug, Clone)]
pub struct UserUpsertDBRequest {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: String,
    /// Balance assigned only when the row is created
    pub initial_balance: Decimal,
}

/// Database request for updating a user
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub deleted: Option<bool>,
}

/// Database response for a user, one row of `users`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: String,
    pub balance: Decimal,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}
