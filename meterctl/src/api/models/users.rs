//! API request/response models for users.

use super::pagination::Pagination;
use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct UserResponse {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub balance: Decimal,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            email: db.email,
            name: db.name,
            role: db.role,
            balance: db.balance,
            deleted: db.deleted,
            created_at: db.created_at,
        }
    }
}

/// Query parameters for listing users
#[serde_as]
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListUsersQuery {
    /// Pagination parameters
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Case-insensitive match on name or email
    pub search: Option<String>,

    /// List soft-deleted users instead of active ones (default: false)
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub deleted: Option<bool>,
}

/// Administrative balance override. Only JSON numbers are accepted.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct BalanceUpdate {
    #[schema(value_type = f64)]
    pub balance: serde_json::Number,
}

impl BalanceUpdate {
    pub fn balance(&self) -> Result<Decimal, String> {
        let raw = self.balance.to_string();
        Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .map_err(|_| format!("Balance {raw} is out of range"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceUpdateResponse {
    pub id: UserId,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub balance: Decimal,
}

/// Soft delete (`true`) or restore (`false`) a user
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UserUpdate {
    pub deleted: bool,
}
