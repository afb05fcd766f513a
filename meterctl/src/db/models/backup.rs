//! Database models for full-table backups.
//!
//! An export is a [`BackupSnapshot`] holding every column of the three tables. Imports arrive as
//! a [`BackupPayload`], whose rows are lenient so that a missing column can be reported with the
//! table name and row index instead of a generic deserialization failure.

use crate::db::models::{
    model_prices::{ModelPriceDBResponse, Prices},
    usage_records::UsageRecordDBResponse,
    users::UserDBResponse,
};
use crate::types::{ModelId, UsageRecordId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const BACKUP_FORMAT_VERSION: &str = "1.0";

/// Full contents of the metering tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub data: BackupTables,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupTables {
    pub users: Vec<UserDBResponse>,
    pub model_prices: Vec<ModelPriceDBResponse>,
    pub user_usage_records: Vec<UsageRecordDBResponse>,
}

/// An import request before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupPayload {
    pub version: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub data: Option<BackupPayloadTables>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupPayloadTables {
    pub users: Option<Vec<UserBackupRow>>,
    pub model_prices: Option<Vec<ModelPriceBackupRow>>,
    pub user_usage_records: Option<Vec<UsageRecordBackupRow>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserBackupRow {
    pub id: Option<UserId>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub balance: Option<Decimal>,
    pub deleted: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelPriceBackupRow {
    pub id: Option<ModelId>,
    pub name: Option<String>,
    pub base_model_id: Option<ModelId>,
    pub input_price: Option<Decimal>,
    pub output_price: Option<Decimal>,
    pub per_msg_price: Option<Decimal>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageRecordBackupRow {
    pub id: Option<UsageRecordId>,
    pub user_id: Option<UserId>,
    pub nickname: Option<String>,
    pub use_time: Option<DateTime<Utc>>,
    pub model_name: Option<String>,
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub cost: Option<Decimal>,
    pub balance_after: Option<Decimal>,
}

/// Usage record ready to insert; rows without an id take the next sequence value
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecordImportRow {
    pub id: Option<UsageRecordId>,
    pub user_id: UserId,
    pub nickname: String,
    pub use_time: DateTime<Utc>,
    pub model_name: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub cost: Decimal,
    pub balance_after: Decimal,
}

/// A validated import, with column defaults filled in
#[derive(Debug, Clone, Default)]
pub struct BackupImportDBRequest {
    pub users: Vec<UserDBResponse>,
    pub model_prices: Vec<ModelPriceDBResponse>,
    pub user_usage_records: Vec<UsageRecordImportRow>,
}

/// Rows inserted per table by an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct BackupImportCounts {
    pub users: usize,
    pub model_prices: usize,
    pub user_usage_records: usize,
}

fn required<T>(value: Option<T>, table: &str, index: usize, field: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("{table}[{index}]: missing required field '{field}'"))
}

impl BackupPayload {
    /// Check the payload shape and fill in defaults. Nothing is written until this succeeds.
    pub fn validate(self, default_prices: Prices, now: DateTime<Utc>) -> Result<BackupImportDBRequest, String> {
        match self.version.as_deref() {
            None => return Err("Invalid backup: missing 'version'".to_string()),
            Some(BACKUP_FORMAT_VERSION) => {}
            Some(other) => return Err(format!("Unsupported backup version '{other}', expected '{BACKUP_FORMAT_VERSION}'")),
        }

        let data = self.data.ok_or_else(|| "Invalid backup: missing 'data'".to_string())?;
        if data.users.is_none() && data.model_prices.is_none() && data.user_usage_records.is_none() {
            return Err("Invalid backup: 'data' must contain at least one of users, model_prices, user_usage_records".to_string());
        }

        let users = data
            .users
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(UserDBResponse {
                    id: required(row.id, "users", i, "id")?,
                    email: required(row.email, "users", i, "email")?,
                    name: required(row.name, "users", i, "name")?,
                    role: row.role.unwrap_or_else(|| "user".to_string()),
                    balance: row.balance.unwrap_or_default(),
                    deleted: row.deleted.unwrap_or(false),
                    created_at: row.created_at.unwrap_or(now),
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        let model_prices = data
            .model_prices
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let model = ModelPriceDBResponse {
                    id: required(row.id, "model_prices", i, "id")?,
                    name: required(row.name, "model_prices", i, "name")?,
                    base_model_id: row.base_model_id,
                    input_price: row.input_price.unwrap_or(default_prices.input_price),
                    output_price: row.output_price.unwrap_or(default_prices.output_price),
                    per_msg_price: row.per_msg_price.unwrap_or(default_prices.per_msg_price),
                    updated_at: row.updated_at.unwrap_or(now),
                };
                model.prices().check_range().map_err(|e| format!("model_prices[{i}]: {e}"))?;
                Ok(model)
            })
            .collect::<Result<Vec<_>, String>>()?;

        let user_usage_records = data
            .user_usage_records
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let user_id = required(row.user_id, "user_usage_records", i, "user_id")?;
                Ok(UsageRecordImportRow {
                    id: row.id,
                    nickname: row.nickname.unwrap_or_else(|| user_id.clone()),
                    user_id,
                    use_time: required(row.use_time, "user_usage_records", i, "use_time")?,
                    model_name: required(row.model_name, "user_usage_records", i, "model_name")?,
                    input_tokens: row.input_tokens.unwrap_or(0),
                    output_tokens: row.output_tokens.unwrap_or(0),
                    cost: row.cost.unwrap_or_default(),
                    balance_after: row.balance_after.unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(BackupImportDBRequest {
            users,
            model_prices,
            user_usage_records,
        })
    }
}
