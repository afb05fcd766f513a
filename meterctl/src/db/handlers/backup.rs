//! Full-table export and import of the metering data.

use crate::db::{
    errors::DbError,
    models::{
        backup::{BackupImportCounts, BackupImportDBRequest, BackupTables, UsageRecordImportRow},
        model_prices::ModelPriceDBResponse,
        usage_records::UsageRecordDBResponse,
        users::UserDBResponse,
    },
};
use sqlx::{Connection, PgConnection};
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Failure while importing. Nothing from the payload is kept when this is returned.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to import {table}[{index}]: {source}")]
    Row {
        table: &'static str,
        index: usize,
        #[source]
        source: DbError,
    },

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<sqlx::Error> for ImportError {
    fn from(err: sqlx::Error) -> Self {
        ImportError::Database(err.into())
    }
}

fn row_error(table: &'static str, index: usize) -> impl FnOnce(sqlx::Error) -> ImportError {
    move |err| ImportError::Row {
        table,
        index,
        source: err.into(),
    }
}

pub struct Backups<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Backups<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Read all three tables from a single snapshot
    #[instrument(skip(self), err)]
    pub async fn export(&mut self) -> Result<BackupTables, DbError> {
        let mut tx = self.db.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let users = sqlx::query_as::<_, UserDBResponse>(
            "SELECT id, email, name, role, balance, deleted, created_at FROM users ORDER BY created_at, id",
        )
        .fetch_all(&mut *tx)
        .await?;

        let model_prices = sqlx::query_as::<_, ModelPriceDBResponse>(
            "SELECT id, name, base_model_id, input_price, output_price, per_msg_price, updated_at FROM model_prices ORDER BY id",
        )
        .fetch_all(&mut *tx)
        .await?;

        let user_usage_records = sqlx::query_as::<_, UsageRecordDBResponse>(
            r#"
            SELECT id, user_id, nickname, use_time, model_name, input_tokens, output_tokens, cost, balance_after
            FROM user_usage_records ORDER BY id
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(BackupTables {
            users,
            model_prices,
            user_usage_records,
        })
    }

    /// Replace the contents of all three tables with `request`, atomically.
    #[instrument(skip(self, request), fields(
        users = request.users.len(),
        model_prices = request.model_prices.len(),
        user_usage_records = request.user_usage_records.len(),
    ), err)]
    pub async fn import(&mut self, request: &BackupImportDBRequest) -> Result<BackupImportCounts, ImportError> {
        let mut tx = self.db.begin().await?;

        match Self::replace_all(&mut tx, request).await {
            Ok(counts) => {
                tx.commit().await?;
                info!(?counts, "Backup imported");
                Ok(counts)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback after failed import also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn replace_all(conn: &mut PgConnection, request: &BackupImportDBRequest) -> Result<BackupImportCounts, ImportError> {
        sqlx::query("TRUNCATE user_usage_records, model_prices, users RESTART IDENTITY")
            .execute(&mut *conn)
            .await?;

        for (index, user) in request.users.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO users (id, email, name, role, balance, deleted, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.role)
            .bind(user.balance)
            .bind(user.deleted)
            .bind(user.created_at)
            .execute(&mut *conn)
            .await
            .map_err(row_error("users", index))?;
        }

        for (index, model) in request.model_prices.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO model_prices (id, name, base_model_id, input_price, output_price, per_msg_price, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&model.id)
            .bind(&model.name)
            .bind(&model.base_model_id)
            .bind(model.input_price)
            .bind(model.output_price)
            .bind(model.per_msg_price)
            .bind(model.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(row_error("model_prices", index))?;
        }

        // Rows carrying their own id go first so the sequence can be moved past them
        let (with_id, without_id): (Vec<_>, Vec<_>) =
            request.user_usage_records.iter().enumerate().partition(|(_, record)| record.id.is_some());

        for (index, record) in with_id {
            Self::insert_record(conn, record).await.map_err(row_error("user_usage_records", index))?;
        }

        sqlx::query(
            r#"
            SELECT setval(
                pg_get_serial_sequence('user_usage_records', 'id'),
                COALESCE((SELECT MAX(id) FROM user_usage_records), 0) + 1,
                false
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        for (index, record) in without_id {
            Self::insert_record(conn, record).await.map_err(row_error("user_usage_records", index))?;
        }

        Ok(BackupImportCounts {
            users: request.users.len(),
            model_prices: request.model_prices.len(),
            user_usage_records: request.user_usage_records.len(),
        })
    }

    async fn insert_record(conn: &mut PgConnection, record: &UsageRecordImportRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_usage_records
                (id, user_id, nickname, use_time, model_name, input_tokens, output_tokens, cost, balance_after)
            VALUES (COALESCE($1, nextval(pg_get_serial_sequence('user_usage_records', 'id'))), $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.nickname)
        .bind(record.use_time)
        .bind(&record.model_name)
        .bind(record.input_tokens)
        .bind(record.output_tokens)
        .bind(record.cost)
        .bind(record.balance_after)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
