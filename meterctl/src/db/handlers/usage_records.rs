//! Database repository for the append-only usage record store.

use crate::db::{
    errors::Result,
    models::usage_records::{UsageRecordCreateDBRequest, UsageRecordDBResponse},
};
use crate::types::abbrev_id;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

/// Filter for listing usage records
#[derive(Debug, Clone, Default)]
pub struct UsageRecordFilter {
    pub skip: i64,
    pub limit: i64,
    pub user_id: Option<String>,
    pub model_name: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl UsageRecordFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }
}

const FILTER_CLAUSE: &str = r#"
    WHERE ($1::TEXT IS NULL OR user_id = $1)
      AND ($2::TEXT IS NULL OR model_name = $2)
      AND ($3::TIMESTAMPTZ IS NULL OR use_time >= $3)
      AND ($4::TIMESTAMPTZ IS NULL OR use_time <= $4)
"#;

pub struct UsageRecords<'c> {
    db: &'c mut PgConnection,
}

impl<'c> UsageRecords<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Append one record. Records are never updated or deleted afterwards.
    #[instrument(skip(self, request), fields(user_id = %abbrev_id(&request.user_id), model = %request.model_name), err)]
    pub async fn append(&mut self, request: &UsageRecordCreateDBRequest) -> Result<UsageRecordDBResponse> {
        let record = sqlx::query_as::<_, UsageRecordDBResponse>(
            r#"
            INSERT INTO user_usage_records
                (user_id, nickname, model_name, input_tokens, output_tokens, cost, balance_after)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, nickname, use_time, model_name, input_tokens, output_tokens, cost, balance_after
            "#,
        )
        .bind(&request.user_id)
        .bind(&request.nickname)
        .bind(&request.model_name)
        .bind(request.input_tokens)
        .bind(request.output_tokens)
        .bind(request.cost)
        .bind(request.balance_after)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(record)
    }

    /// Newest first
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &UsageRecordFilter) -> Result<Vec<UsageRecordDBResponse>> {
        let records = sqlx::query_as::<_, UsageRecordDBResponse>(&format!(
            r#"
            SELECT id, user_id, nickname, use_time, model_name, input_tokens, output_tokens, cost, balance_after
            FROM user_usage_records
            {FILTER_CLAUSE}
            ORDER BY use_time DESC, id DESC
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(&filter.user_id)
        .bind(&filter.model_name)
        .bind(filter.since)
        .bind(filter.until)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(records)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &UsageRecordFilter) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM user_usage_records {FILTER_CLAUSE}"))
            .bind(&filter.user_id)
            .bind(&filter.model_name)
            .bind(filter.since)
            .bind(filter.until)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::DbError;
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    fn record(user_id: &str, model: &str) -> UsageRecordCreateDBRequest {
        UsageRecordCreateDBRequest {
            user_id: user_id.to_string(),
            nickname: user_id.to_uppercase(),
            model_name: model.to_string(),
            input_tokens: 10,
            output_tokens: 5,
            cost: Decimal::new(9, 4),
            balance_after: Decimal::from(9),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_append_and_filter(pool: PgPool) {
        sqlx::query("INSERT INTO users (id, email, name) VALUES ('u1', 'u1@example.com', 'U1'), ('u2', 'u2@example.com', 'U2')")
            .execute(&pool)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = UsageRecords::new(&mut conn);

        let first = repo.append(&record("u1", "gpt-4")).await.unwrap();
        let second = repo.append(&record("u1", "claude")).await.unwrap();
        repo.append(&record("u2", "gpt-4")).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(first.cost, Decimal::new(9, 4));

        assert_eq!(repo.count(&UsageRecordFilter::new(0, 10)).await.unwrap(), 3);

        let by_user = UsageRecordFilter {
            user_id: Some("u1".to_string()),
            ..UsageRecordFilter::new(0, 10)
        };
        let records = repo.list(&by_user).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, second.id);

        let by_model = UsageRecordFilter {
            model_name: Some("gpt-4".to_string()),
            ..UsageRecordFilter::new(0, 1)
        };
        assert_eq!(repo.list(&by_model).await.unwrap().len(), 1);
        assert_eq!(repo.count(&by_model).await.unwrap(), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_append_requires_existing_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = UsageRecords::new(&mut conn);

        let err = repo.append(&record("nobody", "gpt-4")).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
