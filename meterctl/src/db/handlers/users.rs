//! Database repository for users.
//!
//! Users are created the first time the gateway reports them and are never removed: `delete`
//! sets the `deleted` flag. The `balance` column is not written here, see [`super::Ledger`].

use crate::types::{UserId, abbrev_id};
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::users::{UserDBResponse, UserUpdateDBRequest, UserUpsertDBRequest},
};
use sqlx::PgConnection;
use tracing::instrument;

/// Filter for listing users
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
    /// Case-insensitive match against id, email and name
    pub search: Option<String>,
    /// `None` lists both live and soft-deleted users
    pub deleted: Option<bool>,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }

    fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")))
    }
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Count users matching the filter, ignoring pagination
    #[instrument(skip(self), err)]
    pub async fn count(&mut self, filter: &UserFilter) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE ($1::TEXT IS NULL OR id ILIKE $1 OR email ILIKE $1 OR name ILIKE $1)
              AND ($2::BOOLEAN IS NULL OR deleted = $2)
            "#,
        )
        .bind(filter.search_pattern())
        .bind(filter.deleted)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserUpsertDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    /// Insert the user, or refresh email/name/role if it already exists. Balance and the
    /// deleted flag of an existing row are left alone.
    #[instrument(skip(self, request), fields(user_id = %abbrev_id(&request.id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (id, email, name, role, balance)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email, name = EXCLUDED.name, role = EXCLUDED.role
            RETURNING id, email, name, role, balance, deleted, created_at
            "#,
        )
        .bind(&request.id)
        .bind(&request.email)
        .bind(&request.name)
        .bind(&request.role)
        .bind(request.initial_balance)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users = sqlx::query_as::<_, UserDBResponse>(
            r#"
            SELECT id, email, name, role, balance, deleted, created_at FROM users
            WHERE ($1::TEXT IS NULL OR id ILIKE $1 OR email ILIKE $1 OR name ILIKE $1)
              AND ($2::BOOLEAN IS NULL OR deleted = $2)
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.search_pattern())
        .bind(filter.deleted)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(users)
    }

    /// Soft delete. Returns false if the user does not exist or was already deleted.
    #[instrument(skip(self), fields(user_id = %abbrev_id(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET deleted = TRUE WHERE id = $1 AND NOT deleted")
            .bind(&id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_id(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            UPDATE users SET deleted = COALESCE($2, deleted)
            WHERE id = $1
            RETURNING id, email, name, role, balance, deleted, created_at
            "#,
        )
        .bind(&id)
        .bind(request.deleted)
        .fetch_optional(&mut *self.db)
        .await?;

        user.ok_or(DbError::NotFound)
    }
}
