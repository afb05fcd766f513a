//! The balance ledger: the only writer of `users.balance`.
//!
//! Every mutation is one SQL statement evaluated by Postgres, so concurrent charges against the
//! same user serialize on the row lock and none of them is lost. There is no floor: settlement may
//! drive a balance below zero, and refusing such users is left to the gateway.

use crate::db::errors::{DbError, Result};
use crate::types::abbrev_id;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use tracing::instrument;

pub struct Ledger<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Ledger<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Subtract `delta` from the balance and clamp the result to `ceiling`.
    ///
    /// A positive delta is a charge, a negative one a credit. Deleted or unknown users yield
    /// [`DbError::UserNotFoundOrDeleted`] and nothing is written.
    #[instrument(skip(self), fields(user_id = %abbrev_id(user_id)), err)]
    pub async fn apply_delta(&mut self, user_id: &str, delta: Decimal, ceiling: Decimal) -> Result<Decimal> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE users SET balance = LEAST(balance - $2, $3)
            WHERE id = $1 AND NOT deleted
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .bind(ceiling)
        .fetch_optional(&mut *self.db)
        .await?;

        balance.ok_or_else(|| DbError::UserNotFoundOrDeleted {
            user_id: user_id.to_string(),
        })
    }

    /// Administrative override of the balance.
    ///
    /// Last write wins: a charge racing with this call may be overwritten, so it must not be used
    /// while the user has live traffic. Soft-deleted users can be corrected too.
    #[instrument(skip(self), fields(user_id = %abbrev_id(user_id)), err)]
    pub async fn set_balance(&mut self, user_id: &str, balance: Decimal) -> Result<Decimal> {
        let balance: Option<Decimal> = sqlx::query_scalar("UPDATE users SET balance = $2 WHERE id = $1 RETURNING balance")
            .bind(user_id)
            .bind(balance)
            .fetch_optional(&mut *self.db)
            .await?;

        balance.ok_or(DbError::NotFound)
    }

    /// Current balance of a live user
    #[instrument(skip(self), fields(user_id = %abbrev_id(user_id)), err)]
    pub async fn balance(&mut self, user_id: &str) -> Result<Decimal> {
        let balance: Option<Decimal> = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1 AND NOT deleted")
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        balance.ok_or_else(|| DbError::UserNotFoundOrDeleted {
            user_id: user_id.to_string(),
        })
    }
}
