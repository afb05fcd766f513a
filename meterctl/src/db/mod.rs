//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL. Queries are checked at
//! runtime (`sqlx::query_as`), so building the crate does not need a live database.
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (api handlers, billing, sync)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Migrations
//!
//! Migrations live in `migrations/`, one idempotent `CREATE TABLE IF NOT EXISTS` per table, and
//! are applied at startup through [`crate::migrator`].
//!
//! # Pool
//!
//! [`create_pool`] applies the configured pool limits and sets a server-side
//! `statement_timeout` on every new connection, so no query can hold a connection indefinitely.

pub mod errors;
pub mod handlers;
pub mod models;

use crate::config::DatabaseConfig;
use sqlx::{
    Executor, PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use std::{str::FromStr, time::Duration};

/// Build the connection pool described by `config`. Connections are opened lazily.
pub fn create_pool(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let options = PgConnectOptions::from_str(&config.url).map_err(|e| anyhow::anyhow!("Invalid database url: {e}"))?;
    let pool = &config.pool;
    let statement_timeout_ms = config.statement_timeout.as_millis();

    let pool = PgPoolOptions::new()
        .max_connections(pool.max_connections)
        .min_connections(pool.min_connections)
        .acquire_timeout(Duration::from_secs(pool.acquire_timeout_secs))
        .idle_timeout((pool.idle_timeout_secs > 0).then(|| Duration::from_secs(pool.idle_timeout_secs)))
        .max_lifetime((pool.max_lifetime_secs > 0).then(|| Duration::from_secs(pool.max_lifetime_secs)))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {statement_timeout_ms}").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect_lazy_with(options);

    Ok(pool)
}
