//! Settlement of a finished call: price it, debit it, record it.

use crate::billing::{DELETED_USER_BALANCE, Identity};
use crate::db::{
    handlers::{Ledger, Repository, UsageRecords, Users},
    models::{
        model_prices::Prices,
        usage_records::{UsageRecordCreateDBRequest, UsageRecordDBResponse},
    },
};
use crate::errors::{Error, Result};
use crate::metrics::BillingMetrics;
use crate::sync::prices::get_or_create_model;
use crate::tokenizer::TokenUsage;
use crate::types::abbrev_id;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};

/// Token prices are quoted per this many tokens
const TOKENS_PER_PRICE_UNIT: i64 = 1_000_000;
/// Costs are stored with this many decimal places
const COST_DECIMAL_PLACES: u32 = 6;

/// Cost of one call.
///
/// A non-negative per-message price wins outright and ignores token counts. Otherwise the cost is
/// `(input * input_price + output * output_price) / 1_000_000`, rounded to 6 places.
pub fn compute_cost(prices: &Prices, input_tokens: u64, output_tokens: u64) -> Decimal {
    if !prices.per_msg_price.is_sign_negative() {
        return prices.per_msg_price;
    }

    let token_cost = Decimal::from(input_tokens) * prices.input_price + Decimal::from(output_tokens) * prices.output_price;
    (token_cost / Decimal::from(TOKENS_PER_PRICE_UNIT)).round_dp(COST_DECIMAL_PLACES)
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutletOutcome {
    /// The user is soft-deleted: pass through, nothing charged or recorded
    Deleted,
    Settled(UsageRecordDBResponse),
}

impl OutletOutcome {
    pub fn balance(&self) -> Decimal {
        match self {
            OutletOutcome::Deleted => DELETED_USER_BALANCE,
            OutletOutcome::Settled(record) => record.balance_after,
        }
    }

    pub fn cost(&self) -> Decimal {
        match self {
            OutletOutcome::Deleted => Decimal::ZERO,
            OutletOutcome::Settled(record) => record.cost,
        }
    }
}

/// Prices and charges finished calls
pub struct Settler<'a> {
    pool: &'a PgPool,
    ceiling: Decimal,
    default_prices: Prices,
    metrics: Option<&'a BillingMetrics>,
}

impl<'a> Settler<'a> {
    pub fn new(pool: &'a PgPool, ceiling: Decimal, default_prices: Prices, metrics: Option<&'a BillingMetrics>) -> Self {
        Self {
            pool,
            ceiling,
            default_prices,
            metrics,
        }
    }

    /// Record the reporting user, then settle unless they are soft-deleted.
    #[instrument(skip_all, fields(user_id = %abbrev_id(&identity.id), model = %model_id), err)]
    pub async fn settle_for(&self, identity: &Identity, initial_balance: Decimal, model_id: &str, usage: TokenUsage) -> Result<OutletOutcome> {
        let user = {
            let mut conn = self.pool.acquire().await?;
            Users::new(&mut conn).create(&identity.upsert_request(initial_balance)).await?
        };

        if user.deleted {
            debug!("User is deleted, passing through without settlement");
            return Ok(OutletOutcome::Deleted);
        }

        let record = self.settle(&user.id, &user.name, model_id, usage).await?;
        Ok(OutletOutcome::Settled(record))
    }

    /// Charge `user_id` for `usage` on `model_id` and append the usage record, atomically.
    ///
    /// Unknown models are added to the catalog first. A missing or deleted user fails with
    /// `UserNotFoundOrDeleted` and leaves no record behind.
    #[instrument(skip(self, nickname), fields(user_id = %abbrev_id(user_id)), err)]
    pub async fn settle(&self, user_id: &str, nickname: &str, model_id: &str, usage: TokenUsage) -> Result<UsageRecordDBResponse> {
        let result = self.settle_inner(user_id, nickname, model_id, usage).await;

        if let Some(metrics) = self.metrics {
            match &result {
                Ok(record) => metrics.record_settlement(model_id, record.cost, usage.input_tokens as u64, usage.output_tokens as u64),
                Err(_) => metrics.record_settlement_error(),
            }
        }

        result
    }

    async fn settle_inner(&self, user_id: &str, nickname: &str, model_id: &str, usage: TokenUsage) -> Result<UsageRecordDBResponse> {
        let input_tokens = token_column(usage.input_tokens, "input")?;
        let output_tokens = token_column(usage.output_tokens, "output")?;

        let mut tx = self.pool.begin().await?;

        let model = get_or_create_model(&mut tx, model_id, None, None, self.default_prices).await?;
        let cost = compute_cost(&model.prices(), usage.input_tokens as u64, usage.output_tokens as u64);

        let balance_after = Ledger::new(&mut tx).apply_delta(user_id, cost, self.ceiling).await?;

        let record = UsageRecords::new(&mut tx)
            .append(&UsageRecordCreateDBRequest {
                user_id: user_id.to_string(),
                nickname: nickname.to_string(),
                model_name: model_id.to_string(),
                input_tokens,
                output_tokens,
                cost,
                balance_after,
            })
            .await?;

        tx.commit().await?;

        debug!(%cost, %balance_after, "Settled usage");
        Ok(record)
    }
}

fn token_column(tokens: usize, kind: &str) -> Result<i32> {
    i32::try_from(tokens).map_err(|_| Error::BadRequest {
        message: format!("{kind} token count {tokens} is out of range"),
    })
}
