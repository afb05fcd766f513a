//! Pre-charge authorization, run before the upstream call.

use crate::billing::{DELETED_USER_BALANCE, Identity};
use crate::config::{BalanceConfig, InletCostTable};
use crate::db::{
    errors::DbError,
    handlers::{Ledger, Repository, Users},
};
use crate::metrics::BillingMetrics;
use crate::types::abbrev_id;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InletOutcome {
    /// The user is soft-deleted: pass through, nothing charged
    Deleted,
    /// `pre_charge` was debited (possibly zero) leaving `balance`
    Authorized { balance: Decimal, pre_charge: Decimal },
}

impl InletOutcome {
    pub fn balance(&self) -> Decimal {
        match self {
            InletOutcome::Deleted => DELETED_USER_BALANCE,
            InletOutcome::Authorized { balance, .. } => *balance,
        }
    }

    pub fn pre_charge(&self) -> Decimal {
        match self {
            InletOutcome::Deleted => Decimal::ZERO,
            InletOutcome::Authorized { pre_charge, .. } => *pre_charge,
        }
    }
}

/// Record the user and debit the configured pre-charge for `model_id`.
///
/// A zero pre-charge reads the balance without writing to the ledger.
#[instrument(skip_all, fields(user_id = %abbrev_id(&identity.id), model = %model_id), err)]
pub async fn authorize(
    pool: &PgPool,
    balance_config: &BalanceConfig,
    costs: &InletCostTable,
    metrics: Option<&BillingMetrics>,
    identity: &Identity,
    model_id: &str,
) -> Result<InletOutcome, DbError> {
    let mut conn = pool.acquire().await?;

    let user = Users::new(&mut conn)
        .create(&identity.upsert_request(balance_config.initial_balance))
        .await?;

    if user.deleted {
        debug!("User is deleted, passing through without charge");
        if let Some(metrics) = metrics {
            metrics.record_inlet_deleted();
        }
        return Ok(InletOutcome::Deleted);
    }

    let pre_charge = costs.cost_for(model_id);
    let balance = if pre_charge.is_zero() {
        user.balance
    } else {
        Ledger::new(&mut conn)
            .apply_delta(&identity.id, pre_charge, balance_config.ceiling)
            .await?
    };

    if let Some(metrics) = metrics {
        metrics.record_inlet(costs.entry_for(model_id), pre_charge);
    }

    Ok(InletOutcome::Authorized { balance, pre_charge })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: id.to_string(),
            role: "user".to_string(),
        }
    }

    fn balance_config(initial: &str) -> BalanceConfig {
        BalanceConfig {
            initial_balance: dec(initial),
            ..BalanceConfig::default()
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_authorize_debits_pre_charge(pool: PgPool) {
        let costs = InletCostTable::parse("gpt-4:0.5,default:0.1");

        let outcome = authorize(&pool, &balance_config("10"), &costs, None, &identity("u1"), "gpt-4").await.unwrap();
        assert_eq!(outcome, InletOutcome::Authorized {
            balance: dec("9.5"),
            pre_charge: dec("0.5"),
        });

        let outcome = authorize(&pool, &balance_config("10"), &costs, None, &identity("u1"), "other").await.unwrap();
        assert_eq!(outcome.balance(), dec("9.4"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_authorize_zero_cost_does_not_write(pool: PgPool) {
        let costs = InletCostTable::default();

        let outcome = authorize(&pool, &balance_config("3"), &costs, None, &identity("u1"), "gpt-4").await.unwrap();
        assert_eq!(outcome.balance(), dec("3"));
        assert_eq!(outcome.pre_charge(), Decimal::ZERO);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_authorize_deleted_user_passes_through(pool: PgPool) {
        let costs = InletCostTable::parse("1");
        authorize(&pool, &balance_config("10"), &costs, None, &identity("u1"), "gpt-4").await.unwrap();
        sqlx::query("UPDATE users SET deleted = TRUE WHERE id = 'u1'").execute(&pool).await.unwrap();

        let outcome = authorize(&pool, &balance_config("10"), &costs, None, &identity("u1"), "gpt-4").await.unwrap();
        assert_eq!(outcome, InletOutcome::Deleted);
        assert_eq!(outcome.balance(), dec("-1"));

        let balance: Decimal = sqlx::query_scalar("SELECT balance FROM users WHERE id = 'u1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(balance, dec("9"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_authorize_metrics_labels(pool: PgPool) {
        use prometheus::{Encoder, Registry, TextEncoder};

        let registry = Registry::new();
        let metrics = BillingMetrics::new(&registry).unwrap();
        let costs = InletCostTable::parse("gpt-4:0.5,default:0.1");

        authorize(&pool, &balance_config("10"), &costs, Some(&metrics), &identity("u1"), "gpt-4").await.unwrap();
        authorize(&pool, &balance_config("10"), &costs, Some(&metrics), &identity("u1"), "made-up-model").await.unwrap();
        sqlx::query("UPDATE users SET deleted = TRUE WHERE id = 'u1'").execute(&pool).await.unwrap();
        authorize(&pool, &balance_config("10"), &costs, Some(&metrics), &identity("u1"), "gpt-4").await.unwrap();

        let mut buffer = vec![];
        TextEncoder::new().encode(&registry.gather(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains(r#"meterctl_inlet_requests_total{outcome="deleted"} 1"#), "{text}");
        assert!(text.contains(r#"entry="default""#), "{text}");
        assert!(!text.contains("made-up-model"), "{text}");
        assert!(!text.contains("blocked"), "{text}");
    }
}
