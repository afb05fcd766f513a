//! Price catalog maintenance: lazy creation of models and propagation of base-model prices to
//! the models derived from them.
//!
//! A derived model names its base through `base_model_id`. When the upstream metadata does not say,
//! the base is guessed from the model id with [`derive_base_model_id_from_naming_convention`].
//!
//! ```text
//! Unseen ──get_or_create──▶ Created ──update_prices──▶ ManuallyPriced
//!                              │                            │
//!                              └────────sync_one────────────┴──▶ SyncedFromBase (re-enterable)
//! ```

use crate::db::{
    errors::DbError,
    handlers::ModelPrices,
    models::model_prices::{ModelPriceCreateDBRequest, ModelPriceDBResponse, Prices},
};
use crate::metrics::BillingMetrics;
use crate::types::ModelId;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum PriceSyncError {
    #[error("Model {model_id} not found")]
    ModelNotFound { model_id: ModelId },

    #[error("Model {model_id} does not have a base model")]
    NoBaseModel { model_id: ModelId },

    #[error("Base model {base_model_id} of {model_id} not found")]
    BaseModelNotFound { model_id: ModelId, base_model_id: ModelId },

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<sqlx::Error> for PriceSyncError {
    fn from(err: sqlx::Error) -> Self {
        PriceSyncError::Database(err.into())
    }
}

/// Outcome of syncing one derived model during [`PriceSynchronizer::sync_all`]
#[derive(Debug)]
pub struct SyncResult {
    pub model_id: ModelId,
    pub name: String,
    pub base_model_id: Option<ModelId>,
    pub outcome: Result<ModelPriceDBResponse, PriceSyncError>,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Fallback used when a model carries no explicit base: the segment after the last `.`.
///
/// `"workspace.gpt-4o"` derives from `"gpt-4o"`; ids without a dot, or ending in one, have no base.
pub fn derive_base_model_id_from_naming_convention(model_id: &str) -> Option<ModelId> {
    let (_, base) = model_id.rsplit_once('.')?;
    (!base.is_empty() && base != model_id).then(|| base.to_string())
}

/// Add a model to the catalog if it is unknown and return its row.
///
/// `name` and `base_model_id` come from upstream metadata. A name replaces the stored one; without
/// it an existing row keeps its name. When no base is given the naming convention is tried and
/// the guess is persisted with the new row.
#[instrument(skip(conn, default_prices), err)]
pub async fn get_or_create_model(
    conn: &mut PgConnection,
    model_id: &str,
    name: Option<&str>,
    base_model_id: Option<&str>,
    default_prices: Prices,
) -> Result<ModelPriceDBResponse, DbError> {
    let base_model_id = base_model_id
        .filter(|base| !base.is_empty() && *base != model_id)
        .map(str::to_string)
        .or_else(|| derive_base_model_id_from_naming_convention(model_id));

    let request = ModelPriceCreateDBRequest {
        id: model_id.to_string(),
        name: name.filter(|name| !name.is_empty()).map(str::to_string),
        base_model_id,
        default_prices,
    };

    ModelPrices::new(conn).get_or_create(&request).await
}

/// Copies base-model prices onto derived models
pub struct PriceSynchronizer<'a> {
    pool: &'a PgPool,
    metrics: Option<&'a BillingMetrics>,
}

impl<'a> PriceSynchronizer<'a> {
    pub fn new(pool: &'a PgPool, metrics: Option<&'a BillingMetrics>) -> Self {
        Self { pool, metrics }
    }

    /// Make `model_id`'s prices equal to its base model's, in one transaction.
    #[instrument(skip(self), err)]
    pub async fn sync_one(&self, model_id: &str) -> Result<ModelPriceDBResponse, PriceSyncError> {
        let result = self.sync_one_inner(model_id).await;
        if let Some(metrics) = self.metrics {
            metrics.record_price_sync(result.is_ok());
        }
        result
    }

    async fn sync_one_inner(&self, model_id: &str) -> Result<ModelPriceDBResponse, PriceSyncError> {
        let mut tx = self.pool.begin().await?;
        let mut repo = ModelPrices::new(&mut tx);

        let model = repo.get(model_id).await?.ok_or_else(|| PriceSyncError::ModelNotFound {
            model_id: model_id.to_string(),
        })?;

        let base_model_id = match model.base_model_id.filter(|base| base != model_id) {
            Some(base) => base,
            None => {
                let base = derive_base_model_id_from_naming_convention(model_id).ok_or_else(|| PriceSyncError::NoBaseModel {
                    model_id: model_id.to_string(),
                })?;
                repo.set_base_model_id(model_id, &base).await?;
                base
            }
        };

        let synced = repo.copy_from_base(model_id, &base_model_id).await?;
        // Commit even without a base row so a freshly derived base id is kept
        tx.commit().await?;

        synced.ok_or(PriceSyncError::BaseModelNotFound {
            model_id: model_id.to_string(),
            base_model_id,
        })
    }

    /// Sync every model that declares a base. One model failing never stops the others.
    #[instrument(skip(self), err)]
    pub async fn sync_all(&self) -> Result<Vec<SyncResult>, DbError> {
        let derived = {
            let mut conn = self.pool.acquire().await?;
            ModelPrices::new(&mut conn).list_derived().await?
        };

        let mut results = Vec::with_capacity(derived.len());
        for model in derived {
            let outcome = self.sync_one(&model.id).await;
            if let Err(e) = &outcome {
                warn!(model_id = %model.id, "Price sync failed: {}", e);
            }
            results.push(SyncResult {
                model_id: model.id,
                name: model.name,
                base_model_id: model.base_model_id,
                outcome,
            });
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!("Synced prices for {} of {} derived models", succeeded, results.len());

        Ok(results)
    }
}
