//! Database repository for the price catalog.

use crate::db::{
    errors::{DbError, Result},
    models::model_prices::{ModelPriceCreateDBRequest, ModelPriceDBResponse, Prices},
};
use sqlx::PgConnection;
use tracing::instrument;

const COLUMNS: &str = "id, name, base_model_id, input_price, output_price, per_msg_price, updated_at";

pub struct ModelPrices<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ModelPrices<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert the model if it is unknown and return its row.
    ///
    /// New rows copy the prices of their base model when that row already exists, otherwise they
    /// get the request's defaults. Existing rows keep their prices. A supplied display name
    /// replaces the stored one and a missing base id is filled in; when neither changes anything
    /// the existing row is read back without being locked.
    #[instrument(skip(self, request), fields(model_id = %request.id), err)]
    pub async fn get_or_create(&mut self, request: &ModelPriceCreateDBRequest) -> Result<ModelPriceDBResponse> {
        let inserted = sqlx::query_as::<_, ModelPriceDBResponse>(&format!(
            r#"
            INSERT INTO model_prices (id, name, base_model_id, input_price, output_price, per_msg_price)
            SELECT $1::TEXT, COALESCE($2::TEXT, $1::TEXT), $3::TEXT,
                   COALESCE(base.input_price, $4::NUMERIC),
                   COALESCE(base.output_price, $5::NUMERIC),
                   COALESCE(base.per_msg_price, $6::NUMERIC)
            FROM (SELECT 1) AS seed
            LEFT JOIN model_prices base ON base.id = $3::TEXT AND base.id <> $1::TEXT
            WHERE TRUE
            ON CONFLICT (id) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&request.id)
        .bind(&request.name)
        .bind(&request.base_model_id)
        .bind(request.default_prices.input_price)
        .bind(request.default_prices.output_price)
        .bind(request.default_prices.per_msg_price)
        .fetch_optional(&mut *self.db)
        .await?;

        if let Some(model) = inserted {
            return Ok(model);
        }

        let refreshed = sqlx::query_as::<_, ModelPriceDBResponse>(&format!(
            r#"
            UPDATE model_prices
            SET name = COALESCE($2::TEXT, name),
                base_model_id = COALESCE(base_model_id, $3::TEXT)
            WHERE id = $1
              AND (($2::TEXT IS NOT NULL AND name <> $2::TEXT)
                   OR (base_model_id IS NULL AND $3::TEXT IS NOT NULL))
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&request.id)
        .bind(&request.name)
        .bind(&request.base_model_id)
        .fetch_optional(&mut *self.db)
        .await?;

        match refreshed {
            Some(model) => Ok(model),
            None => self.get(&request.id).await?.ok_or(DbError::NotFound),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn get(&mut self, id: &str) -> Result<Option<ModelPriceDBResponse>> {
        let model = sqlx::query_as::<_, ModelPriceDBResponse>(&format!("SELECT {COLUMNS} FROM model_prices WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(model)
    }

    /// The whole catalog, ordered by id
    #[instrument(skip(self), err)]
    pub async fn list(&mut self) -> Result<Vec<ModelPriceDBResponse>> {
        let models = sqlx::query_as::<_, ModelPriceDBResponse>(&format!("SELECT {COLUMNS} FROM model_prices ORDER BY id"))
            .fetch_all(&mut *self.db)
            .await?;

        Ok(models)
    }

    /// Models that declare a base other than themselves
    #[instrument(skip(self), err)]
    pub async fn list_derived(&mut self) -> Result<Vec<ModelPriceDBResponse>> {
        let models = sqlx::query_as::<_, ModelPriceDBResponse>(&format!(
            "SELECT {COLUMNS} FROM model_prices WHERE base_model_id IS NOT NULL AND base_model_id <> id ORDER BY id"
        ))
        .fetch_all(&mut *self.db)
        .await?;

        Ok(models)
    }

    /// Direct price edit
    #[instrument(skip(self), err)]
    pub async fn update_prices(&mut self, id: &str, prices: Prices) -> Result<ModelPriceDBResponse> {
        let model = sqlx::query_as::<_, ModelPriceDBResponse>(&format!(
            r#"
            UPDATE model_prices
            SET input_price = $2, output_price = $3, per_msg_price = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(prices.input_price)
        .bind(prices.output_price)
        .bind(prices.per_msg_price)
        .fetch_optional(&mut *self.db)
        .await?;

        model.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), err)]
    pub async fn set_base_model_id(&mut self, id: &str, base_model_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE model_prices SET base_model_id = $2 WHERE id = $1")
            .bind(id)
            .bind(base_model_id)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Copy all three prices from `base_model_id` onto `id` in one statement.
    ///
    /// Returns `None` when the base row does not exist; the derived row is then left untouched.
    #[instrument(skip(self), err)]
    pub async fn copy_from_base(&mut self, id: &str, base_model_id: &str) -> Result<Option<ModelPriceDBResponse>> {
        let model = sqlx::query_as::<_, ModelPriceDBResponse>(
            r#"
            UPDATE model_prices AS derived
            SET input_price = base.input_price,
                output_price = base.output_price,
                per_msg_price = base.per_msg_price,
                updated_at = NOW()
            FROM model_prices AS base
            WHERE derived.id = $1 AND base.id = $2
            RETURNING derived.id, derived.name, derived.base_model_id, derived.input_price,
                      derived.output_price, derived.per_msg_price, derived.updated_at
            "#,
        )
        .bind(id)
        .bind(base_model_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sqlx::PgPool;

    fn defaults() -> Prices {
        Prices {
            input_price: Decimal::from(60),
            output_price: Decimal::from(60),
            per_msg_price: Decimal::NEGATIVE_ONE,
        }
    }

    fn create(id: &str, base: Option<&str>) -> ModelPriceCreateDBRequest {
        ModelPriceCreateDBRequest {
            id: id.to_string(),
            name: Some(id.to_uppercase()),
            base_model_id: base.map(str::to_string),
            default_prices: defaults(),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_or_create_is_idempotent(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ModelPrices::new(&mut conn);

        let first = repo.get_or_create(&create("gpt-4", None)).await.unwrap();
        assert_eq!(first.prices(), defaults());

        let edited = Prices {
            input_price: Decimal::from(30),
            ..defaults()
        };
        repo.update_prices("gpt-4", edited).await.unwrap();

        let again = repo.get_or_create(&create("gpt-4", None)).await.unwrap();
        assert_eq!(again.prices(), edited);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_or_create_inherits_existing_base_prices(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ModelPrices::new(&mut conn);

        repo.get_or_create(&create("gpt-4", None)).await.unwrap();
        let base_prices = Prices {
            input_price: Decimal::from(30),
            output_price: Decimal::from(90),
            per_msg_price: Decimal::NEGATIVE_ONE,
        };
        repo.update_prices("gpt-4", base_prices).await.unwrap();

        let derived = repo.get_or_create(&create("team.gpt-4", Some("gpt-4"))).await.unwrap();
        assert_eq!(derived.base_model_id.as_deref(), Some("gpt-4"));
        assert_eq!(derived.prices(), base_prices);

        let orphan = repo.get_or_create(&create("team.llama", Some("llama"))).await.unwrap();
        assert_eq!(orphan.prices(), defaults());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_or_create_fills_missing_base_only(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ModelPrices::new(&mut conn);

        repo.get_or_create(&create("custom", None)).await.unwrap();
        let filled = repo.get_or_create(&create("custom", Some("gpt-4"))).await.unwrap();
        assert_eq!(filled.base_model_id.as_deref(), Some("gpt-4"));

        let kept = repo.get_or_create(&create("custom", Some("claude"))).await.unwrap();
        assert_eq!(kept.base_model_id.as_deref(), Some("gpt-4"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_or_create_without_name_keeps_stored_name(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ModelPrices::new(&mut conn);

        let unnamed = ModelPriceCreateDBRequest {
            name: None,
            ..create("gpt-4o", None)
        };
        let inserted = repo.get_or_create(&unnamed).await.unwrap();
        assert_eq!(inserted.name, "gpt-4o");

        repo.get_or_create(&create("gpt-4o", None)).await.unwrap();
        let again = repo.get_or_create(&unnamed).await.unwrap();
        assert_eq!(again.name, "GPT-4O");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_copy_from_base(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ModelPrices::new(&mut conn);

        repo.get_or_create(&create("base", None)).await.unwrap();
        repo.get_or_create(&create("derived", Some("base"))).await.unwrap();
        let per_msg = Prices {
            per_msg_price: Decimal::new(2, 2),
            ..defaults()
        };
        repo.update_prices("base", per_msg).await.unwrap();

        let synced = repo.copy_from_base("derived", "base").await.unwrap().unwrap();
        assert_eq!(synced.prices(), per_msg);

        assert!(repo.copy_from_base("derived", "missing").await.unwrap().is_none());
        assert_eq!(repo.get("derived").await.unwrap().unwrap().prices(), per_msg);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_derived_excludes_self_references(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ModelPrices::new(&mut conn);

        repo.get_or_create(&create("base", None)).await.unwrap();
        repo.get_or_create(&create("a.base", Some("base"))).await.unwrap();
        repo.get_or_create(&create("loop", Some("loop"))).await.unwrap();

        let derived = repo.list_derived().await.unwrap();
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].id, "a.base");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_unknown_model(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = ModelPrices::new(&mut conn);

        assert!(matches!(repo.update_prices("nope", defaults()).await, Err(DbError::NotFound)));
        assert!(matches!(repo.set_base_model_id("nope", "base").await, Err(DbError::NotFound)));
    }
}
