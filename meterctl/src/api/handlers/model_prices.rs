use crate::AppState;
use crate::api::extract::ValidJson;
use crate::api::models::model_prices::{
    BatchPriceUpdateResponse, InletCostQuery, InletCostResponse, ModelPriceResponse, PriceUpdate, PriceUpdateRequest, PriceUpdateResult,
    SyncAllPricesResponse, SyncPriceRequest, SyncPriceResponse,
};
use crate::auth::AdminAuth;
use crate::db::handlers::ModelPrices;
use crate::db::models::model_prices::ModelPriceDBResponse;
use crate::errors::{Error, ErrorResponse, Result};
use crate::sync::{model_catalog::sync_models, prices::PriceSynchronizer};
use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use sqlx::PgConnection;
use tracing::{info, warn};

#[utoipa::path(
    get,
    path = "/models",
    tag = "models",
    summary = "Sync and list models",
    description = "Fetches the model list from the upstream gateway, adds unknown models to the catalog and returns \
                   the catalog entries of the listed models.",
    responses(
        (status = 200, description = "Models known upstream, with their prices", body = Vec<ModelPriceResponse>),
        (status = 401, description = "Missing or wrong administrative credential", body = ErrorResponse),
        (status = 500, description = "Upstream not configured or unreachable", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_models(State(state): State<AppState>, _: AdminAuth) -> Result<Json<Vec<ModelPriceResponse>>> {
    let fetcher = state.model_fetcher.as_deref().ok_or_else(|| Error::Configuration {
        message: "Upstream model catalog is not configured (set upstream.url or OPENWEBUI_DOMAIN)".to_string(),
    })?;

    let models = sync_models(&state.db, fetcher, state.config.pricing.default_prices()).await?;
    Ok(Json(models.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/models/prices",
    tag = "models",
    summary = "List the price catalog",
    responses(
        (status = 200, description = "Every model in the catalog", body = Vec<ModelPriceResponse>),
        (status = 401, description = "Missing or wrong administrative credential", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_prices(State(state): State<AppState>, _: AdminAuth) -> Result<Json<Vec<ModelPriceResponse>>> {
    let mut conn = state.db.acquire().await?;
    let models = ModelPrices::new(&mut conn).list().await?;
    Ok(Json(models.into_iter().map(Into::into).collect()))
}

async fn apply_update(conn: &mut PgConnection, update: &PriceUpdate) -> Result<ModelPriceDBResponse> {
    update.validate().map_err(|message| Error::BadRequest { message })?;

    let mut repo = ModelPrices::new(conn);
    let current = repo.get(&update.id).await?.ok_or_else(|| Error::NotFound {
        resource: "Model".to_string(),
        id: update.id.clone(),
    })?;

    Ok(repo.update_prices(&update.id, update.prices(&current.prices())).await?)
}

#[utoipa::path(
    post,
    path = "/models/price",
    tag = "models",
    summary = "Edit model prices",
    description = "Accepts a single `{id, input_price, output_price, per_msg_price?}` edit, answered with the updated \
                   model, or `{updates: [...]}`, answered with one result per edit. A failing edit in a batch does not \
                   stop the others.",
    request_body = PriceUpdateRequest,
    responses(
        (status = 200, description = "Prices updated (single edit)", body = ModelPriceResponse),
        (status = 200, description = "Per-edit results (batch)", body = BatchPriceUpdateResponse),
        (status = 400, description = "Negative or malformed prices", body = ErrorResponse),
        (status = 404, description = "Model not found", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_prices(
    State(state): State<AppState>,
    _: AdminAuth,
    ValidJson(request): ValidJson<PriceUpdateRequest>,
) -> Result<Response> {
    let mut conn = state.db.acquire().await?;

    match request {
        PriceUpdateRequest::Single(update) => {
            let model = apply_update(&mut conn, &update).await?;
            Ok(Json(ModelPriceResponse::from(model)).into_response())
        }
        PriceUpdateRequest::Batch { updates } => {
            let mut results = Vec::with_capacity(updates.len());
            for update in updates {
                let result = match apply_update(&mut conn, &update).await {
                    Ok(model) => PriceUpdateResult {
                        id: update.id,
                        success: true,
                        data: Some(model.into()),
                        error: None,
                    },
                    Err(e) => {
                        warn!(model_id = %update.id, "Price update failed: {}", e);
                        PriceUpdateResult {
                            id: update.id,
                            success: false,
                            data: None,
                            error: Some(e.user_message()),
                        }
                    }
                };
                results.push(result);
            }

            let updated_count = results.iter().filter(|r| r.success).count();
            info!("Updated prices for {} of {} models", updated_count, results.len());
            Ok(Json(BatchPriceUpdateResponse {
                success: true,
                updated_count,
                results,
            })
            .into_response())
        }
    }
}

#[utoipa::path(
    post,
    path = "/models/sync-price",
    tag = "models",
    summary = "Copy base-model prices onto one derived model",
    request_body = SyncPriceRequest,
    responses(
        (status = 200, description = "Prices synced", body = SyncPriceResponse),
        (status = 400, description = "The model has no base model", body = ErrorResponse),
        (status = 404, description = "The model or its base model is not in the catalog", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(model_id = %request.model_id))]
pub async fn sync_price(
    State(state): State<AppState>,
    _: AdminAuth,
    ValidJson(request): ValidJson<SyncPriceRequest>,
) -> Result<Json<SyncPriceResponse>> {
    let model = PriceSynchronizer::new(&state.db, state.metrics_recorder.as_ref())
        .sync_one(&request.model_id)
        .await?;

    Ok(Json(SyncPriceResponse {
        success: true,
        message: format!("Synced prices of {} from {}", model.id, model.base_model_id.as_deref().unwrap_or_default()),
        data: model.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/models/sync-all-prices",
    tag = "models",
    summary = "Copy base-model prices onto every derived model",
    description = "Each derived model is synced in its own transaction; failures are reported per model.",
    responses(
        (status = 200, description = "Per-model results", body = SyncAllPricesResponse),
        (status = 401, description = "Missing or wrong administrative credential", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn sync_all_prices(State(state): State<AppState>, _: AdminAuth) -> Result<Json<SyncAllPricesResponse>> {
    let results = PriceSynchronizer::new(&state.db, state.metrics_recorder.as_ref()).sync_all().await?;
    Ok(Json(SyncAllPricesResponse::new(results)))
}

#[utoipa::path(
    get,
    path = "/models/inlet-cost",
    tag = "models",
    summary = "Look up the inlet pre-charge for a model",
    params(InletCostQuery),
    responses(
        (status = 200, description = "Configured pre-charge, zero when none applies", body = InletCostResponse),
        (status = 400, description = "Missing model parameter", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_inlet_cost(State(state): State<AppState>, _: AdminAuth, Query(query): Query<InletCostQuery>) -> Result<Json<InletCostResponse>> {
    let model = query.model.filter(|m| !m.trim().is_empty()).ok_or_else(|| Error::BadRequest {
        message: "Query parameter 'model' is required".to_string(),
    })?;

    Ok(Json(InletCostResponse {
        success: true,
        cost: state.config.cost_on_inlet.cost_for(&model),
        model,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::models::model_prices::{
        BatchPriceUpdateResponse, InletCostResponse, ModelPriceResponse, SyncAllPricesResponse, SyncPriceResponse,
    };
    use crate::sync::model_catalog::{FetchModels, UpstreamModel, UpstreamModelInfo, UpstreamModelsResponse};
    use crate::test_utils::*;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::json;
    use sqlx::PgPool;
    use std::sync::Arc;

    struct StaticModels(Vec<UpstreamModel>);

    #[async_trait]
    impl FetchModels for StaticModels {
        async fn fetch(&self) -> anyhow::Result<UpstreamModelsResponse> {
            Ok(UpstreamModelsResponse { data: self.0.clone() })
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_models_requires_upstream(pool: PgPool) {
        let app = create_test_app(pool).await;

        let (name, value) = admin_auth();
        let response = app.get("/api/v1/models").add_header(name, value).await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error_type"], json!("configuration_error"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_models_syncs_from_upstream(pool: PgPool) {
        let fetcher = StaticModels(vec![
            UpstreamModel {
                id: "gpt-4o".to_string(),
                name: Some("GPT-4o".to_string()),
                info: None,
            },
            UpstreamModel {
                id: "helper".to_string(),
                name: Some("Helper".to_string()),
                info: Some(UpstreamModelInfo {
                    base_model_id: Some("gpt-4o".to_string()),
                }),
            },
        ]);
        let app = create_test_app_with_fetcher(pool.clone(), Arc::new(fetcher)).await;

        let (name, value) = admin_auth();
        let models: Vec<ModelPriceResponse> = app.get("/api/v1/models").add_header(name, value).await.json();
        assert_eq!(models.len(), 2);
        assert_eq!(models[1].base_model_id.as_deref(), Some("gpt-4o"));
        assert_eq!(models[0].input_price, Decimal::from(60));

        let (name, value) = admin_auth();
        let catalog: Vec<ModelPriceResponse> = app.get("/api/v1/models/prices").add_header(name, value).await.json();
        assert_eq!(catalog.len(), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_single_price_update(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        create_test_model(&pool, "gpt-4o", Decimal::from(60), Decimal::from(60), Decimal::NEGATIVE_ONE).await;

        let (name, value) = admin_auth();
        let response = app
            .post("/api/v1/models/price")
            .add_header(name, value)
            .json(&json!({"id": "gpt-4o", "input_price": 2.5, "output_price": 10}))
            .await;
        response.assert_status_ok();
        let model: ModelPriceResponse = response.json();
        assert_eq!(model.input_price, Decimal::new(25, 1));
        assert_eq!(model.per_msg_price, Decimal::NEGATIVE_ONE);

        let (name, value) = admin_auth();
        let response = app
            .post("/api/v1/models/price")
            .add_header(name, value)
            .json(&json!({"id": "gpt-4o", "input_price": -1, "output_price": 10}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let (name, value) = admin_auth();
        let response = app
            .post("/api/v1/models/price")
            .add_header(name, value)
            .json(&json!({"id": "missing", "input_price": 1, "output_price": 1}))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_price_update_range(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        create_test_model(&pool, "gpt-4o", Decimal::from(60), Decimal::from(60), Decimal::NEGATIVE_ONE).await;

        let (name, value) = admin_auth();
        let response = app
            .post("/api/v1/models/price")
            .add_header(name, value)
            .json(&json!({"id": "gpt-4o", "input_price": 1000000, "output_price": 10}))
            .await;
        response.assert_status_ok();
        let model: ModelPriceResponse = response.json();
        assert_eq!(model.input_price, Decimal::from(1_000_000));

        let (name, value) = admin_auth();
        let response = app
            .post("/api/v1/models/price")
            .add_header(name, value)
            .json(&json!({"id": "gpt-4o", "input_price": 1e10, "output_price": 10}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error_type"], "validation_error");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_batch_price_update_reports_each_row(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        create_test_model(&pool, "a", Decimal::ONE, Decimal::ONE, Decimal::NEGATIVE_ONE).await;
        create_test_model(&pool, "b", Decimal::ONE, Decimal::ONE, Decimal::NEGATIVE_ONE).await;

        let (name, value) = admin_auth();
        let body: BatchPriceUpdateResponse = app
            .post("/api/v1/models/price")
            .add_header(name, value)
            .json(&json!({"updates": [
                {"id": "a", "input_price": 3, "output_price": 4, "per_msg_price": 0.01},
                {"id": "ghost", "input_price": 3, "output_price": 4},
                {"id": "b", "input_price": 5, "output_price": 6}
            ]}))
            .await
            .json();

        assert_eq!(body.updated_count, 2);
        let failed: Vec<&str> = body.results.iter().filter(|r| !r.success).map(|r| r.id.as_str()).collect();
        assert_eq!(failed, vec!["ghost"]);
        assert_eq!(body.results[0].data.as_ref().unwrap().per_msg_price, Decimal::new(1, 2));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_sync_price_endpoints(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        create_test_model(&pool, "gpt-4o", Decimal::from(5), Decimal::from(15), Decimal::NEGATIVE_ONE).await;
        create_test_model(&pool, "team.gpt-4o", Decimal::from(60), Decimal::from(60), Decimal::NEGATIVE_ONE).await;
        create_test_model(&pool, "team.ghost", Decimal::from(60), Decimal::from(60), Decimal::NEGATIVE_ONE).await;

        let (name, value) = admin_auth();
        let response = app
            .post("/api/v1/models/sync-price")
            .add_header(name, value)
            .json(&json!({"modelId": "team.gpt-4o"}))
            .await;
        response.assert_status_ok();
        let synced: SyncPriceResponse = response.json();
        assert_eq!(synced.data.input_price, Decimal::from(5));
        assert_eq!(synced.data.output_price, Decimal::from(15));

        let (name, value) = admin_auth();
        let response = app
            .post("/api/v1/models/sync-price")
            .add_header(name, value)
            .json(&json!({"modelId": "gpt-4o"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let (name, value) = admin_auth();
        let all: SyncAllPricesResponse = app
            .post("/api/v1/models/sync-all-prices")
            .add_header(name, value)
            .json(&json!({}))
            .await
            .json();
        assert_eq!(all.results.len(), 2);
        assert_eq!(all.message, "Successfully synced 1 of 2 models");
        let ghost = all.results.iter().find(|r| r.id == "team.ghost").unwrap();
        assert!(!ghost.success);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_inlet_cost_lookup(pool: PgPool) {
        let mut config = create_test_config();
        config.cost_on_inlet = crate::config::InletCostTable::parse("gpt-4:0.32,default:0.02");
        let app = create_test_app_with_config(pool, config).await;

        let (name, value) = admin_auth();
        let body: InletCostResponse = app.get("/api/v1/models/inlet-cost?model=gpt-4").add_header(name, value).await.json();
        assert_eq!(body.cost, Decimal::new(32, 2));

        let (name, value) = admin_auth();
        let body: InletCostResponse = app.get("/api/v1/models/inlet-cost?model=other").add_header(name, value).await.json();
        assert_eq!(body.cost, Decimal::new(2, 2));

        let (name, value) = admin_auth();
        app.get("/api/v1/models/inlet-cost")
            .add_header(name, value)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
