use crate::AppState;
use crate::api::extract::ValidJson;
use crate::api::models::billing::{InletRequest, InletResponse, OutletRequest, OutletResponse};
use crate::auth::ServiceAuth;
use crate::billing::{Identity, inlet, outlet::Settler};
use crate::errors::{Error, ErrorResponse, Result};
use axum::{Json, extract::State};

fn require_model(model: &str) -> Result<()> {
    if model.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "body.model is required".to_string(),
        });
    }
    Ok(())
}

fn require_user(identity: &Identity) -> Result<()> {
    if identity.id.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "user.id is required".to_string(),
        });
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/inlet",
    tag = "billing",
    summary = "Authorize a request",
    description = "Records the user and debits the configured pre-charge for the model before the upstream call. \
                   Soft-deleted users pass through with a balance of -1 and are not charged.",
    request_body = InletRequest,
    responses(
        (status = 200, description = "Request authorized", body = InletResponse),
        (status = 400, description = "Malformed payload", body = ErrorResponse),
        (status = 401, description = "Missing or wrong service credential", body = ErrorResponse),
        (status = 503, description = "Database temporarily unavailable", body = ErrorResponse),
    ),
    security(("ServiceAuth" = []))
)]
#[tracing::instrument(skip_all, fields(model = %request.body.model))]
pub async fn inlet(State(state): State<AppState>, _: ServiceAuth, ValidJson(request): ValidJson<InletRequest>) -> Result<Json<InletResponse>> {
    require_model(&request.body.model)?;
    let identity = Identity::from(request.user);
    require_user(&identity)?;

    let outcome = inlet::authorize(
        &state.db,
        &state.config.balance,
        &state.config.cost_on_inlet,
        state.metrics_recorder.as_ref(),
        &identity,
        &request.body.model,
    )
    .await?;

    Ok(Json(outcome.into()))
}

#[utoipa::path(
    post,
    path = "/outlet",
    tag = "billing",
    summary = "Settle a finished request",
    description = "Prices the call from the model's catalog entry, debits the user and appends a usage record in one \
                   transaction. Token counts come from `usage` when present, otherwise from the conversation: the last \
                   message is output, everything before it is input.",
    request_body = OutletRequest,
    responses(
        (status = 200, description = "Usage settled", body = OutletResponse),
        (status = 400, description = "Malformed payload", body = ErrorResponse),
        (status = 401, description = "Missing or wrong service credential", body = ErrorResponse),
        (status = 404, description = "User vanished between upsert and settlement", body = ErrorResponse),
        (status = 503, description = "Database temporarily unavailable", body = ErrorResponse),
    ),
    security(("ServiceAuth" = []))
)]
#[tracing::instrument(skip_all, fields(model = %request.body.model))]
pub async fn outlet(
    State(state): State<AppState>,
    _: ServiceAuth,
    ValidJson(request): ValidJson<OutletRequest>,
) -> Result<Json<OutletResponse>> {
    require_model(&request.body.model)?;
    let usage = request.token_usage(&state.tokenizer);
    let identity = Identity::from(request.user);
    require_user(&identity)?;

    let settler = Settler::new(
        &state.db,
        state.config.balance.ceiling,
        state.config.pricing.default_prices(),
        state.metrics_recorder.as_ref(),
    );
    let outcome = settler
        .settle_for(&identity, state.config.balance.initial_balance, &request.body.model, usage)
        .await?;

    Ok(Json(OutletResponse::new(&outcome, usage)))
}
