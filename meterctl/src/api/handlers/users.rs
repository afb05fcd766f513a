use crate::AppState;
use crate::api::extract::ValidJson;
use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::users::{BalanceUpdate, BalanceUpdateResponse, ListUsersQuery, UserResponse, UserUpdate};
use crate::auth::AdminAuth;
use crate::db::errors::DbError;
use crate::db::handlers::{Ledger, Repository, Users, users::UserFilter};
use crate::db::models::users::UserUpdateDBRequest;
use crate::errors::{Error, ErrorResponse, Result};
use crate::types::UserId;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::info;

fn user_not_found(id: &str) -> impl FnOnce(DbError) -> Error + '_ {
    move |err| match err {
        DbError::NotFound => Error::NotFound {
            resource: "User".to_string(),
            id: id.to_string(),
        },
        other => Error::Database(other),
    }
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Page of users, newest first", body = PaginatedResponse<UserResponse>),
        (status = 401, description = "Missing or wrong administrative credential", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    _: AdminAuth,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = UserFilter {
        search: query.search.clone(),
        deleted: Some(query.deleted.unwrap_or(false)),
        ..UserFilter::new(skip, limit)
    };

    let mut conn = state.db.acquire().await?;
    let mut repo = Users::new(&mut conn);
    let users = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(Into::into).collect(),
        total,
        &query.pagination,
    )))
}

#[utoipa::path(
    put,
    path = "/users/{id}/balance",
    tag = "users",
    summary = "Override a user's balance",
    description = "Sets the balance to an absolute value. Last write wins, so avoid it while the user has traffic in flight.",
    params(("id" = String, Path, description = "User ID")),
    request_body = BalanceUpdate,
    responses(
        (status = 200, description = "Balance set", body = BalanceUpdateResponse),
        (status = 400, description = "Balance is not a number", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %id))]
pub async fn update_balance(
    State(state): State<AppState>,
    _: AdminAuth,
    Path(id): Path<UserId>,
    ValidJson(request): ValidJson<BalanceUpdate>,
) -> Result<Json<BalanceUpdateResponse>> {
    let balance = request.balance().map_err(|message| Error::BadRequest { message })?;

    let mut conn = state.db.acquire().await?;
    let balance = Ledger::new(&mut conn).set_balance(&id, balance).await.map_err(user_not_found(&id))?;

    info!(%balance, "Balance overridden");
    Ok(Json(BalanceUpdateResponse { id, balance }))
}

#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "users",
    summary = "Soft delete or restore a user",
    params(("id" = String, Path, description = "User ID")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %id))]
pub async fn update_user(
    State(state): State<AppState>,
    _: AdminAuth,
    Path(id): Path<UserId>,
    ValidJson(request): ValidJson<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await?;
    let user = Users::new(&mut conn)
        .update(
            id.clone(),
            &UserUpdateDBRequest {
                deleted: Some(request.deleted),
            },
        )
        .await
        .map_err(user_not_found(&id))?;

    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    summary = "Soft delete a user",
    description = "The row and its usage records are kept; the user is let through the gateway without being charged.",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found or already deleted", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %id))]
pub async fn delete_user(State(state): State<AppState>, _: AdminAuth, Path(id): Path<UserId>) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await?;
    if Users::new(&mut conn).delete(id.clone()).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "User".to_string(),
            id,
        })
    }
}
