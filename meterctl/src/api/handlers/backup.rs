use crate::AppState;
use crate::api::extract::ValidJson;
use crate::api::models::backup::ImportResponse;
use crate::auth::AdminAuth;
use crate::db::handlers::{Backups, backup::ImportError};
use crate::db::models::backup::{BACKUP_FORMAT_VERSION, BackupPayload, BackupSnapshot};
use crate::errors::{Error, ErrorResponse, Result};
use axum::{Json, extract::State};
use chrono::Utc;
use tracing::info;

/// Largest import body accepted, in bytes
pub const IMPORT_BODY_LIMIT: usize = 100 * 1024 * 1024;

#[utoipa::path(
    get,
    path = "/panel/database/export",
    tag = "backup",
    summary = "Export all metering data",
    description = "Users, model prices and usage records read from one consistent snapshot.",
    responses(
        (status = 200, description = "Backup document", content_type = "application/json"),
        (status = 401, description = "Missing or wrong administrative credential", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn export_database(State(state): State<AppState>, _: AdminAuth) -> Result<Json<BackupSnapshot>> {
    let mut conn = state.db.acquire().await?;
    let data = Backups::new(&mut conn).export().await?;

    info!(
        users = data.users.len(),
        model_prices = data.model_prices.len(),
        user_usage_records = data.user_usage_records.len(),
        "Database exported"
    );

    Ok(Json(BackupSnapshot {
        version: BACKUP_FORMAT_VERSION.to_string(),
        timestamp: Utc::now(),
        data,
    }))
}

#[utoipa::path(
    post,
    path = "/panel/database/import",
    tag = "backup",
    summary = "Replace all metering data",
    description = "Truncates the three tables and inserts the rows from a backup document in one transaction. \
                   If any row fails, nothing changes.",
    request_body(content_type = "application/json", description = "A document produced by the export endpoint"),
    responses(
        (status = 200, description = "Import committed", body = ImportResponse),
        (status = 400, description = "Invalid document or a row was rejected", body = ErrorResponse),
        (status = 401, description = "Missing or wrong administrative credential", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn import_database(
    State(state): State<AppState>,
    _: AdminAuth,
    ValidJson(payload): ValidJson<BackupPayload>,
) -> Result<Json<ImportResponse>> {
    let request = payload
        .validate(state.config.pricing.default_prices(), Utc::now())
        .map_err(|message| Error::BadRequest { message })?;

    let mut conn = state.db.acquire().await?;
    let counts = Backups::new(&mut conn).import(&request).await.map_err(|err| match err {
        ImportError::Row { source, .. } if source.is_transient() => Error::Database(source),
        ImportError::Row { table, index, source } => Error::BadRequest {
            message: format!("{table}[{index}]: {}", Error::Database(source).user_message()),
        },
        ImportError::Database(db_err) => Error::Database(db_err),
    })?;

    Ok(Json(counts.into()))
}

#[cfg(test)]
mod tests {
    use crate::api::models::pagination::PaginatedResponse;
    use crate::api::models::users::UserResponse;
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_export_then_import_restores_state(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        create_test_user(&pool, "u1", Decimal::new(1234, 2)).await;
        create_test_model(&pool, "gpt-4o", Decimal::from(2), Decimal::from(8), Decimal::NEGATIVE_ONE).await;

        let (name, value) = admin_auth();
        let snapshot: serde_json::Value = app.get("/api/v1/panel/database/export").add_header(name, value).await.json();
        assert_eq!(snapshot["version"], json!("1.0"));
        assert_eq!(snapshot["data"]["users"].as_array().unwrap().len(), 1);
        assert_eq!(snapshot["data"]["model_prices"].as_array().unwrap().len(), 1);

        sqlx::query("UPDATE users SET balance = 0").execute(&pool).await.unwrap();
        create_test_user(&pool, "u2", Decimal::ONE).await;

        let (name, value) = admin_auth();
        let response = app
            .post("/api/v1/panel/database/import")
            .add_header(name, value)
            .json(&snapshot)
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["imported"]["users"], json!(1));
        assert_eq!(body["imported"]["model_prices"], json!(1));

        let (name, value) = admin_auth();
        let users: PaginatedResponse<UserResponse> = app.get("/api/v1/users").add_header(name, value).await.json();
        assert_eq!(users.total, 1);
        assert_eq!(users.data[0].id, "u1");
        assert_eq!(users.data[0].balance, Decimal::new(1234, 2));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_failed_import_leaves_data_untouched(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        create_test_user(&pool, "u1", Decimal::from(5)).await;

        let duplicate = json!({"id": "dup", "email": "dup@example.com", "name": "Dup"});
        let (name, value) = admin_auth();
        let response = app
            .post("/api/v1/panel/database/import")
            .add_header(name, value)
            .json(&json!({"version": "1.0", "data": {"users": [duplicate, duplicate]}}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert!(body["error"].as_str().unwrap().starts_with("users[1]"));

        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM users").fetch_all(&pool).await.unwrap();
        assert_eq!(ids, vec!["u1".to_string()]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_import_rejects_unknown_version(pool: PgPool) {
        let app = create_test_app(pool).await;

        let (name, value) = admin_auth();
        let response = app
            .post("/api/v1/panel/database/import")
            .add_header(name, value)
            .json(&json!({"version": "2.0", "data": {"users": []}}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error_type"], json!("validation_error"));
    }
}
