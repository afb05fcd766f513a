use crate::AppState;
use crate::api::models::pagination::PaginatedResponse;
use crate::api::models::records::{ListRecordsQuery, UsageRecordResponse};
use crate::auth::AdminAuth;
use crate::db::handlers::{UsageRecords, usage_records::UsageRecordFilter};
use crate::errors::{ErrorResponse, Result};
use axum::{
    Json,
    extract::{Query, State},
};

#[utoipa::path(
    get,
    path = "/records",
    tag = "records",
    summary = "List usage records",
    description = "Settled calls, newest first. Records are never modified after they are written.",
    params(ListRecordsQuery),
    responses(
        (status = 200, description = "Page of usage records", body = PaginatedResponse<UsageRecordResponse>),
        (status = 401, description = "Missing or wrong administrative credential", body = ErrorResponse),
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_records(
    State(state): State<AppState>,
    _: AdminAuth,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<PaginatedResponse<UsageRecordResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = UsageRecordFilter {
        user_id: query.user_id.clone(),
        model_name: query.model.clone(),
        ..UsageRecordFilter::new(skip, limit)
    };

    let mut conn = state.db.acquire().await?;
    let mut repo = UsageRecords::new(&mut conn);
    let records = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        records.into_iter().map(Into::into).collect(),
        total,
        &query.pagination,
    )))
}

#[cfg(test)]
mod tests {
    use crate::api::models::pagination::PaginatedResponse;
    use crate::api::models::records::UsageRecordResponse;
    use crate::test_utils::*;
    use serde_json::json;
    use sqlx::PgPool;

    async fn settle(app: &axum_test::TestServer, user: &str, model: &str) {
        let (name, value) = service_auth();
        app.post("/api/v1/outlet")
            .add_header(name, value)
            .json(&json!({
                "user": {"id": user, "email": format!("{user}@example.com"), "name": user},
                "body": {"model": model, "messages": []},
                "usage": {"input_tokens": 1, "output_tokens": 1}
            }))
            .await
            .assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_records_filters_by_user_and_model(pool: PgPool) {
        let app = create_test_app(pool).await;
        settle(&app, "u1", "gpt-4o").await;
        settle(&app, "u1", "gpt-4o-mini").await;
        settle(&app, "u2", "gpt-4o").await;

        let (name, value) = admin_auth();
        let all: PaginatedResponse<UsageRecordResponse> = app.get("/api/v1/records").add_header(name, value).await.json();
        assert_eq!(all.total, 3);
        // newest first
        assert_eq!(all.data[0].user_id, "u2");

        let (name, value) = admin_auth();
        let mine: PaginatedResponse<UsageRecordResponse> = app.get("/api/v1/records?user_id=u1").add_header(name, value).await.json();
        assert_eq!(mine.total, 2);
        assert!(mine.data.iter().all(|r| r.user_id == "u1"));

        let (name, value) = admin_auth();
        let filtered: PaginatedResponse<UsageRecordResponse> = app
            .get("/api/v1/records?user_id=u1&model=gpt-4o")
            .add_header(name, value)
            .await
            .json();
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.data[0].model_name, "gpt-4o");

        let (name, value) = admin_auth();
        let paged: PaginatedResponse<UsageRecordResponse> = app
            .get("/api/v1/records?page=2&page_size=2")
            .add_header(name, value)
            .await
            .json();
        assert_eq!(paged.total, 3);
        assert_eq!(paged.data.len(), 1);
    }
}
