//! Request extractors shared by the handlers.

use crate::errors::Error;
use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;

/// `Json<T>` whose rejections use the API error body (`validation_error`, 400) instead of
/// axum's plain-text response.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| Error::BadRequest {
            message: format!("Invalid request body: {}", rejection.body_text()),
        })?;
        Ok(ValidJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::post};
    use axum_test::TestServer;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Payload {
        amount: i64,
    }

    async fn echo(ValidJson(payload): ValidJson<Payload>) -> String {
        payload.amount.to_string()
    }

    #[tokio::test]
    async fn test_rejections_use_error_body() {
        let server = TestServer::new(Router::new().route("/echo", post(echo))).unwrap();

        server.post("/echo").json(&json!({"amount": 3})).await.assert_text("3");

        let response = server.post("/echo").json(&json!({"amount": "three"})).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error_type"], json!("validation_error"));
    }
}
