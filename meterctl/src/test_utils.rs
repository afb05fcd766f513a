//! Test utilities shared by the handler and integration tests.

use crate::config::{Config, DatabaseConfig, PoolSettings};
use crate::db::handlers::{ModelPrices, Repository, Users};
use crate::db::models::{
    model_prices::{ModelPriceDBResponse, Prices},
    users::{UserDBResponse, UserUpsertDBRequest},
};
use crate::sync::{model_catalog::FetchModels, prices::get_or_create_model};
use crate::tokenizer::Tokenizer;
use crate::{AppState, Application, build_router};
use axum_test::TestServer;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;

pub const TEST_API_KEY: &str = "test-api-key";
pub const TEST_ACCESS_TOKEN: &str = "test-access-token";

/// reqwest is built without a default TLS provider, so tests that build a client install one
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig {
            pool: PoolSettings {
                max_connections: 2,
                min_connections: 0,
                ..Default::default()
            },
            // Will get overriden by the pool handed in by sqlx::test
            url: "postgres://localhost/unused".to_string(),
            ..Default::default()
        },
        api_key: Some(TEST_API_KEY.to_string()),
        access_token: Some(TEST_ACCESS_TOKEN.to_string()),
        enable_metrics: false,
        ..Default::default()
    }
}

pub async fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with_config(pool, create_test_config()).await
}

pub async fn create_test_app_with_config(pool: PgPool, config: Config) -> TestServer {
    let app = Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application");

    app.into_test_server()
}

/// An app whose `/models` endpoint reads from `fetcher` instead of a real upstream
pub async fn create_test_app_with_fetcher(pool: PgPool, fetcher: Arc<dyn FetchModels>) -> TestServer {
    let mut state = AppState::builder()
        .db(pool)
        .config(create_test_config())
        .tokenizer(Arc::new(Tokenizer::cl100k().expect("Failed to load tokenizer")))
        .model_fetcher(fetcher)
        .build();

    let router = build_router(&mut state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

/// Header for the gateway hooks, as `(name, value)`
pub fn service_auth() -> (&'static str, String) {
    ("authorization", format!("Bearer {TEST_API_KEY}"))
}

/// Header for the administrative endpoints, as `(name, value)`
pub fn admin_auth() -> (&'static str, String) {
    ("authorization", format!("Bearer {TEST_ACCESS_TOKEN}"))
}

pub async fn create_test_user(pool: &PgPool, id: &str, balance: Decimal) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .create(&UserUpsertDBRequest {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: format!("{id} name"),
            role: "user".to_string(),
            initial_balance: balance,
        })
        .await
        .expect("Failed to create test user")
}

pub async fn create_test_model(
    pool: &PgPool,
    id: &str,
    input_price: Decimal,
    output_price: Decimal,
    per_msg_price: Decimal,
) -> ModelPriceDBResponse {
    let prices = Prices {
        input_price,
        output_price,
        per_msg_price,
    };

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    get_or_create_model(&mut conn, id, None, None, prices)
        .await
        .expect("Failed to create test model");
    ModelPrices::new(&mut conn)
        .update_prices(id, prices)
        .await
        .expect("Failed to set test model prices")
}
