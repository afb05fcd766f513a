//! # meterctl: usage metering and balance settlement for LLM gateways
//!
//! `meterctl` sits beside an LLM gateway and keeps a prepaid balance per user. The gateway calls
//! it twice per completion: once before the upstream call (the *inlet*) and once after it (the
//! *outlet*). In between, `meterctl` is not involved, so an upstream failure never leaves the
//! ledger half-written.
//!
//! ## Request Flow
//!
//! ```text
//! gateway ──POST /api/v1/inlet──▶  upsert user, debit flat pre-charge
//!    │
//!    ├──── upstream LLM call ────
//!    │
//!    └──POST /api/v1/outlet──▶ count tokens, price the call, debit the
//!                               balance and append a usage record in
//!                               one transaction
//! ```
//!
//! Prices live in a catalog keyed by model id. Models are created lazily the first time they are
//! seen, with default prices or the prices of their base model. Administrators edit prices,
//! propagate base prices to derived models, override balances, soft delete users and take full
//! database backups through the administrative endpoints.
//!
//! ### Core Components
//!
//! - [`billing`]: the inlet pre-charge and the outlet settlement
//! - [`db`]: repositories for users, the ledger, the price catalog, usage records and backups
//! - [`sync`]: upstream model discovery and base-to-derived price propagation
//! - [`api`]: axum handlers and the JSON contract
//! - [`auth`]: bearer credential extractors for the two callers
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use meterctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = meterctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     meterctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod errors;
mod metrics;
mod openapi;
mod sync;
pub mod telemetry;
mod tokenizer;
mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    metrics::BillingMetrics,
    openapi::ApiDoc,
    sync::model_catalog::{FetchModels, FetchModelsReqwest},
    tokenizer::Tokenizer,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    routing::{get, patch, post, put},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, error, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{ModelId, UserId};

/// Application state shared across all request handlers.
///
/// - `db`: PostgreSQL connection pool
/// - `config`: Application configuration loaded from file and environment
/// - `tokenizer`: BPE tokenizer used when the gateway does not report usage
/// - `metrics_recorder`: Billing counters, present when metrics are enabled
/// - `model_fetcher`: Upstream model catalog client, present when `upstream` is configured
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .tokenizer(Arc::new(Tokenizer::cl100k()?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub tokenizer: Arc<Tokenizer>,
    pub metrics_recorder: Option<BillingMetrics>,
    pub model_fetcher: Option<Arc<dyn FetchModels>>,
}

/// Get the meterctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create CORS layer from configuration. `*` allows any origin.
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allow_origin = if config.cors_allowed_origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins = config
            .cors_allowed_origins
            .iter()
            .map(|origin| origin.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
        ]))
}

/// Build the application router with all endpoints and middleware.
///
/// - Gateway hooks and administrative routes under `/api/v1`
/// - Liveness at `/healthz` and the API reference at `/docs`
/// - Optional Prometheus metrics at `/internal/metrics`
/// - CORS and tracing middleware
///
/// The billing metrics recorder is created here when metrics are enabled and the state does not
/// carry one yet.
#[instrument(skip_all)]
pub fn build_router(state: &mut AppState) -> anyhow::Result<Router> {
    use api::handlers::{backup, billing, model_prices, records, users};

    if state.config.enable_metrics && state.metrics_recorder.is_none() {
        let registry = prometheus::Registry::new();
        let metrics = BillingMetrics::new(&registry).map_err(|e| anyhow::anyhow!("Failed to create billing metrics: {}", e))?;
        state.metrics_recorder = Some(metrics);
    }

    let api_routes = Router::new()
        // Gateway hooks
        .route("/inlet", post(billing::inlet))
        .route("/outlet", post(billing::outlet))
        // Price catalog
        .route("/models", get(model_prices::list_models))
        .route("/models/prices", get(model_prices::list_prices))
        .route("/models/price", post(model_prices::update_prices))
        .route("/models/sync-price", post(model_prices::sync_price))
        .route("/models/sync-all-prices", post(model_prices::sync_all_prices))
        .route("/models/inlet-cost", get(model_prices::get_inlet_cost))
        // Users
        .route("/users", get(users::list_users))
        .route("/users/{id}", patch(users::update_user).delete(users::delete_user))
        .route("/users/{id}/balance", put(users::update_balance))
        // Usage records
        .route("/records", get(records::list_records))
        // Backups
        .route("/panel/database/export", get(backup::export_database))
        .route(
            "/panel/database/import",
            post(backup::import_database).layer(DefaultBodyLimit::max(backup::IMPORT_BODY_LIMIT)),
        )
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

        let billing_registry = match state.metrics_recorder {
            Some(ref recorder) => recorder.registry().clone(),
            None => prometheus::Registry::new(),
        };

        // Combines the HTTP metrics from axum-prometheus with the billing counters
        router = router
            .route(
                "/internal/metrics",
                get(|| async move {
                    use prometheus::{Encoder, TextEncoder};

                    let mut rendered = metric_handle.render();

                    let mut buffer = vec![];
                    if let Err(e) = TextEncoder::new().encode(&billing_registry.gather(), &mut buffer) {
                        error!("Failed to encode billing metrics: {}", e);
                    }
                    rendered.push_str(&String::from_utf8_lossy(&buffer));
                    rendered
                }),
            )
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns the router and the connection pool.
///
/// 1. **Create**: [`Application::new`] opens the pool, runs migrations and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal resolves, in-flight requests finish, then the pool
///    and telemetry are closed
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create an application on an existing pool, or on a fresh one built from the config
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting meterctl with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => pool,
            None => db::create_pool(&config.database)?,
        };
        migrator().run(&pool).await?;

        for entry in &config.cost_on_inlet.rejected {
            warn!(entry = %entry, "Ignoring malformed cost_on_inlet entry");
        }

        let tokenizer = Arc::new(Tokenizer::cl100k()?);

        let model_fetcher = match config.upstream.as_ref() {
            Some(upstream) => {
                info!(url = %upstream.url, "Upstream model catalog configured");
                Some(Arc::new(FetchModelsReqwest::new(upstream)?) as Arc<dyn FetchModels>)
            }
            None => {
                info!("No upstream configured, model discovery is disabled");
                None
            }
        };

        let mut app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .tokenizer(tokenizer)
            .maybe_model_fetcher(model_fetcher)
            .build();

        let router = build_router(&mut app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("meterctl listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{AppState, build_router};
    use crate::test_utils::*;
    use crate::tokenizer::Tokenizer;
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;
    use std::sync::Arc;

    #[sqlx::test]
    #[test_log::test]
    async fn test_healthz(pool: PgPool) {
        let app = create_test_app(pool).await;

        let response = app.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("OK");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unauthenticated_admin_route_is_rejected(pool: PgPool) {
        let app = create_test_app(pool).await;

        let response = app.get("/api/v1/records").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error_type"], json!("authorization_error"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_build_router_with_metrics_disabled(pool: PgPool) {
        let mut config = create_test_config();
        config.enable_metrics = false;
        let app = create_test_app_with_config(pool, config).await;

        let metrics_content = app.get("/internal/metrics").await.text();
        assert!(!metrics_content.contains("# HELP") && !metrics_content.contains("# TYPE"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_build_router_with_metrics_enabled(pool: PgPool) {
        let mut config = create_test_config();
        config.enable_metrics = true;

        let mut state = AppState::builder()
            .db(pool)
            .config(config)
            .tokenizer(Arc::new(Tokenizer::cl100k().unwrap()))
            .build();
        let router = build_router(&mut state).unwrap();
        assert!(state.metrics_recorder.is_some());

        let server = axum_test::TestServer::new(router).unwrap();
        let response = server.get("/internal/metrics").await;
        assert_eq!(response.status_code().as_u16(), 200);
        let metrics_content = response.text();
        assert!(metrics_content.contains("meterctl_settlement_errors_total"));
    }
}
