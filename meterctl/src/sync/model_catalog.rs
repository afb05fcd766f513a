//! Discovery of models from the upstream gateway.
//!
//! The upstream exposes an OpenWebUI-compatible `GET /api/models`. Every model it lists is passed
//! through [`get_or_create_model`], so new models appear in the catalog with default (or inherited)
//! prices and existing ones keep theirs.

use crate::config::UpstreamConfig;
use crate::db::models::model_prices::{ModelPriceDBResponse, Prices};
use crate::sync::prices::get_or_create_model;
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info, instrument};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamModelsResponse {
    pub data: Vec<UpstreamModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamModel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub info: Option<UpstreamModelInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpstreamModelInfo {
    #[serde(default)]
    pub base_model_id: Option<String>,
}

impl UpstreamModel {
    fn base_model_id(&self) -> Option<&str> {
        self.info.as_ref()?.base_model_id.as_deref()
    }
}

/// Source of the upstream model list. See [`FetchModelsReqwest`] for the HTTP implementation.
#[async_trait]
pub trait FetchModels: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<UpstreamModelsResponse>;
}

/// Fetches `{url}/api/models` with a bearer token
pub struct FetchModelsReqwest {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl FetchModelsReqwest {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

/// Makes sure a url has a trailing slash, so that `join` appends instead of replacing the last
/// path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut url = url.clone();
    let path = format!("{}/", url.path());
    url.set_path(&path);
    url
}

#[async_trait]
impl FetchModels for FetchModelsReqwest {
    #[instrument(skip(self), fields(base_url = %self.base_url), err)]
    async fn fetch(&self) -> anyhow::Result<UpstreamModelsResponse> {
        let url = ensure_slash(&self.base_url)
            .join("api/models")
            .map_err(|e| anyhow!("Failed to construct models URL: {}", e))?;

        let mut request = self.client.get(url.clone());
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Failed to fetch models from {}", url);
            return Err(anyhow!("Upstream models API error: {} - {}", status, body));
        }

        let body_text = response.text().await?;
        debug!("Models API response body: {}", body_text);

        serde_json::from_str::<UpstreamModelsResponse>(&body_text).map_err(|e| {
            tracing::error!("Failed to parse models response as JSON. Error: {}", e);
            anyhow!("error decoding response body: {}", e)
        })
    }
}

/// Fetch the upstream list and make sure every model has a catalog row.
///
/// Returns the catalog rows of the listed models, in upstream order.
#[instrument(skip(pool, fetcher, default_prices), err)]
pub async fn sync_models(
    pool: &PgPool,
    fetcher: &dyn FetchModels,
    default_prices: Prices,
) -> anyhow::Result<Vec<ModelPriceDBResponse>> {
    let upstream = fetcher.fetch().await?;

    let mut conn = pool.acquire().await?;
    let mut models = Vec::with_capacity(upstream.data.len());
    for model in &upstream.data {
        if model.id.trim().is_empty() {
            debug!("Skipping upstream model without id");
            continue;
        }
        let row = get_or_create_model(&mut conn, &model.id, model.name.as_deref(), model.base_model_id(), default_prices).await?;
        models.push(row);
    }

    info!("Synced {} models from upstream", models.len());
    Ok(models)
}
