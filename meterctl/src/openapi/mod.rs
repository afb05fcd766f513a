//! OpenAPI documentation for the metering API at `/api/v1/*`.
//!
//! The rendered reference is served at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::{api, errors};

/// The two bearer credentials: one for the gateway hooks, one for administration.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "ServiceAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("API Key")
                        .description(Some(
                            "Shared key used by the gateway for the inlet and outlet hooks:\n\n\
                            ```\nAuthorization: Bearer METER_API_KEY\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "AdminAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("Access Token")
                        .description(Some(
                            "Administrative token for catalog, user, record and backup endpoints:\n\n\
                            ```\nAuthorization: Bearer METER_ACCESS_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api/v1", description = "Metering API")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::billing::inlet,
        api::handlers::billing::outlet,
        api::handlers::model_prices::list_models,
        api::handlers::model_prices::list_prices,
        api::handlers::model_prices::update_prices,
        api::handlers::model_prices::sync_price,
        api::handlers::model_prices::sync_all_prices,
        api::handlers::model_prices::get_inlet_cost,
        api::handlers::users::list_users,
        api::handlers::users::update_balance,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
        api::handlers::records::list_records,
        api::handlers::backup::export_database,
        api::handlers::backup::import_database,
    ),
    components(
        schemas(
            errors::ErrorResponse,
            api::models::billing::UserIdentity,
            api::models::billing::InletBody,
            api::models::billing::InletRequest,
            api::models::billing::InletResponse,
            api::models::billing::ContentPart,
            api::models::billing::MessageContent,
            api::models::billing::ChatMessage,
            api::models::billing::OutletBody,
            api::models::billing::ReportedUsage,
            api::models::billing::OutletRequest,
            api::models::billing::OutletResponse,
            api::models::model_prices::ModelPriceResponse,
            api::models::model_prices::SyncPriceRequest,
            api::models::model_prices::SyncPriceResponse,
            api::models::model_prices::SyncResultResponse,
            api::models::model_prices::SyncAllPricesResponse,
            api::models::model_prices::PriceUpdate,
            api::models::model_prices::PriceUpdateRequest,
            api::models::model_prices::PriceUpdateResult,
            api::models::model_prices::BatchPriceUpdateResponse,
            api::models::model_prices::InletCostResponse,
            api::models::users::UserResponse,
            api::models::users::BalanceUpdate,
            api::models::users::BalanceUpdateResponse,
            api::models::users::UserUpdate,
            api::models::records::UsageRecordResponse,
            api::models::backup::ImportResponse,
        )
    ),
    tags(
        (name = "billing", description = "Hooks the gateway calls around every completion.

`/inlet` runs before the upstream call and may debit a flat pre-charge. `/outlet` runs after it, prices the call \
and appends a usage record."),
        (name = "models", description = "The price catalog. Prices are per million tokens, plus an optional flat \
per-message price that replaces token pricing when it is zero or more."),
        (name = "users", description = "Users are created the first time the gateway sees them."),
        (name = "records", description = "Append-only history of settled calls."),
        (name = "backup", description = "Full export and import of all metering tables."),
    ),
    info(
        title = "Metering API",
        version = "1.0.0",
        description = "Usage metering and balance settlement for an LLM gateway.

## Authentication

The gateway hooks take the service key, everything else takes the administrative token:

```
Authorization: Bearer YOUR_TOKEN
```

## Errors

Failures return a JSON body with a stable `error_type`:

```json
{
  \"success\": false,
  \"error\": \"User with ID u1 not found\",
  \"error_type\": \"not_found\"
}
```",
    ),
)]
pub struct ApiDoc;
