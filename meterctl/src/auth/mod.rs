//! Bearer credential checks for the HTTP API.
//!
//! Two static credentials guard the API: the service credential (`api_key`) used by the gateway
//! on the inlet and outlet endpoints, and the administrative credential (`access_token`) used by
//! everything under the admin routes. Handlers opt in by taking an extractor:
//!
//! ```ignore
//! pub async fn sync_all_prices(State(state): State<AppState>, _: AdminAuth) -> Result<Json<...>> { ... }
//! ```

use crate::{AppState, config::Config, errors::Error};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::marker::PhantomData;
use tracing::{instrument, trace};

/// Credential kinds an extractor can require
pub mod credential {
    use crate::config::Config;

    pub trait Credential {
        /// Config key holding the expected token, used in error messages
        const NAME: &'static str;

        fn expected(config: &Config) -> Option<&str>;
    }

    /// Gateway credential for inlet and outlet
    pub struct Service;
    /// Operator credential for the administrative endpoints
    pub struct Admin;

    impl Credential for Service {
        const NAME: &'static str = "api_key";

        fn expected(config: &Config) -> Option<&str> {
            config.api_key.as_deref()
        }
    }

    impl Credential for Admin {
        const NAME: &'static str = "access_token";

        fn expected(config: &Config) -> Option<&str> {
            config.access_token.as_deref()
        }
    }
}

use credential::Credential;

/// Extractor that rejects the request unless it carries the bearer token for `C`
pub struct RequiresCredential<C>(PhantomData<C>);

pub type ServiceAuth = RequiresCredential<credential::Service>;
pub type AdminAuth = RequiresCredential<credential::Admin>;

/// Pull the token out of `Authorization: Bearer <token>`
fn bearer_token(parts: &Parts) -> Result<&str, Error> {
    let header = parts.headers.get(AUTHORIZATION).ok_or_else(|| Error::Unauthenticated {
        message: Some("Missing Authorization header".to_string()),
    })?;

    let value = header.to_str().map_err(|_| Error::Unauthenticated {
        message: Some("Invalid Authorization header".to_string()),
    })?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::Unauthenticated {
            message: Some("Authorization header must use the Bearer scheme".to_string()),
        })
}

/// Compare without short-circuiting on the first differing byte
fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub(crate) fn check<C: Credential>(parts: &Parts, config: &Config) -> Result<(), Error> {
    let expected = C::expected(config).filter(|token| !token.is_empty()).ok_or_else(|| Error::Configuration {
        message: format!("{} is not configured", C::NAME),
    })?;

    let presented = bearer_token(parts)?;
    if !tokens_match(presented, expected) {
        return Err(Error::Unauthenticated {
            message: Some("Invalid credential".to_string()),
        });
    }

    trace!(credential = C::NAME, "Bearer credential accepted");
    Ok(())
}

impl<C> FromRequestParts<AppState> for RequiresCredential<C>
where
    C: Credential + Send + Sync,
{
    type Rejection = Error;

    #[instrument(skip(parts, state), fields(credential = C::NAME))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        check::<C>(parts, &state.config)?;
        Ok(RequiresCredential(PhantomData))
    }
}
