//! HTTP request handlers for all API endpoints.
//!
//! Each handler checks the bearer credential through an extractor, validates the payload, runs
//! the work against the database repositories and serializes the response.
//!
//! # Handler Modules
//!
//! - [`billing`]: the inlet and outlet hooks called by the gateway
//! - [`model_prices`]: model discovery, price edits and base-model price sync
//! - [`users`]: user listing, balance override and soft delete
//! - [`records`]: usage record history
//! - [`backup`]: full database export and import
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to a status code and a JSON body with
//! `success`, `error` and `error_type`.

pub mod backup;
pub mod billing;
pub mod model_prices;
pub mod records;
pub mod users;
