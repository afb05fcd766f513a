//! API request and response data models.
//!
//! These types define the public JSON contract and are kept apart from the database models, so
//! the storage layout can change without breaking callers. Monetary values are plain JSON
//! numbers on the wire and exact decimals everywhere else.
//!
//! - [`billing`]: inlet and outlet payloads sent by the gateway
//! - [`model_prices`]: catalog entries, price edits and sync results
//! - [`users`]: user listing, balance override and soft delete
//! - [`records`]: settled usage records
//! - [`backup`]: import summaries
//! - [`pagination`]: page-based query parameters shared by list endpoints

pub mod backup;
pub mod billing;
pub mod model_prices;
pub mod pagination;
pub mod records;
pub mod users;
