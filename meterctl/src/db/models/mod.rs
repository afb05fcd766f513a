//! Database record models matching table schemas.
//!
//! Each struct here mirrors a table row (`*DBResponse`, deriving `sqlx::FromRow`) or the input of
//! a repository method (`*DBRequest`). They are kept apart from the API models in
//! [`crate::api::models`] so that storage and wire formats can evolve independently.
//!
//! - [`users`]: users and their ledger balance
//! - [`model_prices`]: the price catalog
//! - [`usage_records`]: append-only settlement history
//! - [`backup`]: export snapshots and import payloads

pub mod backup;
pub mod model_prices;
pub mod usage_records;
pub mod users;
