//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection`, which may be a pooled connection or an open
//! transaction. Callers that need several statements to commit together (settlement, price sync,
//! import) begin a transaction and build the repositories they need on top of it:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let balance = Ledger::new(&mut tx).apply_delta(&user_id, cost, ceiling).await?;
//! UsageRecords::new(&mut tx).append(&record).await?;
//! tx.commit().await?;
//! ```
//!
//! - [`Users`]: identity upsert, listing and soft delete
//! - [`Ledger`]: atomic balance mutations
//! - [`ModelPrices`]: the price catalog
//! - [`UsageRecords`]: append-only settlement history
//! - [`Backups`]: export and transactional import of all tables

pub mod backup;
pub mod ledger;
pub mod model_prices;
pub mod repository;
pub mod usage_records;
pub mod users;

pub use backup::Backups;
pub use ledger::Ledger;
pub use model_prices::ModelPrices;
pub use repository::Repository;
pub use usage_records::UsageRecords;
pub use users::Users;
