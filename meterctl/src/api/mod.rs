//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! Everything lives under `/api/v1`:
//!
//! - **Gateway hooks** (`/inlet`, `/outlet`): pre-charge and settlement, service credential
//! - **Price catalog** (`/models/*`): model discovery, price edits and base-model sync
//! - **Users** (`/users/*`): listing, balance override, soft delete and restore
//! - **Usage records** (`/records`): settled usage, newest first
//! - **Backups** (`/panel/database/*`): full export and import
//!
//! Everything except the gateway hooks requires the administrative credential.
//!
//! # OpenAPI Documentation
//!
//! All endpoints are documented with `utoipa`. The rendered reference is served at `/docs`.

pub mod extract;
pub mod handlers;
pub mod models;
