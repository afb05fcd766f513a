//! Keeping the price catalog in step with the upstream gateway and with itself.
//!
//! - [`model_catalog`]: discovers models from the upstream `GET /api/models`
//! - [`prices`]: lazy model creation and base-to-derived price propagation

pub mod model_catalog;
pub mod prices;
