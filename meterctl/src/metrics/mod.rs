//! Prometheus metrics for the metering engine.
//!
//! HTTP request metrics come from `axum-prometheus`; this module adds the business counters
//! (pre-charges, settlements, price syncs). Both are rendered together at `/internal/metrics`.

mod billing;

pub use billing::BillingMetrics;
