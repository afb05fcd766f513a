//! Identifier aliases shared across the crate.
//!
//! User and model identifiers are opaque strings handed to us by the upstream gateway, so they
//! are aliased rather than wrapped. [`abbrev_id`] shortens them for log lines.

pub type UserId = String;
pub type ModelId = String;
pub type UsageRecordId = i64;

/// Abbreviate an identifier to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_id(id: &str) -> String {
    id.chars().take(8).collect()
}
