//! The two ends of a metered LLM call.
//!
//! ```text
//! request ──▶ inlet::authorize ──▶ upstream LLM ──▶ outlet::settle ──▶ response
//!             (flat pre-charge)                      (token or per-message cost,
//!                                                     usage record appended)
//! ```
//!
//! The outlet charges the full computed cost on top of any inlet pre-charge; the two are never
//! reconciled. A call whose outlet never arrives keeps its pre-charge.

pub mod inlet;
pub mod outlet;

use crate::db::models::users::UserUpsertDBRequest;
use crate::types::UserId;
use rust_decimal::Decimal;

/// Balance reported for soft-deleted users, which are let through without being charged
pub const DELETED_USER_BALANCE: Decimal = Decimal::NEGATIVE_ONE;

/// User identity as reported by the gateway on every call
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: String,
}

impl Identity {
    pub(crate) fn upsert_request(&self, initial_balance: Decimal) -> UserUpsertDBRequest {
        UserUpsertDBRequest {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            initial_balance,
        }
    }
}
