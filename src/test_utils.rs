//! Shared helpers for unit tests.

use crate::ledger::{MemberKey, NewEntry, Reason};

/// Member key from a literal email; panics on malformed input.
pub fn member(email: &str) -> MemberKey {
    MemberKey::new(email).unwrap()
}

/// An earn entry with a fixed reference, for seeding balances.
pub fn earn(delta: i64, idempotency_key: &str) -> NewEntry {
    NewEntry {
        delta,
        reason: Reason::Earn,
        reference_id: "order-1".to_string(),
        idempotency_key: idempotency_key.to_string(),
    }
}
