//! Ledger entry types.
//!
//! The ledger is an append-only, tenant-partitioned record of point deltas.
//! Entries are immutable once written; corrections are new `Adjustment`
//! entries, never edits. The `(brand_id, member_key, entry_id)` tuple forms
//! the unique key for stored entries, with `entry_id` monotonically
//! increasing per member starting at 0.

pub mod locks;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::{self, ValidationError};

/// Normalized member identity within a brand: a trimmed, lower-cased email.
///
/// Members are created lazily on first ledger touch; there is no independent
/// member record, only the distinct set of keys referenced by entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberKey(String);

impl MemberKey {
    /// Normalize and validate an email address into a member key.
    pub fn new(email: &str) -> Result<Self, ValidationError> {
        Ok(Self(validation::normalize_email(email)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a delta was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Earn,
    Redeem,
    ReferralBonus,
    Adjustment,
}

impl Reason {
    /// Stable storage code for the reason.
    pub fn code(&self) -> &'static str {
        match self {
            Reason::Earn => "earn",
            Reason::Redeem => "redeem",
            Reason::ReferralBonus => "referral_bonus",
            Reason::Adjustment => "adjustment",
        }
    }

    /// Parse a stored reason code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "earn" => Some(Reason::Earn),
            "redeem" => Some(Reason::Redeem),
            "referral_bonus" => Some(Reason::ReferralBonus),
            "adjustment" => Some(Reason::Adjustment),
            _ => None,
        }
    }

    /// Whether a positive delta with this reason counts toward lifetime earned.
    pub fn counts_toward_lifetime(&self) -> bool {
        matches!(self, Reason::Earn | Reason::ReferralBonus)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An immutable point delta on a member's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub brand_id: String,
    pub member_key: MemberKey,
    /// Monotonic per-member sequence, starting at 0.
    pub entry_id: u64,
    pub delta: i64,
    pub reason: Reason,
    /// What the delta refers to (reward id, order id, referral code).
    pub reference_id: String,
    /// Client-supplied replay token; unique per member.
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// A delta about to be appended. The store assigns `entry_id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub delta: i64,
    pub reason: Reason,
    pub reference_id: String,
    pub idempotency_key: String,
}

/// Result of an append: the entry (new or replayed) plus the projection
/// values as of that entry, so callers avoid a second read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub entry: LedgerEntry,
    /// True when the idempotency key had already been recorded and the
    /// original entry was returned without re-applying the delta.
    pub replayed: bool,
    pub balance_after: i64,
    pub lifetime_after: i64,
}
