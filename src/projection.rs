//! Balance projection.
//!
//! The fast-read aggregate maintained alongside the ledger: spendable
//! balance, monotonic lifetime-earned total, and the entry count (which
//! doubles as the next entry id). Updated atomically with every append
//! under the single-writer-per-key discipline, so reads never replay the
//! ledger.

use serde::{Deserialize, Serialize};

use crate::ledger::Reason;

/// Per-member aggregate over the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceProjection {
    /// Sum of all deltas; the spendable balance.
    pub balance: i64,
    /// Sum of positive earn/referral credits. Never decreases.
    pub lifetime_earned: i64,
    /// Number of entries applied; also the next entry id.
    pub entries: u64,
}

impl BalanceProjection {
    /// Entry id the next append will receive.
    pub fn next_entry_id(&self) -> u64 {
        self.entries
    }

    /// Fold one entry into the aggregate.
    pub fn apply(&mut self, delta: i64, reason: Reason) {
        self.balance += delta;
        if delta > 0 && reason.counts_toward_lifetime() {
            self.lifetime_earned += delta;
        }
        self.entries += 1;
    }
}
