//! Referral storage interface.

use async_trait::async_trait;

use super::ledger_store::Result;
use crate::ledger::{MemberKey, NewEntry};
use crate::referral::{ReferralApplication, ReferralStats};

/// Result of an atomic referral application attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralApplyOutcome {
    /// Row inserted and both bonus credits appended.
    Applied(ReferralApplication),
    /// A row already existed for `(brand_id, referred)`; nothing was written.
    AlreadyApplied(ReferralApplication),
}

/// Interface for referral code and application persistence.
///
/// A member may be the referred party at most once per brand; the
/// `(brand_id, referred)` key is the uniqueness anchor regardless of
/// which code was used.
#[async_trait]
pub trait ReferralStore: Send + Sync {
    /// Record a code for its owner, first write wins. Returns the stored
    /// code, which on a repeat call is the original one.
    async fn put_code(&self, brand: &str, owner: &MemberKey, code: &str) -> Result<String>;

    /// Resolve a code to its owner.
    async fn code_owner(&self, brand: &str, code: &str) -> Result<Option<MemberKey>>;

    /// The application naming `referred` as the referred party, if any.
    async fn application_for(
        &self,
        brand: &str,
        referred: &MemberKey,
    ) -> Result<Option<ReferralApplication>>;

    /// Insert the application row and append both bonus credits as one
    /// atomic unit: all three writes commit or none do. When a row for
    /// `(brand, referred)` already exists, nothing is written and the
    /// existing row is returned.
    ///
    /// The caller holds both member locks in key order for the duration.
    async fn apply(
        &self,
        brand: &str,
        owner: &MemberKey,
        application: &ReferralApplication,
        owner_credit: NewEntry,
        referred_credit: NewEntry,
    ) -> Result<ReferralApplyOutcome>;

    /// Aggregate stats over applications of one code.
    async fn stats(&self, brand: &str, code: &str) -> Result<ReferralStats>;
}
