//! Tier state storage interface.

use async_trait::async_trait;

use super::ledger_store::Result;
use crate::ledger::MemberKey;
use crate::tier::TierState;

/// Interface for persisted per-member tier state.
///
/// Absent state means the member has never crossed a threshold and sits at
/// the brand's base tier.
#[async_trait]
pub trait TierStateStore: Send + Sync {
    /// Current persisted tier state for a member.
    async fn tier_state(&self, brand: &str, member: &MemberKey) -> Result<Option<TierState>>;

    /// Replace a member's tier state.
    async fn put_tier_state(
        &self,
        brand: &str,
        member: &MemberKey,
        state: &TierState,
    ) -> Result<()>;
}
