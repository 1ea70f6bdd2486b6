//! Trait definitions for storage backends and external collaborators.
//!
//! The engine depends only on these traits; backends live in `storage`,
//! and the reward catalog / tier schedule are read-only collaborators
//! owned by other systems.

mod ledger_store;
mod referral_store;
mod reward_catalog;
mod tier_schedule;
mod tier_store;

pub use ledger_store::{LedgerStore, Result, StorageError};
pub use referral_store::{ReferralApplyOutcome, ReferralStore};
pub use reward_catalog::{Reward, RewardCatalog, StaticRewardCatalog};
pub use tier_schedule::{StaticTierSchedule, TierSchedule, TierThreshold};
pub use tier_store::TierStateStore;
