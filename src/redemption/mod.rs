//! Redemption coordinator.
//!
//! Atomic debit against a reward catalog entry, idempotent per client
//! request. The catalog lookup happens before the member lock; the
//! balance check and debit happen under it, so two concurrent attempts
//! can never jointly overdraw a member.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LoyaltyError, NotFound, Result, RuleViolation};
use crate::interfaces::{LedgerStore, RewardCatalog};
use crate::ledger::locks::KeyLocks;
use crate::ledger::{MemberKey, NewEntry, Reason};

#[cfg(test)]
mod tests;

/// The resolved outcome stored against an idempotency key. Both success
/// and insufficient-balance outcomes are recorded so a retry replays the
/// original result without touching the ledger again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RedemptionOutcome {
    Redeemed {
        reward_id: String,
        cost: i64,
        entry_id: u64,
        balance_after: i64,
    },
    InsufficientBalance {
        balance: i64,
        cost: i64,
    },
}

/// A successful redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub reward_id: String,
    pub cost: i64,
    pub entry_id: u64,
    pub balance_after: i64,
}

/// Coordinates reward redemptions against the ledger.
pub struct RedemptionCoordinator {
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<dyn RewardCatalog>,
    locks: Arc<KeyLocks>,
    /// Rewards costing fewer points than this are rejected; 0 disables.
    min_points: i64,
}

impl RedemptionCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        catalog: Arc<dyn RewardCatalog>,
        locks: Arc<KeyLocks>,
        min_points: i64,
    ) -> Self {
        Self {
            ledger,
            catalog,
            locks,
            min_points,
        }
    }

    fn outcome_to_result(outcome: RedemptionOutcome) -> Result<Redemption> {
        match outcome {
            RedemptionOutcome::Redeemed {
                reward_id,
                cost,
                entry_id,
                balance_after,
            } => Ok(Redemption {
                reward_id,
                cost,
                entry_id,
                balance_after,
            }),
            RedemptionOutcome::InsufficientBalance { balance, cost } => {
                Err(LoyaltyError::Rule(RuleViolation::InsufficientBalance {
                    balance,
                    cost,
                }))
            }
        }
    }

    /// Redeem a reward for a member.
    ///
    /// Replay-safe: a retry with the same idempotency key returns the
    /// originally-resolved outcome, successful or not, with at most one
    /// ledger debit across all attempts.
    pub async fn redeem(
        &self,
        brand: &str,
        member: &MemberKey,
        reward_id: &str,
        idempotency_key: &str,
    ) -> Result<Redemption> {
        if let Some(outcome) = self
            .ledger
            .redemption_outcome(brand, member, idempotency_key)
            .await?
        {
            debug!(brand, %member, idempotency_key, "replaying stored redemption outcome");
            return Self::outcome_to_result(outcome);
        }

        let reward = self
            .catalog
            .reward(brand, reward_id)
            .await?
            .filter(|r| r.active)
            .ok_or_else(|| NotFound::Reward {
                brand_id: brand.to_string(),
                reward_id: reward_id.to_string(),
            })?;

        if self.min_points > 0 && reward.cost_points < self.min_points {
            return Err(LoyaltyError::Rule(RuleViolation::BelowMinimumRedemption {
                cost: reward.cost_points,
                minimum: self.min_points,
            }));
        }

        // Serialization point: balance read and debit under the member lock.
        let _guard = self.locks.acquire(brand, member).await;

        // A concurrent same-key call may have resolved while this one waited
        // for the lock; the pre-lock check above is only a fast path.
        if let Some(outcome) = self
            .ledger
            .redemption_outcome(brand, member, idempotency_key)
            .await?
        {
            debug!(brand, %member, idempotency_key, "replaying outcome resolved under contention");
            return Self::outcome_to_result(outcome);
        }

        let balance = self.ledger.balance(brand, member).await?;
        if balance < reward.cost_points {
            let outcome = RedemptionOutcome::InsufficientBalance {
                balance,
                cost: reward.cost_points,
            };
            self.ledger
                .record_redemption_outcome(brand, member, idempotency_key, &outcome)
                .await?;
            return Self::outcome_to_result(outcome);
        }

        let appended = self
            .ledger
            .append(
                brand,
                member,
                NewEntry {
                    delta: -reward.cost_points,
                    reason: Reason::Redeem,
                    reference_id: reward_id.to_string(),
                    idempotency_key: idempotency_key.to_string(),
                },
            )
            .await?;

        let outcome = RedemptionOutcome::Redeemed {
            reward_id: reward_id.to_string(),
            cost: reward.cost_points,
            entry_id: appended.entry.entry_id,
            balance_after: appended.balance_after,
        };
        self.ledger
            .record_redemption_outcome(brand, member, idempotency_key, &outcome)
            .await?;

        info!(
            brand,
            %member,
            reward_id,
            cost = reward.cost_points,
            balance_after = appended.balance_after,
            "reward redeemed"
        );
        Self::outcome_to_result(outcome)
    }
}
