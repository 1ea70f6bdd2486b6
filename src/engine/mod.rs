//! Engine facade.
//!
//! `LoyaltyEngine` is the single entry point an embedding service wires
//! behind its transport. Every operation takes a typed request (or plain
//! identifiers for reads), validates it before any lock is acquired, and
//! retries transient storage failures internally with bounded exponential
//! backoff. Idempotency keys make those retries safe.

use std::future::Future;
use std::sync::Arc;

use backon::{BackoffBuilder, ExponentialBuilder};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::interfaces::{RewardCatalog, TierSchedule};
use crate::ledger::locks::KeyLocks;
use crate::ledger::{LedgerEntry, MemberKey, NewEntry, Reason};
use crate::redemption::{Redemption, RedemptionCoordinator};
use crate::referral::{ReferralApplication, ReferralEngine, ReferralStats};
use crate::storage::Stores;
use crate::tier::TierCalculator;
use crate::validation::{self, ValidationError};


/// Credit points to a member.
#[derive(Debug, Clone)]
pub struct EarnRequest {
    pub brand_id: String,
    pub email: String,
    pub points: i64,
    /// What the credit refers to (order id, campaign id). May be empty.
    pub reference_id: String,
    pub idempotency_key: String,
}

impl EarnRequest {
    fn validate(&self) -> std::result::Result<MemberKey, ValidationError> {
        validation::validate_brand(&self.brand_id)?;
        validation::validate_points(self.points)?;
        validation::validate_reference(&self.reference_id)?;
        validation::validate_idempotency_key(&self.idempotency_key)?;
        MemberKey::new(&self.email)
    }
}

/// Redeem a catalog reward.
#[derive(Debug, Clone)]
pub struct RedeemRequest {
    pub brand_id: String,
    pub email: String,
    pub reward_id: String,
    pub idempotency_key: String,
}

impl RedeemRequest {
    fn validate(&self) -> std::result::Result<MemberKey, ValidationError> {
        validation::validate_brand(&self.brand_id)?;
        validation::validate_reference(&self.reward_id)?;
        validation::validate_idempotency_key(&self.idempotency_key)?;
        MemberKey::new(&self.email)
    }
}

/// Apply a referral code on behalf of a newly-referred member.
#[derive(Debug, Clone)]
pub struct ApplyReferralRequest {
    pub brand_id: String,
    pub code: String,
    pub email: String,
    pub idempotency_key: String,
}

impl ApplyReferralRequest {
    fn validate(&self) -> std::result::Result<MemberKey, ValidationError> {
        validation::validate_brand(&self.brand_id)?;
        validation::validate_code(&self.code)?;
        validation::validate_idempotency_key(&self.idempotency_key)?;
        MemberKey::new(&self.email)
    }
}

/// Page through a member's ledger, newest first.
#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub brand_id: String,
    pub email: String,
    /// 0-based page index.
    pub page: u32,
    /// Page size; 0 selects the default, oversized values are clamped.
    pub limit: u32,
}

impl HistoryRequest {
    fn validate(&self) -> std::result::Result<MemberKey, ValidationError> {
        validation::validate_brand(&self.brand_id)?;
        MemberKey::new(&self.email)
    }
}

/// Result of an earn, echoing the projection as of the appended entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarnReceipt {
    pub entry_id: u64,
    /// True when the idempotency key replayed an earlier credit.
    pub replayed: bool,
    pub balance: i64,
    pub lifetime_earned: i64,
    pub tier: String,
}

/// Point-in-time account view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceView {
    pub balance: i64,
    pub lifetime_earned: i64,
    pub tier: String,
}

/// Retry `op` on transient storage failures, bounded by the backoff.
///
/// Every retried operation is idempotent: appends and redemptions replay
/// through their idempotency keys, reads are naturally safe.
async fn with_retry<T, F, Fut>(backoff: ExponentialBuilder, op_name: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delays = backoff.build();
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => match delays.next() {
                Some(delay) => {
                    warn!(op = op_name, error = %err, ?delay, "transient storage failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}

/// The loyalty engine: ledger, redemptions, referrals, and tiers behind
/// one validated surface.
pub struct LoyaltyEngine {
    stores: Stores,
    locks: Arc<KeyLocks>,
    redemptions: RedemptionCoordinator,
    referrals: ReferralEngine,
    tiers: TierCalculator,
    backoff: ExponentialBuilder,
}

impl LoyaltyEngine {
    pub fn new(
        stores: Stores,
        catalog: Arc<dyn RewardCatalog>,
        schedule: Arc<dyn TierSchedule>,
        config: &Config,
    ) -> Self {
        let locks = Arc::new(KeyLocks::new());
        let redemptions = RedemptionCoordinator::new(
            stores.ledger.clone(),
            catalog,
            locks.clone(),
            config.redemption.min_points,
        );
        let referrals = ReferralEngine::new(
            stores.referrals.clone(),
            locks.clone(),
            config.referral.clone(),
        );
        let tiers = TierCalculator::new(
            stores.ledger.clone(),
            stores.tiers.clone(),
            schedule,
            config.tier.grace_window_secs,
        );
        Self {
            stores,
            locks,
            redemptions,
            referrals,
            tiers,
            backoff: crate::utils::retry::storage_backoff(config.retry.max_attempts),
        }
    }

    /// Credit points to a member's ledger.
    pub async fn earn(&self, request: &EarnRequest) -> Result<EarnReceipt> {
        let member = request.validate()?;
        let brand = request.brand_id.as_str();

        let outcome = {
            let _guard = self.locks.acquire(brand, &member).await;
            with_retry(self.backoff, "earn", || async {
                Ok(self
                    .stores
                    .ledger
                    .append(
                        brand,
                        &member,
                        NewEntry {
                            delta: request.points,
                            reason: Reason::Earn,
                            reference_id: request.reference_id.clone(),
                            idempotency_key: request.idempotency_key.clone(),
                        },
                    )
                    .await?)
            })
            .await?
        };

        if !outcome.replayed {
            self.tiers
                .note_earned(brand, &member, outcome.lifetime_after)
                .await?;
        }
        let tier = self.tiers.tier_for(brand, &member).await?;

        debug!(
            brand,
            %member,
            points = request.points,
            replayed = outcome.replayed,
            balance = outcome.balance_after,
            "points earned"
        );
        Ok(EarnReceipt {
            entry_id: outcome.entry.entry_id,
            replayed: outcome.replayed,
            balance: outcome.balance_after,
            lifetime_earned: outcome.lifetime_after,
            tier,
        })
    }

    /// Current balance, lifetime earned, and tier. Lock-free.
    pub async fn balance(&self, brand_id: &str, email: &str) -> Result<BalanceView> {
        validation::validate_brand(brand_id)?;
        let member = MemberKey::new(email)?;

        let balance = self.stores.ledger.balance(brand_id, &member).await?;
        let lifetime_earned = self.stores.ledger.lifetime_earned(brand_id, &member).await?;
        let tier = self.tiers.tier_for(brand_id, &member).await?;
        Ok(BalanceView {
            balance,
            lifetime_earned,
            tier,
        })
    }

    /// Page of ledger entries, newest first.
    pub async fn history(&self, request: &HistoryRequest) -> Result<Vec<LedgerEntry>> {
        let member = request.validate()?;
        let limit = validation::clamp_history_limit(request.limit);
        Ok(self
            .stores
            .ledger
            .history(&request.brand_id, &member, request.page, limit)
            .await?)
    }

    /// Redeem a reward, debiting the member's balance.
    pub async fn redeem(&self, request: &RedeemRequest) -> Result<Redemption> {
        let member = request.validate()?;
        with_retry(self.backoff, "redeem", || async {
            self.redemptions
                .redeem(
                    &request.brand_id,
                    &member,
                    &request.reward_id,
                    &request.idempotency_key,
                )
                .await
        })
        .await
    }

    /// The member's referral code, issuing it on first call.
    pub async fn referral_code(&self, brand_id: &str, email: &str) -> Result<String> {
        validation::validate_brand(brand_id)?;
        let member = MemberKey::new(email)?;
        with_retry(self.backoff, "referral_code", || async {
            self.referrals.issue_code(brand_id, &member).await
        })
        .await
    }

    /// Aggregate stats over applications of the member's code.
    pub async fn referral_stats(&self, brand_id: &str, email: &str) -> Result<ReferralStats> {
        validation::validate_brand(brand_id)?;
        let member = MemberKey::new(email)?;
        self.referrals.stats(brand_id, &member).await
    }

    /// Apply a referral code, crediting referrer and referee atomically.
    pub async fn referral_apply(
        &self,
        request: &ApplyReferralRequest,
    ) -> Result<ReferralApplication> {
        let referred = request.validate()?;
        let brand = request.brand_id.as_str();

        let application = with_retry(self.backoff, "referral_apply", || async {
            self.referrals
                .apply(brand, &request.code, &referred, &request.idempotency_key)
                .await
        })
        .await?;

        // Both parties may have crossed a tier threshold.
        if let Some(owner) = self.stores.referrals.code_owner(brand, &application.code).await? {
            let lifetime = self.stores.ledger.lifetime_earned(brand, &owner).await?;
            self.tiers.note_earned(brand, &owner, lifetime).await?;
        }
        let lifetime = self.stores.ledger.lifetime_earned(brand, &referred).await?;
        self.tiers.note_earned(brand, &referred, lifetime).await?;

        Ok(application)
    }

    /// Current tier. Never downgrades; see [`LoyaltyEngine::tier_recheck`].
    pub async fn tier(&self, brand_id: &str, email: &str) -> Result<String> {
        validation::validate_brand(brand_id)?;
        let member = MemberKey::new(email)?;
        self.tiers.tier_for(brand_id, &member).await
    }

    /// Scheduler hook: evaluate a pending downgrade for one member.
    pub async fn tier_recheck(&self, brand_id: &str, email: &str) -> Result<String> {
        validation::validate_brand(brand_id)?;
        let member = MemberKey::new(email)?;
        self.tiers
            .recheck(brand_id, &member, chrono::Utc::now())
            .await
    }
}
