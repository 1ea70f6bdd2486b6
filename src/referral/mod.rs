//! Referral engine.
//!
//! Issues deterministic referral codes and applies them, crediting
//! referrer and referee atomically. Codes are a hash of
//! `(brand_id, member_key, salt)`, so reissue is naturally idempotent and
//! there is no collision-retry loop. A member may be the referred party at
//! most once per brand, regardless of which code is used.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::ReferralConfig;
use crate::error::{LoyaltyError, NotFound, Result, RuleViolation};
use crate::interfaces::{ReferralApplyOutcome, ReferralStore};
use crate::ledger::locks::KeyLocks;
use crate::ledger::{MemberKey, NewEntry, Reason};


/// The one-time record that a member was referred, gating bonus issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralApplication {
    pub brand_id: String,
    pub code: String,
    pub referred: MemberKey,
    pub referrer_bonus: i64,
    pub referee_bonus: i64,
    pub idempotency_key: String,
    pub applied_at: chrono::DateTime<Utc>,
}

/// Aggregate over applications of one member's code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralStats {
    pub code: String,
    pub referred_count: u64,
    pub points_awarded: i64,
}

/// Issues and applies referral codes.
pub struct ReferralEngine {
    store: Arc<dyn ReferralStore>,
    locks: Arc<KeyLocks>,
    config: ReferralConfig,
}

impl ReferralEngine {
    pub fn new(store: Arc<dyn ReferralStore>, locks: Arc<KeyLocks>, config: ReferralConfig) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    /// Deterministic code for a member: same owner, same code, always.
    fn derive_code(&self, brand: &str, member: &MemberKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(brand.as_bytes());
        hasher.update([0u8]);
        hasher.update(member.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.config.code_salt.as_bytes());
        let digest = hasher.finalize();
        format!("R-{}", hex::encode_upper(&digest[..4]))
    }

    /// Issue (or re-issue) a member's referral code. No ledger effect.
    pub async fn issue_code(&self, brand: &str, member: &MemberKey) -> Result<String> {
        let code = self.derive_code(brand, member);
        let stored = self.store.put_code(brand, member, &code).await?;
        debug!(brand, %member, code = %stored, "issued referral code");
        Ok(stored)
    }

    /// Apply a referral code on behalf of a newly-referred member.
    ///
    /// On success the application row and both bonus credits commit as one
    /// atomic unit. A retry with the same idempotency key replays the
    /// original application.
    pub async fn apply(
        &self,
        brand: &str,
        code: &str,
        referred: &MemberKey,
        idempotency_key: &str,
    ) -> Result<ReferralApplication> {
        let owner = self
            .store
            .code_owner(brand, code)
            .await?
            .ok_or_else(|| NotFound::ReferralCode {
                brand_id: brand.to_string(),
                code: code.to_string(),
            })?;

        if owner == *referred {
            return Err(LoyaltyError::Rule(RuleViolation::SelfReferral));
        }

        let application = ReferralApplication {
            brand_id: brand.to_string(),
            code: code.to_string(),
            referred: referred.clone(),
            referrer_bonus: self.config.referrer_bonus,
            referee_bonus: self.config.referee_bonus,
            idempotency_key: idempotency_key.to_string(),
            applied_at: Utc::now(),
        };

        // Both member ledgers change; take both locks in key order.
        let _guards = self.locks.acquire_pair(brand, &owner, referred).await;

        // Per-ledger replay keys derived from the referred member, so an
        // owner referring many members never collides with themselves.
        let credit_key = format!("referral-{}", referred.as_str());
        let outcome = self
            .store
            .apply(
                brand,
                &owner,
                &application,
                NewEntry {
                    delta: self.config.referrer_bonus,
                    reason: Reason::ReferralBonus,
                    reference_id: code.to_string(),
                    idempotency_key: credit_key.clone(),
                },
                NewEntry {
                    delta: self.config.referee_bonus,
                    reason: Reason::ReferralBonus,
                    reference_id: code.to_string(),
                    idempotency_key: credit_key,
                },
            )
            .await?;

        match outcome {
            ReferralApplyOutcome::Applied(application) => {
                info!(
                    brand,
                    code,
                    referred = %application.referred,
                    owner = %owner,
                    "referral applied"
                );
                Ok(application)
            }
            ReferralApplyOutcome::AlreadyApplied(existing) => {
                if existing.idempotency_key == idempotency_key && existing.code == code {
                    // Retried request; the original application stands.
                    Ok(existing)
                } else {
                    Err(LoyaltyError::Rule(RuleViolation::AlreadyReferred))
                }
            }
        }
    }

    /// Stats over applications of the member's code. Works whether or not
    /// the code was ever explicitly issued, since derivation is
    /// deterministic.
    pub async fn stats(&self, brand: &str, member: &MemberKey) -> Result<ReferralStats> {
        let code = self.derive_code(brand, member);
        Ok(self.store.stats(brand, &code).await?)
    }
}
