//! Tier calculator.
//!
//! Derives membership tier from lifetime-earned points. Tiers move upward
//! immediately when an append crosses a threshold; downward movement is
//! evaluated only at a periodic re-check driven by an external scheduler,
//! and is suppressed inside a grace window after the crossing. Spending
//! never causes an instantaneous downgrade because it never reduces
//! lifetime earned.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::interfaces::{LedgerStore, TierSchedule, TierStateStore, TierThreshold};
use crate::ledger::MemberKey;


/// Tier of members who have crossed no threshold.
pub const BASE_TIER: &str = "base";

/// Persisted tier position for a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierState {
    pub tier_name: String,
    /// When the member crossed into this tier; anchors the grace window.
    pub attained_at: DateTime<Utc>,
}

/// Highest threshold not exceeding `lifetime`, if any.
fn eligible_tier(thresholds: &[TierThreshold], lifetime: i64) -> Option<&TierThreshold> {
    thresholds
        .iter()
        .rev()
        .find(|t| t.min_lifetime_points <= lifetime)
}

/// Position of a tier name in the schedule; `None` for names no longer
/// present (e.g., after a schedule change).
fn rank(thresholds: &[TierThreshold], name: &str) -> Option<usize> {
    thresholds.iter().position(|t| t.tier_name == name)
}

/// Computes member tiers with downgrade hysteresis.
pub struct TierCalculator {
    ledger: Arc<dyn LedgerStore>,
    states: Arc<dyn TierStateStore>,
    schedule: Arc<dyn TierSchedule>,
    grace_window: Duration,
}

impl TierCalculator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        states: Arc<dyn TierStateStore>,
        schedule: Arc<dyn TierSchedule>,
        grace_window_secs: u64,
    ) -> Self {
        Self {
            ledger,
            states,
            schedule,
            grace_window: Duration::seconds(grace_window_secs as i64),
        }
    }

    /// Current tier for a member. Read-only: returns the persisted tier or
    /// the eligible one, whichever ranks higher, so a read never downgrades.
    pub async fn tier_for(&self, brand: &str, member: &MemberKey) -> Result<String> {
        let thresholds = self.schedule.thresholds(brand).await?;
        let lifetime = self.ledger.lifetime_earned(brand, member).await?;

        let eligible = eligible_tier(&thresholds, lifetime);
        let stored = self.states.tier_state(brand, member).await?;

        let eligible_rank = eligible.and_then(|t| rank(&thresholds, &t.tier_name));
        let stored_rank = stored
            .as_ref()
            .and_then(|s| rank(&thresholds, &s.tier_name));

        let best = match (eligible_rank, stored_rank) {
            (Some(e), Some(s)) => Some(e.max(s)),
            (Some(e), None) => Some(e),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        };
        Ok(best
            .map(|i| thresholds[i].tier_name.clone())
            .unwrap_or_else(|| BASE_TIER.to_string()))
    }

    /// Observe a positive append. Persists an upgrade with a fresh
    /// `attained_at` when a new threshold was crossed. Called synchronously
    /// after every credit, before the operation's result is returned.
    pub async fn note_earned(
        &self,
        brand: &str,
        member: &MemberKey,
        lifetime_after: i64,
    ) -> Result<()> {
        let thresholds = self.schedule.thresholds(brand).await?;
        let Some(eligible) = eligible_tier(&thresholds, lifetime_after) else {
            return Ok(());
        };
        let eligible_rank = rank(&thresholds, &eligible.tier_name);

        let stored = self.states.tier_state(brand, member).await?;
        let stored_rank = stored
            .as_ref()
            .and_then(|s| rank(&thresholds, &s.tier_name));

        let crossed = match (eligible_rank, stored_rank) {
            (Some(e), Some(s)) => e > s,
            (Some(_), None) => true,
            _ => false,
        };
        if crossed {
            self.states
                .put_tier_state(
                    brand,
                    member,
                    &TierState {
                        tier_name: eligible.tier_name.clone(),
                        attained_at: Utc::now(),
                    },
                )
                .await?;
            info!(brand, %member, tier = %eligible.tier_name, "tier upgraded");
        }
        Ok(())
    }

    /// Periodic downgrade evaluation, driven by an external scheduler.
    ///
    /// Downgrades only when the eligible tier ranks below the stored one
    /// and the grace window since the crossing has elapsed. Returns the
    /// tier in effect after the check.
    pub async fn recheck(&self, brand: &str, member: &MemberKey, now: DateTime<Utc>) -> Result<String> {
        let thresholds = self.schedule.thresholds(brand).await?;
        let lifetime = self.ledger.lifetime_earned(brand, member).await?;
        let eligible = eligible_tier(&thresholds, lifetime);
        let eligible_name = eligible
            .map(|t| t.tier_name.clone())
            .unwrap_or_else(|| BASE_TIER.to_string());

        let Some(stored) = self.states.tier_state(brand, member).await? else {
            return Ok(eligible_name);
        };

        let eligible_rank = eligible.and_then(|t| rank(&thresholds, &t.tier_name));
        let stored_rank = rank(&thresholds, &stored.tier_name);

        let should_downgrade = match (eligible_rank, stored_rank) {
            (Some(e), Some(s)) => e < s,
            // Stored tier no longer in the schedule: downgrade to eligible.
            (_, None) => true,
            (None, Some(_)) => true,
        };
        if !should_downgrade {
            return Ok(stored.tier_name);
        }

        if now - stored.attained_at < self.grace_window {
            // Crossed too recently; hold the higher tier.
            return Ok(stored.tier_name);
        }

        self.states
            .put_tier_state(
                brand,
                member,
                &TierState {
                    tier_name: eligible_name.clone(),
                    attained_at: now,
                },
            )
            .await?;
        info!(brand, %member, tier = %eligible_name, "tier downgraded");
        Ok(eligible_name)
    }
}
