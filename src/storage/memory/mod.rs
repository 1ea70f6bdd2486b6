//! In-memory storage backend.
//!
//! The standalone-mode backend and the one unit tests run against. A single
//! `RwLock` over the whole brand-partitioned state makes every multi-row
//! write (append + projection, referral row + two credits) naturally
//! atomic. Write-failure injection mimics a durability outage for retry
//! tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::interfaces::{
    LedgerStore, ReferralApplyOutcome, ReferralStore, Result, StorageError, TierStateStore,
};
use crate::ledger::{AppendOutcome, LedgerEntry, MemberKey, NewEntry};
use crate::projection::BalanceProjection;
use crate::redemption::RedemptionOutcome;
use crate::referral::{ReferralApplication, ReferralStats};
use crate::tier::TierState;


type Key = (String, MemberKey);

#[derive(Default)]
struct State {
    entries: HashMap<Key, Vec<LedgerEntry>>,
    projections: HashMap<Key, BalanceProjection>,
    /// `(brand, member, idempotency_key)` -> entry id of the original append.
    idempotency: HashMap<(String, MemberKey, String), u64>,
    redemptions: HashMap<(String, MemberKey, String), RedemptionOutcome>,
    codes_by_owner: HashMap<Key, String>,
    owners_by_code: HashMap<(String, String), MemberKey>,
    /// Keyed by `(brand, referred)`: a member is referred at most once.
    applications: HashMap<Key, ReferralApplication>,
    tier_states: HashMap<Key, TierState>,
}

/// In-memory implementation of all storage traits.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    fail_writes: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a transient storage error.
    pub async fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.write().await = fail;
    }

    async fn check_writable(&self) -> Result<()> {
        if *self.fail_writes.read().await {
            return Err(StorageError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }
}

/// Append within an already-held write guard.
fn append_locked(
    state: &mut State,
    brand: &str,
    member: &MemberKey,
    new: NewEntry,
) -> Result<AppendOutcome> {
    let key = (brand.to_string(), member.clone());
    let idem_key = (
        brand.to_string(),
        member.clone(),
        new.idempotency_key.clone(),
    );

    if let Some(&entry_id) = state.idempotency.get(&idem_key) {
        let entry = state
            .entries
            .get(&key)
            .and_then(|entries| entries.get(entry_id as usize))
            .cloned()
            .ok_or_else(|| {
                StorageError::Corrupt(format!(
                    "idempotency key {} points at missing entry {}",
                    new.idempotency_key, entry_id
                ))
            })?;
        let projection = state.projections.get(&key).copied().unwrap_or_default();
        return Ok(AppendOutcome {
            entry,
            replayed: true,
            balance_after: projection.balance,
            lifetime_after: projection.lifetime_earned,
        });
    }

    let mut projection = state.projections.get(&key).copied().unwrap_or_default();
    let entry = LedgerEntry {
        brand_id: brand.to_string(),
        member_key: member.clone(),
        entry_id: projection.next_entry_id(),
        delta: new.delta,
        reason: new.reason,
        reference_id: new.reference_id,
        idempotency_key: new.idempotency_key,
        created_at: Utc::now(),
    };
    projection.apply(entry.delta, entry.reason);

    state.idempotency.insert(idem_key, entry.entry_id);
    state.entries.entry(key.clone()).or_default().push(entry.clone());
    state.projections.insert(key, projection);

    Ok(AppendOutcome {
        entry,
        replayed: false,
        balance_after: projection.balance,
        lifetime_after: projection.lifetime_earned,
    })
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append(
        &self,
        brand: &str,
        member: &MemberKey,
        entry: NewEntry,
    ) -> Result<AppendOutcome> {
        self.check_writable().await?;
        let mut state = self.state.write().await;
        append_locked(&mut state, brand, member, entry)
    }

    async fn balance(&self, brand: &str, member: &MemberKey) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .projections
            .get(&(brand.to_string(), member.clone()))
            .map(|p| p.balance)
            .unwrap_or(0))
    }

    async fn lifetime_earned(&self, brand: &str, member: &MemberKey) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .projections
            .get(&(brand.to_string(), member.clone()))
            .map(|p| p.lifetime_earned)
            .unwrap_or(0))
    }

    async fn history(
        &self,
        brand: &str,
        member: &MemberKey,
        page: u32,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        let Some(entries) = state.entries.get(&(brand.to_string(), member.clone())) else {
            return Ok(vec![]);
        };
        let skip = page as usize * limit as usize;
        Ok(entries
            .iter()
            .rev()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn redemption_outcome(
        &self,
        brand: &str,
        member: &MemberKey,
        idempotency_key: &str,
    ) -> Result<Option<RedemptionOutcome>> {
        let state = self.state.read().await;
        Ok(state
            .redemptions
            .get(&(
                brand.to_string(),
                member.clone(),
                idempotency_key.to_string(),
            ))
            .cloned())
    }

    async fn record_redemption_outcome(
        &self,
        brand: &str,
        member: &MemberKey,
        idempotency_key: &str,
        outcome: &RedemptionOutcome,
    ) -> Result<()> {
        self.check_writable().await?;
        let mut state = self.state.write().await;
        // First write wins: an outcome, once resolved, is immutable.
        state
            .redemptions
            .entry((
                brand.to_string(),
                member.clone(),
                idempotency_key.to_string(),
            ))
            .or_insert_with(|| outcome.clone());
        Ok(())
    }
}

#[async_trait]
impl ReferralStore for MemoryStore {
    async fn put_code(&self, brand: &str, owner: &MemberKey, code: &str) -> Result<String> {
        self.check_writable().await?;
        let mut state = self.state.write().await;
        let key = (brand.to_string(), owner.clone());
        if let Some(existing) = state.codes_by_owner.get(&key) {
            return Ok(existing.clone());
        }
        state.codes_by_owner.insert(key, code.to_string());
        state
            .owners_by_code
            .insert((brand.to_string(), code.to_string()), owner.clone());
        Ok(code.to_string())
    }

    async fn code_owner(&self, brand: &str, code: &str) -> Result<Option<MemberKey>> {
        let state = self.state.read().await;
        Ok(state
            .owners_by_code
            .get(&(brand.to_string(), code.to_string()))
            .cloned())
    }

    async fn application_for(
        &self,
        brand: &str,
        referred: &MemberKey,
    ) -> Result<Option<ReferralApplication>> {
        let state = self.state.read().await;
        Ok(state
            .applications
            .get(&(brand.to_string(), referred.clone()))
            .cloned())
    }

    async fn apply(
        &self,
        brand: &str,
        owner: &MemberKey,
        application: &ReferralApplication,
        owner_credit: NewEntry,
        referred_credit: NewEntry,
    ) -> Result<ReferralApplyOutcome> {
        self.check_writable().await?;
        let mut state = self.state.write().await;
        let key = (brand.to_string(), application.referred.clone());
        if let Some(existing) = state.applications.get(&key) {
            return Ok(ReferralApplyOutcome::AlreadyApplied(existing.clone()));
        }

        // Single write guard: the row and both credits land together.
        state.applications.insert(key, application.clone());
        append_locked(&mut state, brand, owner, owner_credit)?;
        append_locked(&mut state, brand, &application.referred, referred_credit)?;

        Ok(ReferralApplyOutcome::Applied(application.clone()))
    }

    async fn stats(&self, brand: &str, code: &str) -> Result<ReferralStats> {
        let state = self.state.read().await;
        let mut stats = ReferralStats {
            code: code.to_string(),
            referred_count: 0,
            points_awarded: 0,
        };
        for ((app_brand, _), application) in &state.applications {
            if app_brand == brand && application.code == code {
                stats.referred_count += 1;
                stats.points_awarded += application.referrer_bonus;
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl TierStateStore for MemoryStore {
    async fn tier_state(&self, brand: &str, member: &MemberKey) -> Result<Option<TierState>> {
        let state = self.state.read().await;
        Ok(state
            .tier_states
            .get(&(brand.to_string(), member.clone()))
            .cloned())
    }

    async fn put_tier_state(
        &self,
        brand: &str,
        member: &MemberKey,
        tier_state: &TierState,
    ) -> Result<()> {
        self.check_writable().await?;
        let mut state = self.state.write().await;
        state
            .tier_states
            .insert((brand.to_string(), member.clone()), tier_state.clone());
        Ok(())
    }
}
