//! SQLite storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::interfaces::{
    LedgerStore, ReferralApplyOutcome, ReferralStore, Result, StorageError, TierStateStore,
};
use crate::ledger::{AppendOutcome, LedgerEntry, MemberKey, NewEntry, Reason};
use crate::projection::BalanceProjection;
use crate::redemption::RedemptionOutcome;
use crate::referral::{ReferralApplication, ReferralStats};
use crate::storage::schema::{
    Balances, LedgerEntries, RedemptionOutcomes, ReferralApplications, ReferralCodes, TierStates,
    CREATE_BALANCES_TABLE, CREATE_LEDGER_ENTRIES_TABLE, CREATE_LEDGER_IDEMPOTENCY_INDEX,
    CREATE_REDEMPTION_OUTCOMES_TABLE, CREATE_REFERRAL_APPLICATIONS_INDEX,
    CREATE_REFERRAL_APPLICATIONS_TABLE, CREATE_REFERRAL_CODES_INDEX, CREATE_REFERRAL_CODES_TABLE,
    CREATE_TIER_STATES_TABLE,
};
use crate::tier::TierState;

/// SQLite implementation of all storage traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp {raw}: {e}")))
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry> {
    let brand: String = row.get("brand");
    let member: String = row.get("member");
    let entry_id: i64 = row.get("entry_id");
    let reason_code: String = row.get("reason");
    let created_at: String = row.get("created_at");

    let reason = Reason::from_code(&reason_code)
        .ok_or_else(|| StorageError::Corrupt(format!("unknown reason code {reason_code}")))?;

    Ok(LedgerEntry {
        brand_id: brand,
        member_key: MemberKey::new(&member)
            .map_err(|e| StorageError::Corrupt(format!("bad member key {member}: {e}")))?,
        entry_id: entry_id as u64,
        delta: row.get("delta"),
        reason,
        reference_id: row.get("reference_id"),
        idempotency_key: row.get("idempotency_key"),
        created_at: parse_timestamp(&created_at)?,
    })
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        for ddl in [
            CREATE_LEDGER_ENTRIES_TABLE,
            CREATE_LEDGER_IDEMPOTENCY_INDEX,
            CREATE_BALANCES_TABLE,
            CREATE_REDEMPTION_OUTCOMES_TABLE,
            CREATE_REFERRAL_CODES_TABLE,
            CREATE_REFERRAL_CODES_INDEX,
            CREATE_REFERRAL_APPLICATIONS_TABLE,
            CREATE_REFERRAL_APPLICATIONS_INDEX,
            CREATE_TIER_STATES_TABLE,
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn projection_tx(
        conn: &mut SqliteConnection,
        brand: &str,
        member: &MemberKey,
    ) -> Result<BalanceProjection> {
        let query = Query::select()
            .columns([Balances::Balance, Balances::LifetimeEarned, Balances::Entries])
            .from(Balances::Table)
            .and_where(Expr::col(Balances::Brand).eq(brand))
            .and_where(Expr::col(Balances::Member).eq(member.as_str()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        Ok(match row {
            Some(row) => BalanceProjection {
                balance: row.get("balance"),
                lifetime_earned: row.get("lifetime_earned"),
                entries: row.get::<i64, _>("entries") as u64,
            },
            None => BalanceProjection::default(),
        })
    }

    /// Append within an already-started transaction: replay check, entry
    /// insert, projection upsert.
    async fn append_tx(
        conn: &mut SqliteConnection,
        brand: &str,
        member: &MemberKey,
        new: NewEntry,
    ) -> Result<AppendOutcome> {
        let replay_query = Query::select()
            .columns([
                LedgerEntries::Brand,
                LedgerEntries::Member,
                LedgerEntries::EntryId,
                LedgerEntries::Delta,
                LedgerEntries::Reason,
                LedgerEntries::ReferenceId,
                LedgerEntries::IdempotencyKey,
                LedgerEntries::CreatedAt,
            ])
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::Brand).eq(brand))
            .and_where(Expr::col(LedgerEntries::Member).eq(member.as_str()))
            .and_where(Expr::col(LedgerEntries::IdempotencyKey).eq(&new.idempotency_key))
            .to_string(SqliteQueryBuilder);

        if let Some(row) = sqlx::query(&replay_query).fetch_optional(&mut *conn).await? {
            let entry = row_to_entry(&row)?;
            let projection = Self::projection_tx(conn, brand, member).await?;
            return Ok(AppendOutcome {
                entry,
                replayed: true,
                balance_after: projection.balance,
                lifetime_after: projection.lifetime_earned,
            });
        }

        let mut projection = Self::projection_tx(conn, brand, member).await?;
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

        let insert = Query::insert()
            .into_table(LedgerEntries::Table)
            .columns([
                LedgerEntries::Brand,
                LedgerEntries::Member,
                LedgerEntries::EntryId,
                LedgerEntries::Delta,
                LedgerEntries::Reason,
                LedgerEntries::ReferenceId,
                LedgerEntries::IdempotencyKey,
                LedgerEntries::CreatedAt,
            ])
            .values_panic([
                brand.into(),
                member.as_str().into(),
                (entry.entry_id as i64).into(),
                entry.delta.into(),
                entry.reason.code().into(),
                entry.reference_id.clone().into(),
                entry.idempotency_key.clone().into(),
                entry.created_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);
        sqlx::query(&insert).execute(&mut *conn).await?;

        let upsert = Query::insert()
            .replace()
            .into_table(Balances::Table)
            .columns([
                Balances::Brand,
                Balances::Member,
                Balances::Balance,
                Balances::LifetimeEarned,
                Balances::Entries,
            ])
            .values_panic([
                brand.into(),
                member.as_str().into(),
                projection.balance.into(),
                projection.lifetime_earned.into(),
                (projection.entries as i64).into(),
            ])
            .to_string(SqliteQueryBuilder);
        sqlx::query(&upsert).execute(&mut *conn).await?;

        Ok(AppendOutcome {
            entry,
            replayed: false,
            balance_after: projection.balance,
            lifetime_after: projection.lifetime_earned,
        })
    }

    async fn projection_read(&self, brand: &str, member: &MemberKey) -> Result<BalanceProjection> {
        let mut conn = self.pool.acquire().await?;
        Self::projection_tx(&mut conn, brand, member).await
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn append(
        &self,
        brand: &str,
        member: &MemberKey,
        entry: NewEntry,
    ) -> Result<AppendOutcome> {
        // BEGIN IMMEDIATE acquires the write lock upfront, preventing
        // deadlocks when concurrent DEFERRED transactions race to upgrade
        // from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = Self::append_tx(&mut conn, brand, member, entry).await;

        match result {
            Ok(outcome) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(outcome)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn balance(&self, brand: &str, member: &MemberKey) -> Result<i64> {
        Ok(self.projection_read(brand, member).await?.balance)
    }

    async fn lifetime_earned(&self, brand: &str, member: &MemberKey) -> Result<i64> {
        Ok(self.projection_read(brand, member).await?.lifetime_earned)
    }

    async fn history(
        &self,
        brand: &str,
        member: &MemberKey,
        page: u32,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>> {
        let query = Query::select()
            .columns([
                LedgerEntries::Brand,
                LedgerEntries::Member,
                LedgerEntries::EntryId,
                LedgerEntries::Delta,
                LedgerEntries::Reason,
                LedgerEntries::ReferenceId,
                LedgerEntries::IdempotencyKey,
                LedgerEntries::CreatedAt,
            ])
            .from(LedgerEntries::Table)
            .and_where(Expr::col(LedgerEntries::Brand).eq(brand))
            .and_where(Expr::col(LedgerEntries::Member).eq(member.as_str()))
            .order_by(LedgerEntries::EntryId, Order::Desc)
            .limit(limit as u64)
            .offset(page as u64 * limit as u64)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }

    async fn redemption_outcome(
        &self,
        brand: &str,
        member: &MemberKey,
        idempotency_key: &str,
    ) -> Result<Option<RedemptionOutcome>> {
        let query = Query::select()
            .column(RedemptionOutcomes::Outcome)
            .from(RedemptionOutcomes::Table)
            .and_where(Expr::col(RedemptionOutcomes::Brand).eq(brand))
            .and_where(Expr::col(RedemptionOutcomes::Member).eq(member.as_str()))
            .and_where(Expr::col(RedemptionOutcomes::IdempotencyKey).eq(idempotency_key))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let raw: String = row.get("outcome");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn record_redemption_outcome(
        &self,
        brand: &str,
        member: &MemberKey,
        idempotency_key: &str,
        outcome: &RedemptionOutcome,
    ) -> Result<()> {
        let raw = serde_json::to_string(outcome)?;
        // First write wins: an outcome, once resolved, is immutable.
        let query = Query::insert()
            .on_conflict(
                OnConflict::columns([
                    RedemptionOutcomes::Brand,
                    RedemptionOutcomes::Member,
                    RedemptionOutcomes::IdempotencyKey,
                ])
                .do_nothing()
                .to_owned(),
            )
            .into_table(RedemptionOutcomes::Table)
            .columns([
                RedemptionOutcomes::Brand,
                RedemptionOutcomes::Member,
                RedemptionOutcomes::IdempotencyKey,
                RedemptionOutcomes::Outcome,
                RedemptionOutcomes::CreatedAt,
            ])
            .values_panic([
                brand.into(),
                member.as_str().into(),
                idempotency_key.into(),
                raw.into(),
                Utc::now().to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ReferralStore for SqliteStore {
    async fn put_code(&self, brand: &str, owner: &MemberKey, code: &str) -> Result<String> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<String> = async {
            let existing = Query::select()
                .column(ReferralCodes::Code)
                .from(ReferralCodes::Table)
                .and_where(Expr::col(ReferralCodes::Brand).eq(brand))
                .and_where(Expr::col(ReferralCodes::Owner).eq(owner.as_str()))
                .to_string(SqliteQueryBuilder);

            if let Some(row) = sqlx::query(&existing).fetch_optional(&mut *conn).await? {
                return Ok(row.get("code"));
            }

            let insert = Query::insert()
                .into_table(ReferralCodes::Table)
                .columns([ReferralCodes::Brand, ReferralCodes::Owner, ReferralCodes::Code])
                .values_panic([brand.into(), owner.as_str().into(), code.into()])
                .to_string(SqliteQueryBuilder);
            sqlx::query(&insert).execute(&mut *conn).await?;
            Ok(code.to_string())
        }
        .await;

        match result {
            Ok(stored) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(stored)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn code_owner(&self, brand: &str, code: &str) -> Result<Option<MemberKey>> {
        let query = Query::select()
            .column(ReferralCodes::Owner)
            .from(ReferralCodes::Table)
            .and_where(Expr::col(ReferralCodes::Brand).eq(brand))
            .and_where(Expr::col(ReferralCodes::Code).eq(code))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let owner: String = row.get("owner");
                Ok(Some(MemberKey::new(&owner).map_err(|e| {
                    StorageError::Corrupt(format!("bad owner key {owner}: {e}"))
                })?))
            }
            None => Ok(None),
        }
    }

    async fn application_for(
        &self,
        brand: &str,
        referred: &MemberKey,
    ) -> Result<Option<ReferralApplication>> {
        let mut conn = self.pool.acquire().await?;
        Self::application_tx(&mut conn, brand, referred).await
    }

    async fn apply(
        &self,
        brand: &str,
        owner: &MemberKey,
        application: &ReferralApplication,
        owner_credit: NewEntry,
        referred_credit: NewEntry,
    ) -> Result<ReferralApplyOutcome> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<ReferralApplyOutcome> = async {
            if let Some(existing) =
                Self::application_tx(&mut conn, brand, &application.referred).await?
            {
                return Ok(ReferralApplyOutcome::AlreadyApplied(existing));
            }

            let insert = Query::insert()
                .into_table(ReferralApplications::Table)
                .columns([
                    ReferralApplications::Brand,
                    ReferralApplications::Referred,
                    ReferralApplications::Code,
                    ReferralApplications::ReferrerBonus,
                    ReferralApplications::RefereeBonus,
                    ReferralApplications::IdempotencyKey,
                    ReferralApplications::AppliedAt,
                ])
                .values_panic([
                    brand.into(),
                    application.referred.as_str().into(),
                    application.code.clone().into(),
                    application.referrer_bonus.into(),
                    application.referee_bonus.into(),
                    application.idempotency_key.clone().into(),
                    application.applied_at.to_rfc3339().into(),
                ])
                .to_string(SqliteQueryBuilder);
            sqlx::query(&insert).execute(&mut *conn).await?;

            Self::append_tx(&mut conn, brand, owner, owner_credit).await?;
            Self::append_tx(&mut conn, brand, &application.referred, referred_credit).await?;

            Ok(ReferralApplyOutcome::Applied(application.clone()))
        }
        .await;

        match result {
            Ok(outcome) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(outcome)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn stats(&self, brand: &str, code: &str) -> Result<ReferralStats> {
        let query = Query::select()
            .expr(Expr::col(ReferralApplications::Referred).count())
            .expr(Expr::col(ReferralApplications::ReferrerBonus).sum())
            .from(ReferralApplications::Table)
            .and_where(Expr::col(ReferralApplications::Brand).eq(brand))
            .and_where(Expr::col(ReferralApplications::Code).eq(code))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        let referred_count: i64 = row.get(0);
        let points_awarded: Option<i64> = row.get(1);

        Ok(ReferralStats {
            code: code.to_string(),
            referred_count: referred_count as u64,
            points_awarded: points_awarded.unwrap_or(0),
        })
    }
}

impl SqliteStore {
    async fn application_tx(
        conn: &mut SqliteConnection,
        brand: &str,
        referred: &MemberKey,
    ) -> Result<Option<ReferralApplication>> {
        let query = Query::select()
            .columns([
                ReferralApplications::Brand,
                ReferralApplications::Referred,
                ReferralApplications::Code,
                ReferralApplications::ReferrerBonus,
                ReferralApplications::RefereeBonus,
                ReferralApplications::IdempotencyKey,
                ReferralApplications::AppliedAt,
            ])
            .from(ReferralApplications::Table)
            .and_where(Expr::col(ReferralApplications::Brand).eq(brand))
            .and_where(Expr::col(ReferralApplications::Referred).eq(referred.as_str()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        match row {
            Some(row) => {
                let referred_raw: String = row.get("referred");
                let applied_at: String = row.get("applied_at");
                Ok(Some(ReferralApplication {
                    brand_id: row.get("brand"),
                    code: row.get("code"),
                    referred: MemberKey::new(&referred_raw).map_err(|e| {
                        StorageError::Corrupt(format!("bad referred key {referred_raw}: {e}"))
                    })?,
                    referrer_bonus: row.get("referrer_bonus"),
                    referee_bonus: row.get("referee_bonus"),
                    idempotency_key: row.get("idempotency_key"),
                    applied_at: parse_timestamp(&applied_at)?,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TierStateStore for SqliteStore {
    async fn tier_state(&self, brand: &str, member: &MemberKey) -> Result<Option<TierState>> {
        let query = Query::select()
            .columns([TierStates::TierName, TierStates::AttainedAt])
            .from(TierStates::Table)
            .and_where(Expr::col(TierStates::Brand).eq(brand))
            .and_where(Expr::col(TierStates::Member).eq(member.as_str()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => {
                let attained_at: String = row.get("attained_at");
                Ok(Some(TierState {
                    tier_name: row.get("tier_name"),
                    attained_at: parse_timestamp(&attained_at)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn put_tier_state(
        &self,
        brand: &str,
        member: &MemberKey,
        state: &TierState,
    ) -> Result<()> {
        let query = Query::insert()
            .replace()
            .into_table(TierStates::Table)
            .columns([
                TierStates::Brand,
                TierStates::Member,
                TierStates::TierName,
                TierStates::AttainedAt,
            ])
            .values_panic([
                brand.into(),
                member.as_str().into(),
                state.tier_name.clone().into(),
                state.attained_at.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{earn, member};

    async fn store() -> SqliteStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = SqliteStore::new(pool);
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let store = store().await;
        let alice = member("alice@example.com");

        let outcome = store.append("acme", &alice, earn(100, "k1")).await.unwrap();
        assert_eq!(outcome.entry.entry_id, 0);
        assert!(!outcome.replayed);
        assert_eq!(outcome.balance_after, 100);

        assert_eq!(store.balance("acme", &alice).await.unwrap(), 100);
        assert_eq!(store.lifetime_earned("acme", &alice).await.unwrap(), 100);

        let history = store.history("acme", &alice, 0, 20).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].delta, 100);
        assert_eq!(history[0].reason, Reason::Earn);
    }

    #[tokio::test]
    async fn test_append_replay_does_not_double_apply() {
        let store = store().await;
        let alice = member("alice@example.com");

        let first = store.append("acme", &alice, earn(100, "k1")).await.unwrap();
        let replay = store.append("acme", &alice, earn(100, "k1")).await.unwrap();

        assert!(replay.replayed);
        assert_eq!(replay.entry.entry_id, first.entry.entry_id);
        assert_eq!(store.balance("acme", &alice).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_history_newest_first_with_paging() {
        let store = store().await;
        let alice = member("alice@example.com");

        for i in 0..5 {
            store
                .append("acme", &alice, earn(10, &format!("k{i}")))
                .await
                .unwrap();
        }

        let page = store.history("acme", &alice, 1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].entry_id, 2);
        assert_eq!(page[1].entry_id, 1);
    }

    #[tokio::test]
    async fn test_redemption_outcome_round_trip() {
        let store = store().await;
        let alice = member("alice@example.com");

        let outcome = RedemptionOutcome::InsufficientBalance {
            balance: 10,
            cost: 60,
        };
        store
            .record_redemption_outcome("acme", &alice, "r1", &outcome)
            .await
            .unwrap();
        assert_eq!(
            store.redemption_outcome("acme", &alice, "r1").await.unwrap(),
            Some(outcome)
        );
    }

    #[tokio::test]
    async fn test_recorded_outcome_is_immutable() {
        let store = store().await;
        let alice = member("alice@example.com");

        let original = RedemptionOutcome::Redeemed {
            reward_id: "mug".into(),
            cost: 60,
            entry_id: 0,
            balance_after: 40,
        };
        store
            .record_redemption_outcome("acme", &alice, "r1", &original)
            .await
            .unwrap();

        // A late conflicting write for the same key changes nothing.
        store
            .record_redemption_outcome(
                "acme",
                &alice,
                "r1",
                &RedemptionOutcome::InsufficientBalance {
                    balance: 0,
                    cost: 60,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            store.redemption_outcome("acme", &alice, "r1").await.unwrap(),
            Some(original)
        );
    }

    #[tokio::test]
    async fn test_codes_and_atomic_apply() {
        let store = store().await;
        let alice = member("alice@example.com");
        let bob = member("bob@example.com");

        let stored = store.put_code("acme", &alice, "R-AAAA1111").await.unwrap();
        assert_eq!(stored, "R-AAAA1111");
        assert_eq!(store.put_code("acme", &alice, "R-OTHER").await.unwrap(), "R-AAAA1111");
        assert_eq!(
            store.code_owner("acme", "R-AAAA1111").await.unwrap(),
            Some(alice.clone())
        );

        let application = ReferralApplication {
            brand_id: "acme".into(),
            code: "R-AAAA1111".into(),
            referred: bob.clone(),
            referrer_bonus: 100,
            referee_bonus: 50,
            idempotency_key: "apply-1".into(),
            applied_at: Utc::now(),
        };

        let outcome = store
            .apply(
                "acme",
                &alice,
                &application,
                NewEntry {
                    delta: 100,
                    reason: Reason::ReferralBonus,
                    reference_id: "R-AAAA1111".into(),
                    idempotency_key: "apply-1-referrer".into(),
                },
                NewEntry {
                    delta: 50,
                    reason: Reason::ReferralBonus,
                    reference_id: "R-AAAA1111".into(),
                    idempotency_key: "apply-1-referee".into(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ReferralApplyOutcome::Applied(_)));

        assert_eq!(store.balance("acme", &alice).await.unwrap(), 100);
        assert_eq!(store.balance("acme", &bob).await.unwrap(), 50);

        let outcome = store
            .apply(
                "acme",
                &alice,
                &application,
                earn(100, "apply-2-referrer"),
                earn(50, "apply-2-referee"),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ReferralApplyOutcome::AlreadyApplied(_)));
        assert_eq!(store.balance("acme", &bob).await.unwrap(), 50);

        let stats = store.stats("acme", "R-AAAA1111").await.unwrap();
        assert_eq!(stats.referred_count, 1);
        assert_eq!(stats.points_awarded, 100);
    }

    #[tokio::test]
    async fn test_tier_state_round_trip() {
        let store = store().await;
        let alice = member("alice@example.com");

        assert!(store.tier_state("acme", &alice).await.unwrap().is_none());
        let state = TierState {
            tier_name: "gold".into(),
            attained_at: Utc::now(),
        };
        store.put_tier_state("acme", &alice, &state).await.unwrap();
        let loaded = store.tier_state("acme", &alice).await.unwrap().unwrap();
        assert_eq!(loaded.tier_name, "gold");
    }
}
