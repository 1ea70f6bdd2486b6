//! Ledger storage interface.

use async_trait::async_trait;

use crate::ledger::{AppendOutcome, LedgerEntry, MemberKey, NewEntry};
use crate::redemption::RedemptionOutcome;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Transient durability failure; safe to retry with the same
    /// idempotency key.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored record failed to decode; not retryable.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Interface for ledger persistence.
///
/// All operations take `brand_id` as their first parameter; no
/// implementation may read or write across a brand boundary. The
/// `(brand_id, member_key, entry_id)` tuple forms the unique key for
/// stored entries.
///
/// Implementations:
/// - `MemoryStore`: in-memory storage (standalone mode, tests)
/// - `SqliteStore`: SQLite storage
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append an entry to a member's ledger.
    ///
    /// If the idempotency key was already recorded for this member, the
    /// previously-created entry is returned with `replayed = true` and the
    /// delta is not re-applied. Otherwise the entry insert and the balance
    /// projection update commit as one atomic unit.
    async fn append(
        &self,
        brand: &str,
        member: &MemberKey,
        entry: NewEntry,
    ) -> Result<AppendOutcome>;

    /// Cached spendable balance. 0 for members with no entries.
    async fn balance(&self, brand: &str, member: &MemberKey) -> Result<i64>;

    /// Monotonic lifetime-earned total. 0 for members with no entries.
    async fn lifetime_earned(&self, brand: &str, member: &MemberKey) -> Result<i64>;

    /// Page of entries, newest first. `page` is 0-based; the caller clamps
    /// `limit`. Unknown members and out-of-range pages yield an empty page.
    async fn history(
        &self,
        brand: &str,
        member: &MemberKey,
        page: u32,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>>;

    /// Previously-resolved redemption outcome for an idempotency key, if any.
    async fn redemption_outcome(
        &self,
        brand: &str,
        member: &MemberKey,
        idempotency_key: &str,
    ) -> Result<Option<RedemptionOutcome>>;

    /// Record the resolved outcome (success or insufficient balance) for an
    /// idempotency key so retries replay it unchanged. First write wins: a
    /// recorded outcome is never overwritten.
    async fn record_redemption_outcome(
        &self,
        brand: &str,
        member: &MemberKey,
        idempotency_key: &str,
        outcome: &RedemptionOutcome,
    ) -> Result<()>;
}
