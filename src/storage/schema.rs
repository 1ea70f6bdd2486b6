//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Ledger entries table schema.
#[derive(Iden)]
pub enum LedgerEntries {
    Table,
    #[iden = "brand"]
    Brand,
    #[iden = "member"]
    Member,
    #[iden = "entry_id"]
    EntryId,
    #[iden = "delta"]
    Delta,
    #[iden = "reason"]
    Reason,
    #[iden = "reference_id"]
    ReferenceId,
    #[iden = "idempotency_key"]
    IdempotencyKey,
    #[iden = "created_at"]
    CreatedAt,
}

/// Balance projections table schema.
#[derive(Iden)]
pub enum Balances {
    Table,
    #[iden = "brand"]
    Brand,
    #[iden = "member"]
    Member,
    #[iden = "balance"]
    Balance,
    #[iden = "lifetime_earned"]
    LifetimeEarned,
    #[iden = "entries"]
    Entries,
}

/// Stored redemption outcomes table schema.
#[derive(Iden)]
pub enum RedemptionOutcomes {
    Table,
    #[iden = "brand"]
    Brand,
    #[iden = "member"]
    Member,
    #[iden = "idempotency_key"]
    IdempotencyKey,
    #[iden = "outcome"]
    Outcome,
    #[iden = "created_at"]
    CreatedAt,
}

/// Referral codes table schema.
#[derive(Iden)]
pub enum ReferralCodes {
    Table,
    #[iden = "brand"]
    Brand,
    #[iden = "owner"]
    Owner,
    #[iden = "code"]
    Code,
}

/// Referral applications table schema.
#[derive(Iden)]
pub enum ReferralApplications {
    Table,
    #[iden = "brand"]
    Brand,
    #[iden = "referred"]
    Referred,
    #[iden = "code"]
    Code,
    #[iden = "referrer_bonus"]
    ReferrerBonus,
    #[iden = "referee_bonus"]
    RefereeBonus,
    #[iden = "idempotency_key"]
    IdempotencyKey,
    #[iden = "applied_at"]
    AppliedAt,
}

/// Tier states table schema.
#[derive(Iden)]
pub enum TierStates {
    Table,
    #[iden = "brand"]
    Brand,
    #[iden = "member"]
    Member,
    #[iden = "tier_name"]
    TierName,
    #[iden = "attained_at"]
    AttainedAt,
}

/// SQL for creating the ledger entries table.
pub const CREATE_LEDGER_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_entries (
    brand TEXT NOT NULL,
    member TEXT NOT NULL,
    entry_id INTEGER NOT NULL,
    delta INTEGER NOT NULL,
    reason TEXT NOT NULL,
    reference_id TEXT NOT NULL,
    idempotency_key TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (brand, member, entry_id)
);
"#;

/// SQL for the idempotency-key uniqueness index.
pub const CREATE_LEDGER_IDEMPOTENCY_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_idempotency
    ON ledger_entries(brand, member, idempotency_key);
"#;

/// SQL for creating the balance projections table.
pub const CREATE_BALANCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS balances (
    brand TEXT NOT NULL,
    member TEXT NOT NULL,
    balance INTEGER NOT NULL,
    lifetime_earned INTEGER NOT NULL,
    entries INTEGER NOT NULL,
    PRIMARY KEY (brand, member)
);
"#;

/// SQL for creating the redemption outcomes table.
pub const CREATE_REDEMPTION_OUTCOMES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS redemption_outcomes (
    brand TEXT NOT NULL,
    member TEXT NOT NULL,
    idempotency_key TEXT NOT NULL,
    outcome TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (brand, member, idempotency_key)
);
"#;

/// SQL for creating the referral codes table.
pub const CREATE_REFERRAL_CODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS referral_codes (
    brand TEXT NOT NULL,
    owner TEXT NOT NULL,
    code TEXT NOT NULL,
    PRIMARY KEY (brand, owner)
);
"#;

/// SQL for the code lookup index.
pub const CREATE_REFERRAL_CODES_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_referral_codes_code
    ON referral_codes(brand, code);
"#;

/// SQL for creating the referral applications table.
pub const CREATE_REFERRAL_APPLICATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS referral_applications (
    brand TEXT NOT NULL,
    referred TEXT NOT NULL,
    code TEXT NOT NULL,
    referrer_bonus INTEGER NOT NULL,
    referee_bonus INTEGER NOT NULL,
    idempotency_key TEXT NOT NULL,
    applied_at TEXT NOT NULL,
    PRIMARY KEY (brand, referred)
);
"#;

/// SQL for the per-code stats index.
pub const CREATE_REFERRAL_APPLICATIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_referral_applications_code
    ON referral_applications(brand, code);
"#;

/// SQL for creating the tier states table.
pub const CREATE_TIER_STATES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tier_states (
    brand TEXT NOT NULL,
    member TEXT NOT NULL,
    tier_name TEXT NOT NULL,
    attained_at TEXT NOT NULL,
    PRIMARY KEY (brand, member)
);
"#;
