//! Loyalty Ledger - points and referral engine
//!
//! A multi-brand loyalty engine built on an append-only points ledger:
//! balances and lifetime totals are projections over immutable entries,
//! redemptions and referral bonuses are idempotent atomic writes, and
//! membership tiers derive from lifetime earned with downgrade hysteresis.

pub mod config;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod ledger;
pub mod projection;
pub mod redemption;
pub mod referral;
pub mod storage;
pub mod tier;
pub mod utils;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_utils;
