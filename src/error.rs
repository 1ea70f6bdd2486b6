//! Engine error taxonomy.
//!
//! Validation and business-rule failures are terminal and returned
//! synchronously. Storage errors are retried internally a bounded number
//! of times before surfacing. Idempotency-key replay is not an error:
//! replayed operations return the original result.

use crate::interfaces::StorageError;
use crate::validation::ValidationError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, LoyaltyError>;

/// Something a query or mutation referenced that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFound {
    #[error("reward not found: brand={brand_id}, reward={reward_id}")]
    Reward { brand_id: String, reward_id: String },

    #[error("referral code not found: brand={brand_id}, code={code}")]
    ReferralCode { brand_id: String, code: String },
}

/// A business invariant rejected the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleViolation {
    #[error("insufficient balance: have {balance}, need {cost}")]
    InsufficientBalance { balance: i64, cost: i64 },

    #[error("members cannot apply their own referral code")]
    SelfReferral,

    #[error("member has already been referred in this brand")]
    AlreadyReferred,

    #[error("redemption below brand minimum: cost {cost}, minimum {minimum}")]
    BelowMinimumRedemption { cost: i64, minimum: i64 },
}

/// Top-level engine error.
#[derive(Debug, thiserror::Error)]
pub enum LoyaltyError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("not found: {0}")]
    NotFound(#[from] NotFound),

    #[error("business rule violation: {0}")]
    Rule(#[from] RuleViolation),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl LoyaltyError {
    /// Whether the caller may retry with the same idempotency key. Only
    /// transient storage failures qualify; a corrupt stored record is
    /// terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoyaltyError::Storage(err) => crate::utils::retry::is_retryable(err),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_storage_errors_are_retryable() {
        assert!(LoyaltyError::Storage(StorageError::Unavailable("io".into())).is_retryable());
        // A bad stored record surfaces immediately; backoff cannot help.
        assert!(!LoyaltyError::Storage(StorageError::Corrupt("bad row".into())).is_retryable());
        assert!(!LoyaltyError::Rule(RuleViolation::SelfReferral).is_retryable());
        assert!(!LoyaltyError::NotFound(NotFound::ReferralCode {
            brand_id: "acme".into(),
            code: "R-NOPE".into(),
        })
        .is_retryable());
    }
}
