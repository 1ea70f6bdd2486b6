//! Input validation for external data.
//!
//! Provides centralized validation for all fields that cross trust boundaries
//! (brand identifiers, member emails, referral codes, idempotency keys).
//! Every mutating path validates its inputs here before any lock is acquired.

use serde::{Deserialize, Serialize};

/// Length limits for validated fields.
pub mod limits {
    /// Maximum brand identifier length (e.g., "acme", "north-shop").
    pub const MAX_BRAND_LENGTH: usize = 64;
    /// Maximum email length accepted for member keys.
    pub const MAX_EMAIL_LENGTH: usize = 254;
    /// Maximum referral code length.
    pub const MAX_CODE_LENGTH: usize = 32;
    /// Maximum idempotency key length.
    pub const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 128;
    /// Maximum reference id length (reward ids, order ids).
    pub const MAX_REFERENCE_LENGTH: usize = 128;
    /// Maximum history page size; larger requests are clamped.
    pub const MAX_HISTORY_LIMIT: u32 = 100;
    /// History page size used when the caller passes 0.
    pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
}

/// Error constants for validation failures.
pub mod errmsg {
    pub const BRAND_EMPTY: &str = "brand id cannot be empty";
    pub const BRAND_TOO_LONG: &str = "brand id exceeds maximum length";
    pub const BRAND_INVALID_CHARS: &str =
        "brand id contains invalid characters (allowed: a-z, 0-9, _, -)";

    pub const EMAIL_EMPTY: &str = "member email cannot be empty";
    pub const EMAIL_TOO_LONG: &str = "member email exceeds maximum length";
    pub const EMAIL_MALFORMED: &str = "member email is not a valid address";

    pub const CODE_EMPTY: &str = "referral code cannot be empty";
    pub const CODE_TOO_LONG: &str = "referral code exceeds maximum length";
    pub const CODE_INVALID_CHARS: &str =
        "referral code contains invalid characters (allowed: A-Z, 0-9, -)";

    pub const IDEMPOTENCY_KEY_EMPTY: &str = "idempotency key cannot be empty";
    pub const IDEMPOTENCY_KEY_TOO_LONG: &str = "idempotency key exceeds maximum length";
    pub const IDEMPOTENCY_KEY_INVALID_CHARS: &str =
        "idempotency key contains invalid characters (allowed: a-zA-Z0-9_-)";

    pub const REFERENCE_TOO_LONG: &str = "reference id exceeds maximum length";

    pub const POINTS_NOT_POSITIVE: &str = "points must be positive";
}

/// A validation failure for a field crossing the trust boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Field that failed validation.
    pub field: &'static str,
    /// Human-readable reason, drawn from [`errmsg`].
    pub message: &'static str,
}

impl ValidationError {
    pub fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

/// Validate a brand identifier.
pub fn validate_brand(brand: &str) -> Result<(), ValidationError> {
    if brand.is_empty() {
        return Err(ValidationError::new("brand_id", errmsg::BRAND_EMPTY));
    }
    if brand.len() > limits::MAX_BRAND_LENGTH {
        return Err(ValidationError::new("brand_id", errmsg::BRAND_TOO_LONG));
    }
    if !brand
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ValidationError::new("brand_id", errmsg::BRAND_INVALID_CHARS));
    }
    Ok(())
}

/// Normalize an email into member-key form: trimmed, lower-cased.
///
/// Returns the normalized string, or an error when the address is not
/// plausibly an email (`local@domain` with a dot somewhere in the domain).
pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let normalized = email.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(ValidationError::new("member_key", errmsg::EMAIL_EMPTY));
    }
    if normalized.len() > limits::MAX_EMAIL_LENGTH {
        return Err(ValidationError::new("member_key", errmsg::EMAIL_TOO_LONG));
    }
    let Some((local, domain)) = normalized.split_once('@') else {
        return Err(ValidationError::new("member_key", errmsg::EMAIL_MALFORMED));
    };
    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || normalized.chars().any(char::is_whitespace)
    {
        return Err(ValidationError::new("member_key", errmsg::EMAIL_MALFORMED));
    }
    Ok(normalized)
}

/// Validate a referral code as received from a client.
pub fn validate_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() {
        return Err(ValidationError::new("code", errmsg::CODE_EMPTY));
    }
    if code.len() > limits::MAX_CODE_LENGTH {
        return Err(ValidationError::new("code", errmsg::CODE_TOO_LONG));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ValidationError::new("code", errmsg::CODE_INVALID_CHARS));
    }
    Ok(())
}

/// Validate a client-supplied idempotency key.
pub fn validate_idempotency_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::new(
            "idempotency_key",
            errmsg::IDEMPOTENCY_KEY_EMPTY,
        ));
    }
    if key.len() > limits::MAX_IDEMPOTENCY_KEY_LENGTH {
        return Err(ValidationError::new(
            "idempotency_key",
            errmsg::IDEMPOTENCY_KEY_TOO_LONG,
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::new(
            "idempotency_key",
            errmsg::IDEMPOTENCY_KEY_INVALID_CHARS,
        ));
    }
    Ok(())
}

/// Validate a reference id (reward id, order id). Empty is allowed.
pub fn validate_reference(reference: &str) -> Result<(), ValidationError> {
    if reference.len() > limits::MAX_REFERENCE_LENGTH {
        return Err(ValidationError::new(
            "reference_id",
            errmsg::REFERENCE_TOO_LONG,
        ));
    }
    Ok(())
}

/// Validate a points amount for an earn operation.
pub fn validate_points(points: i64) -> Result<(), ValidationError> {
    if points <= 0 {
        return Err(ValidationError::new("points", errmsg::POINTS_NOT_POSITIVE));
    }
    Ok(())
}

/// Clamp a history limit to the allowed range, applying the default for 0.
pub fn clamp_history_limit(limit: u32) -> u32 {
    if limit == 0 {
        limits::DEFAULT_HISTORY_LIMIT
    } else {
        limit.min(limits::MAX_HISTORY_LIMIT)
    }
}
