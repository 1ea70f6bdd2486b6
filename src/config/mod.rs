//! Application configuration.
//!
//! Aggregates engine configuration into a single Config struct that can be
//! loaded from YAML files or environment variables.

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "LOYALTY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "LOYALTY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "LOYALTY_LOG";

/// Main engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend configuration.
    pub storage: StorageConfig,
    /// Referral bonus amounts and code derivation salt.
    pub referral: ReferralConfig,
    /// Redemption policy.
    pub redemption: RedemptionConfig,
    /// Tier downgrade hysteresis.
    pub tier: TierConfig,
    /// Internal storage retry bounds.
    pub retry: RetryConfig,
}

/// Storage backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend type: "memory" or "sqlite".
    pub storage_type: String,
    /// Database path for file-backed backends.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: "memory".to_string(),
            path: "data/loyalty.db".to_string(),
        }
    }
}

/// Referral program settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    /// Points credited to the code owner on a successful application.
    pub referrer_bonus: i64,
    /// Points credited to the referred member.
    pub referee_bonus: i64,
    /// Brand-independent salt mixed into code derivation. Changing it
    /// changes every code, so treat it as fixed once issued.
    pub code_salt: String,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            referrer_bonus: 100,
            referee_bonus: 50,
            code_salt: "loyalty".to_string(),
        }
    }
}

/// Redemption policy settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedemptionConfig {
    /// Rewards costing fewer points than this are rejected. 0 disables
    /// the floor.
    pub min_points: i64,
}

/// Tier hysteresis settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Downgrades are suppressed for this long after a threshold crossing.
    pub grace_window_secs: u64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            // 30 days
            grace_window_secs: 30 * 24 * 3600,
        }
    }
}

/// Internal retry bounds for transient storage failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retry attempts before a storage error surfaces.
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}
