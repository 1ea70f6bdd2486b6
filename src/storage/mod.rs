//! Storage implementations.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::StorageConfig;
use crate::interfaces::{LedgerStore, ReferralStore, TierStateStore};

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Trait-object handles over one backend instance.
///
/// All three views share the same underlying store so cross-record writes
/// (referral row plus two credits) stay atomic.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn LedgerStore>,
    pub referrals: Arc<dyn ReferralStore>,
    pub tiers: Arc<dyn TierStateStore>,
}

impl Stores {
    /// Wrap a single backend implementing all storage traits.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: LedgerStore + ReferralStore + TierStateStore + 'static,
    {
        Self {
            ledger: backend.clone(),
            referrals: backend.clone(),
            tiers: backend,
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Stores, Box<dyn std::error::Error>> {
    info!("Storage: {} at {}", config.storage_type, config.path);

    match config.storage_type.as_str() {
        "memory" => Ok(Stores::from_backend(Arc::new(MemoryStore::new()))),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)?;
            }

            let pool =
                sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.path)).await?;

            let store = Arc::new(SqliteStore::new(pool));
            store.init().await?;

            Ok(Stores::from_backend(store))
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => {
            error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
        other => {
            error!("Unknown storage type: {}", other);
            Err(format!("Unknown storage type: {}", other).into())
        }
    }
}
