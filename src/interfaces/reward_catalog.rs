//! Reward catalog interface.
//!
//! The catalog is owned by the commerce side and read-only to this engine.
//! Lookups happen before any member lock is acquired.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::ledger_store::Result;

/// A redeemable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub reward_id: String,
    pub cost_points: i64,
    pub active: bool,
}

/// Interface to the external reward catalog.
#[async_trait]
pub trait RewardCatalog: Send + Sync {
    /// Look up a reward within a brand. `None` for unknown rewards.
    async fn reward(&self, brand: &str, reward_id: &str) -> Result<Option<Reward>>;
}

/// Fixed in-memory catalog for standalone mode and tests.
#[derive(Default)]
pub struct StaticRewardCatalog {
    rewards: RwLock<HashMap<(String, String), Reward>>,
}

impl StaticRewardCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, brand: &str, reward: Reward) {
        self.rewards
            .write()
            .await
            .insert((brand.to_string(), reward.reward_id.clone()), reward);
    }
}

#[async_trait]
impl RewardCatalog for StaticRewardCatalog {
    async fn reward(&self, brand: &str, reward_id: &str) -> Result<Option<Reward>> {
        let rewards = self.rewards.read().await;
        Ok(rewards
            .get(&(brand.to_string(), reward_id.to_string()))
            .cloned())
    }
}
