//! Tier schedule interface.
//!
//! Thresholds are brand configuration owned outside this engine and
//! read-only here.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::ledger_store::Result;

/// One tier boundary: members at or above `min_lifetime_points` qualify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub tier_name: String,
    pub min_lifetime_points: i64,
}

/// Interface to a brand's tier configuration.
#[async_trait]
pub trait TierSchedule: Send + Sync {
    /// Thresholds for a brand, ascending by `min_lifetime_points`.
    /// Empty for brands without a tier program.
    async fn thresholds(&self, brand: &str) -> Result<Vec<TierThreshold>>;
}

/// Fixed in-memory schedule for standalone mode and tests.
#[derive(Default)]
pub struct StaticTierSchedule {
    schedules: RwLock<HashMap<String, Vec<TierThreshold>>>,
}

impl StaticTierSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a brand's thresholds. Sorted ascending on insert so readers
    /// never observe an unordered schedule.
    pub async fn set(&self, brand: &str, mut thresholds: Vec<TierThreshold>) {
        thresholds.sort_by_key(|t| t.min_lifetime_points);
        self.schedules
            .write()
            .await
            .insert(brand.to_string(), thresholds);
    }
}

#[async_trait]
impl TierSchedule for StaticTierSchedule {
    async fn thresholds(&self, brand: &str) -> Result<Vec<TierThreshold>> {
        let schedules = self.schedules.read().await;
        Ok(schedules.get(brand).cloned().unwrap_or_default())
    }
}
