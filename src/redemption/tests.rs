use std::sync::Arc;

use super::*;
use crate::error::LoyaltyError;
use crate::interfaces::{Reward, StaticRewardCatalog};
use crate::storage::MemoryStore;
use crate::test_utils::{earn, member};

async fn setup(min_points: i64) -> (Arc<MemoryStore>, RedemptionCoordinator) {
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(StaticRewardCatalog::new());
    catalog
        .insert(
            "acme",
            Reward {
                reward_id: "mug".into(),
                cost_points: 60,
                active: true,
            },
        )
        .await;
    catalog
        .insert(
            "acme",
            Reward {
                reward_id: "retired-hat".into(),
                cost_points: 10,
                active: false,
            },
        )
        .await;
    let coordinator = RedemptionCoordinator::new(
        store.clone(),
        catalog,
        Arc::new(KeyLocks::new()),
        min_points,
    );
    (store, coordinator)
}

#[tokio::test]
async fn test_redeem_debits_ledger() {
    let (store, coordinator) = setup(0).await;
    let alice = member("alice@example.com");
    store.append("acme", &alice, earn(100, "seed")).await.unwrap();

    let redemption = coordinator
        .redeem("acme", &alice, "mug", "r1")
        .await
        .unwrap();

    assert_eq!(redemption.cost, 60);
    assert_eq!(redemption.balance_after, 40);
    assert_eq!(store.balance("acme", &alice).await.unwrap(), 40);
    // Lifetime earned is untouched by spending.
    assert_eq!(store.lifetime_earned("acme", &alice).await.unwrap(), 100);
}

#[tokio::test]
async fn test_redeem_is_idempotent() {
    let (store, coordinator) = setup(0).await;
    let alice = member("alice@example.com");
    store.append("acme", &alice, earn(100, "seed")).await.unwrap();

    let first = coordinator.redeem("acme", &alice, "mug", "r1").await.unwrap();
    let replay = coordinator.redeem("acme", &alice, "mug", "r1").await.unwrap();

    assert_eq!(first, replay);
    assert_eq!(store.balance("acme", &alice).await.unwrap(), 40);
}

#[tokio::test]
async fn test_insufficient_balance_is_recorded_and_replayed() {
    let (store, coordinator) = setup(0).await;
    let alice = member("alice@example.com");
    store.append("acme", &alice, earn(10, "seed")).await.unwrap();

    let err = coordinator.redeem("acme", &alice, "mug", "r1").await.unwrap_err();
    assert!(matches!(
        err,
        LoyaltyError::Rule(RuleViolation::InsufficientBalance {
            balance: 10,
            cost: 60
        })
    ));

    // Balance recovers, but the idempotency key stays bound to the
    // original failure.
    store.append("acme", &alice, earn(100, "topup")).await.unwrap();
    let err = coordinator.redeem("acme", &alice, "mug", "r1").await.unwrap_err();
    assert!(matches!(
        err,
        LoyaltyError::Rule(RuleViolation::InsufficientBalance { .. })
    ));
    // No debit was ever written.
    assert_eq!(store.balance("acme", &alice).await.unwrap(), 110);

    // A fresh key succeeds.
    coordinator.redeem("acme", &alice, "mug", "r2").await.unwrap();
    assert_eq!(store.balance("acme", &alice).await.unwrap(), 50);
}

#[tokio::test]
async fn test_unknown_and_inactive_rewards_are_not_found() {
    let (store, coordinator) = setup(0).await;
    let alice = member("alice@example.com");
    store.append("acme", &alice, earn(100, "seed")).await.unwrap();

    let err = coordinator
        .redeem("acme", &alice, "no-such-reward", "r1")
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::NotFound(_)));

    let err = coordinator
        .redeem("acme", &alice, "retired-hat", "r2")
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::NotFound(_)));
}

#[tokio::test]
async fn test_below_minimum_redemption() {
    let (store, coordinator) = setup(100).await;
    let alice = member("alice@example.com");
    store.append("acme", &alice, earn(500, "seed")).await.unwrap();

    let err = coordinator.redeem("acme", &alice, "mug", "r1").await.unwrap_err();
    assert!(matches!(
        err,
        LoyaltyError::Rule(RuleViolation::BelowMinimumRedemption {
            cost: 60,
            minimum: 100
        })
    ));
}

#[tokio::test]
async fn test_concurrent_same_key_redemptions_agree() {
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(StaticRewardCatalog::new());
    catalog
        .insert(
            "acme",
            Reward {
                reward_id: "mug".into(),
                cost_points: 60,
                active: true,
            },
        )
        .await;
    let locks = Arc::new(KeyLocks::new());
    let coordinator = Arc::new(RedemptionCoordinator::new(
        store.clone(),
        catalog,
        locks.clone(),
        0,
    ));
    let alice = member("alice@example.com");
    store.append("acme", &alice, earn(100, "seed")).await.unwrap();

    // Hold the member lock so both calls get past the pre-lock replay
    // check before either can resolve.
    let guard = locks.acquire("acme", &alice).await;

    let c1 = coordinator.clone();
    let a1 = alice.clone();
    let t1 = tokio::spawn(async move { c1.redeem("acme", &a1, "mug", "dup").await });
    let c2 = coordinator.clone();
    let a2 = alice.clone();
    let t2 = tokio::spawn(async move { c2.redeem("acme", &a2, "mug", "dup").await });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    drop(guard);

    let r1 = t1.await.unwrap().unwrap();
    let r2 = t2.await.unwrap().unwrap();

    // Identical results, one debit.
    assert_eq!(r1, r2);
    assert_eq!(r1.balance_after, 40);
    assert_eq!(store.balance("acme", &alice).await.unwrap(), 40);
}

#[tokio::test]
async fn test_concurrent_redemptions_cannot_overdraw() {
    let (store, coordinator) = setup(0).await;
    let coordinator = Arc::new(coordinator);
    let alice = member("alice@example.com");
    store.append("acme", &alice, earn(100, "seed")).await.unwrap();

    let c1 = coordinator.clone();
    let a1 = alice.clone();
    let t1 = tokio::spawn(async move { c1.redeem("acme", &a1, "mug", "left").await });
    let c2 = coordinator.clone();
    let a2 = alice.clone();
    let t2 = tokio::spawn(async move { c2.redeem("acme", &a2, "mug", "right").await });

    let r1 = t1.await.unwrap();
    let r2 = t2.await.unwrap();

    // Exactly one succeeds; the other sees insufficient balance.
    assert_eq!(r1.is_ok() as u8 + r2.is_ok() as u8, 1);
    let failure = if r1.is_err() { r1 } else { r2 };
    assert!(matches!(
        failure.unwrap_err(),
        LoyaltyError::Rule(RuleViolation::InsufficientBalance { .. })
    ));
    assert_eq!(store.balance("acme", &alice).await.unwrap(), 40);
}
