//! End-to-end scenarios against the in-memory backend.

use std::sync::Arc;

use loyalty_ledger::config::Config;
use loyalty_ledger::engine::{
    ApplyReferralRequest, EarnRequest, HistoryRequest, LoyaltyEngine, RedeemRequest,
};
use loyalty_ledger::error::{LoyaltyError, RuleViolation};
use loyalty_ledger::interfaces::{
    Reward, StaticRewardCatalog, StaticTierSchedule, TierThreshold,
};
use loyalty_ledger::storage::{MemoryStore, Stores};

async fn engine() -> Arc<LoyaltyEngine> {
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
    let schedule = Arc::new(StaticTierSchedule::new());
    schedule
        .set(
            "acme",
            vec![
                TierThreshold {
                    tier_name: "bronze".into(),
                    min_lifetime_points: 0,
                },
                TierThreshold {
                    tier_name: "silver".into(),
                    min_lifetime_points: 100,
                },
                TierThreshold {
                    tier_name: "gold".into(),
                    min_lifetime_points: 500,
                },
            ],
        )
        .await;
    Arc::new(LoyaltyEngine::new(
        Stores::from_backend(store),
        catalog,
        schedule,
        &Config::for_test(),
    ))
}

fn earn(email: &str, points: i64, key: &str) -> EarnRequest {
    EarnRequest {
        brand_id: "acme".into(),
        email: email.into(),
        points,
        reference_id: "order-1".into(),
        idempotency_key: key.into(),
    }
}

fn redeem(email: &str, key: &str) -> RedeemRequest {
    RedeemRequest {
        brand_id: "acme".into(),
        email: email.into(),
        reward_id: "mug".into(),
        idempotency_key: key.into(),
    }
}

#[tokio::test]
async fn test_member_journey_earn_redeem_history() {
    let engine = engine().await;

    engine.earn(&earn("alice@example.com", 100, "e1")).await.unwrap();
    let redemption = engine
        .redeem(&redeem("alice@example.com", "r1"))
        .await
        .unwrap();
    assert_eq!(redemption.balance_after, 40);

    let view = engine.balance("acme", "alice@example.com").await.unwrap();
    assert_eq!(view.balance, 40);
    assert_eq!(view.lifetime_earned, 100);
    assert_eq!(view.tier, "silver");

    let history = engine
        .history(&HistoryRequest {
            brand_id: "acme".into(),
            email: "alice@example.com".into(),
            page: 0,
            limit: 10,
        })
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    // Newest first: the debit precedes the credit.
    assert_eq!(history[0].delta, -60);
    assert_eq!(history[1].delta, 100);
}

#[tokio::test]
async fn test_new_member_defaults() {
    let engine = engine().await;

    let view = engine.balance("acme", "newbie@example.com").await.unwrap();
    assert_eq!(view.balance, 0);
    assert_eq!(view.lifetime_earned, 0);
    assert_eq!(view.tier, "bronze");

    let history = engine
        .history(&HistoryRequest {
            brand_id: "acme".into(),
            email: "newbie@example.com".into(),
            page: 0,
            limit: 10,
        })
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_concurrent_redemptions_never_overdraw() {
    let engine = engine().await;
    engine.earn(&earn("alice@example.com", 100, "seed")).await.unwrap();

    let left = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.redeem(&redeem("alice@example.com", "left")).await })
    };
    let right = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.redeem(&redeem("alice@example.com", "right")).await })
    };

    let left = left.await.unwrap();
    let right = right.await.unwrap();

    assert_eq!(left.is_ok() as u8 + right.is_ok() as u8, 1);
    let failure = if left.is_err() { left } else { right };
    assert!(matches!(
        failure.unwrap_err(),
        LoyaltyError::Rule(RuleViolation::InsufficientBalance { .. })
    ));
    let view = engine.balance("acme", "alice@example.com").await.unwrap();
    assert_eq!(view.balance, 40);
}

#[tokio::test]
async fn test_referral_flow() {
    let engine = engine().await;

    let code = engine
        .referral_code("acme", "alice@example.com")
        .await
        .unwrap();

    let application = engine
        .referral_apply(&ApplyReferralRequest {
            brand_id: "acme".into(),
            code: code.clone(),
            email: "bob@example.com".into(),
            idempotency_key: "ap1".into(),
        })
        .await
        .unwrap();
    assert_eq!(application.referrer_bonus, 100);
    assert_eq!(application.referee_bonus, 50);

    let alice = engine.balance("acme", "alice@example.com").await.unwrap();
    assert_eq!(alice.balance, 100);
    assert_eq!(alice.tier, "silver");
    let bob = engine.balance("acme", "bob@example.com").await.unwrap();
    assert_eq!(bob.balance, 50);
    assert_eq!(bob.tier, "bronze");

    // Bob cannot be referred a second time, even through another code.
    let carol_code = engine
        .referral_code("acme", "carol@example.com")
        .await
        .unwrap();
    let err = engine
        .referral_apply(&ApplyReferralRequest {
            brand_id: "acme".into(),
            code: carol_code,
            email: "bob@example.com".into(),
            idempotency_key: "ap2".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoyaltyError::Rule(RuleViolation::AlreadyReferred)
    ));
    let bob = engine.balance("acme", "bob@example.com").await.unwrap();
    assert_eq!(bob.balance, 50);
}

#[tokio::test]
async fn test_concurrent_referral_applications_of_one_code() {
    let engine = engine().await;
    let code = engine
        .referral_code("acme", "alice@example.com")
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..4 {
        let engine = engine.clone();
        let code = code.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .referral_apply(&ApplyReferralRequest {
                    brand_id: "acme".into(),
                    code,
                    email: format!("member{i}@example.com"),
                    idempotency_key: format!("ap{i}"),
                })
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let alice = engine.balance("acme", "alice@example.com").await.unwrap();
    assert_eq!(alice.balance, 400);
    let stats = engine
        .referral_stats("acme", "alice@example.com")
        .await
        .unwrap();
    assert_eq!(stats.referred_count, 4);
    assert_eq!(stats.points_awarded, 400);
}
