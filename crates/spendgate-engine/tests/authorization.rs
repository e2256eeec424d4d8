use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;

use spendgate_audit::MemoryTransactionLog;
use spendgate_engine::{AuthorizationEngine, EngineConfig};
use spendgate_store::MemoryStore;
use spendgate_types::{
    AgentId, Amount, Denial, Fault, Outcome, PurchaseMetadata, SpendCategory, SpendError, WalletId,
};

async fn setup_with_config(
    balance: u64,
    daily_limit: u64,
    config: EngineConfig,
) -> (AuthorizationEngine, AgentId, WalletId) {
    let engine = AuthorizationEngine::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryTransactionLog::new()),
        config,
    );
    let wallet = engine.create_wallet().await.unwrap();
    engine
        .fund_wallet(&wallet.id, Amount::new(balance))
        .await
        .unwrap();
    let agent = engine
        .register_agent(&wallet.id, Amount::new(daily_limit))
        .await
        .unwrap();
    (engine, agent.id, wallet.id)
}

async fn setup(balance: u64, daily_limit: u64) -> (AuthorizationEngine, AgentId, WalletId) {
    setup_with_config(balance, daily_limit, EngineConfig::default()).await
}

fn purchase(description: &str) -> PurchaseMetadata {
    PurchaseMetadata {
        category: SpendCategory::Services,
        description: description.to_string(),
        external_service: None,
    }
}

#[tokio::test]
async fn test_daily_budget_lifecycle() {
    let (engine, agent, wallet_id) = setup(1000, 500).await;

    // First purchase fits.
    let r1 = engine
        .authorize(&agent, Amount::new(300), purchase("api credits"))
        .await
        .unwrap();

    let summary = engine.get_spend_summary(&agent).await.unwrap();
    assert_eq!(summary.spent_in_window, Amount::new(300));
    assert_eq!(summary.remaining, Amount::new(200));

    // Second would overshoot the daily limit.
    let denied = engine
        .authorize(&agent, Amount::new(250), purchase("too much"))
        .await;
    assert!(matches!(
        denied,
        Err(SpendError::Denied(Denial::DailyLimitExceeded {
            remaining: Amount(200)
        }))
    ));

    // Confirm the first: funds leave the wallet, hold drops.
    engine.confirm(&r1.id, None).await.unwrap();
    let wallet = engine.ledger().wallet(&wallet_id).await.unwrap();
    assert_eq!(wallet.balance, Amount::new(700));
    assert!(wallet.reserved.is_zero());

    // Exactly the remaining budget still fits.
    let r2 = engine
        .authorize(&agent, Amount::new(200), purchase("topping out"))
        .await
        .unwrap();

    // Voiding it restores both the hold and the window budget.
    engine.void(&r2.id, "caller cancelled").await.unwrap();
    let wallet = engine.ledger().wallet(&wallet_id).await.unwrap();
    assert!(wallet.reserved.is_zero());
    let summary = engine.get_spend_summary(&agent).await.unwrap();
    assert_eq!(summary.spent_in_window, Amount::new(300));
}

#[tokio::test]
async fn test_confirm_is_idempotent() {
    let (engine, agent, _) = setup(1000, 500).await;
    let reservation = engine
        .authorize(&agent, Amount::new(300), purchase("once"))
        .await
        .unwrap();

    let first = engine.confirm(&reservation.id, Some(Amount::new(300))).await.unwrap();
    let second = engine.confirm(&reservation.id, Some(Amount::new(300))).await.unwrap();
    assert_eq!(first.id, second.id);

    // Re-confirming with a different amount is rejected outright.
    let mismatch = engine.confirm(&reservation.id, Some(Amount::new(200))).await;
    assert!(matches!(
        mismatch,
        Err(SpendError::Fault(Fault::DuplicateRecord { .. }))
    ));
}

#[tokio::test]
async fn test_void_is_idempotent() {
    let (engine, agent, _) = setup(1000, 500).await;
    let reservation = engine
        .authorize(&agent, Amount::new(300), purchase("cancelled"))
        .await
        .unwrap();

    let first = engine.void(&reservation.id, "user said no").await.unwrap();
    let second = engine.void(&reservation.id, "user said no again").await.unwrap();
    assert_eq!(first.id, second.id);
    assert!(matches!(first.outcome, Outcome::Voided { .. }));
}

#[tokio::test]
async fn test_terminal_states_are_mutually_exclusive() {
    let (engine, agent, _) = setup(1000, 500).await;
    let reservation = engine
        .authorize(&agent, Amount::new(300), purchase("confirmed"))
        .await
        .unwrap();

    engine.confirm(&reservation.id, None).await.unwrap();
    let result = engine.void(&reservation.id, "too late").await;
    assert!(matches!(
        result,
        Err(SpendError::Fault(Fault::InvalidTransition { .. }))
    ));

    let record = engine
        .log()
        .for_reservation(&reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(record.outcome, Outcome::Confirmed { .. }));
}

#[tokio::test]
async fn test_partial_capture_releases_excess() {
    let (engine, agent, wallet_id) = setup(1000, 500).await;
    let reservation = engine
        .authorize(&agent, Amount::new(400), purchase("estimate"))
        .await
        .unwrap();

    // Final price came in lower.
    let record = engine
        .confirm(&reservation.id, Some(Amount::new(250)))
        .await
        .unwrap();
    assert_eq!(record.captured_amount(), Amount::new(250));

    let wallet = engine.ledger().wallet(&wallet_id).await.unwrap();
    assert_eq!(wallet.balance, Amount::new(750));
    assert!(wallet.reserved.is_zero());

    // The window shrinks to what was actually spent.
    let summary = engine.get_spend_summary(&agent).await.unwrap();
    assert_eq!(summary.spent_in_window, Amount::new(250));
}

#[tokio::test]
async fn test_cannot_confirm_more_than_reserved() {
    let (engine, agent, _) = setup(1000, 500).await;
    let reservation = engine
        .authorize(&agent, Amount::new(200), purchase("capped"))
        .await
        .unwrap();

    let result = engine.confirm(&reservation.id, Some(Amount::new(300))).await;
    assert!(matches!(
        result,
        Err(SpendError::Denied(Denial::AmountExceedsReservation {
            requested: Amount(300),
            reserved: Amount(200),
        }))
    ));
}

#[tokio::test]
async fn test_expired_reservation_cannot_confirm() {
    let config = EngineConfig {
        reservation_ttl_secs: 0,
        ..EngineConfig::default()
    };
    let (engine, agent, wallet_id) = setup_with_config(1000, 500, config).await;

    let reservation = engine
        .authorize(&agent, Amount::new(100), purchase("slow purchase"))
        .await
        .unwrap();
    tokio::time::sleep(StdDuration::from_millis(20)).await;

    let result = engine.confirm(&reservation.id, Some(Amount::new(100))).await;
    assert!(matches!(
        result,
        Err(SpendError::Denied(Denial::ReservationExpired { .. }))
    ));

    // The hold is gone and exactly one terminal record exists.
    let wallet = engine.ledger().wallet(&wallet_id).await.unwrap();
    assert!(wallet.reserved.is_zero());
    assert_eq!(wallet.balance, Amount::new(1000));

    let record = engine
        .log()
        .for_reservation(&reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.outcome, Outcome::Expired);

    // A later sweep finds nothing left to do.
    let swept = engine.sweep_expired(Utc::now()).await.unwrap();
    assert!(swept.is_empty());
}

#[tokio::test]
async fn test_sweep_expires_stale_reservations() {
    let config = EngineConfig {
        reservation_ttl_secs: 0,
        ..EngineConfig::default()
    };
    let (engine, agent, _) = setup_with_config(1000, 500, config).await;

    let reservation = engine
        .authorize(&agent, Amount::new(100), purchase("abandoned"))
        .await
        .unwrap();
    tokio::time::sleep(StdDuration::from_millis(20)).await;

    let swept = engine.sweep_expired(Utc::now()).await.unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].reservation_id, reservation.id);

    // The swept budget is usable again.
    let summary = engine.get_spend_summary(&agent).await.unwrap();
    assert!(summary.spent_in_window.is_zero());
}

#[tokio::test]
async fn test_emergency_stop_denies_regardless_of_budget() {
    let (engine, agent, _) = setup(1_000_000, 1_000_000).await;

    engine.set_emergency_stop(&agent, true).await.unwrap();
    let result = engine.authorize(&agent, Amount::new(1), purchase("anything")).await;
    assert!(matches!(
        result,
        Err(SpendError::Denied(Denial::EmergencyStopped))
    ));

    // Clearing the stop restores normal authorization.
    engine.set_emergency_stop(&agent, false).await.unwrap();
    assert!(engine
        .authorize(&agent, Amount::new(1), purchase("anything"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_revoked_agent_is_denied() {
    let (engine, agent, _) = setup(1000, 500).await;
    engine.revoke_agent(&agent).await.unwrap();

    let result = engine.authorize(&agent, Amount::new(100), purchase("late")).await;
    assert!(matches!(result, Err(SpendError::Denied(Denial::AgentRevoked))));
}

#[tokio::test]
async fn test_denied_ledger_check_does_not_leak_window_budget() {
    // Window admits 500, but the wallet only holds 100: the compensating
    // void must hand the window budget back.
    let (engine, agent, _) = setup(100, 1000).await;

    let result = engine.authorize(&agent, Amount::new(500), purchase("broke")).await;
    assert!(matches!(
        result,
        Err(SpendError::Denied(Denial::InsufficientFunds { .. }))
    ));

    let summary = engine.get_spend_summary(&agent).await.unwrap();
    assert!(summary.spent_in_window.is_zero());

    // What the wallet can cover still authorizes cleanly.
    assert!(engine
        .authorize(&agent, Amount::new(100), purchase("affordable"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_no_double_admission_under_race() {
    let (engine, agent, wallet_id) = setup(10_000, 400).await;

    // Four racing requests for limit/4 + 1 each; all four together would
    // overshoot, so at most three may win.
    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .authorize(&agent, Amount::new(101), purchase("race"))
                .await
                .is_ok()
        }));
    }

    let outcomes = futures::future::join_all(handles).await;
    let successes = outcomes
        .into_iter()
        .filter(|r| matches!(r, Ok(true)))
        .count();
    assert!(successes <= 3);

    let wallet = engine.ledger().wallet(&wallet_id).await.unwrap();
    assert!(wallet.reserved <= wallet.balance);
    let summary = engine.get_spend_summary(&agent).await.unwrap();
    assert!(summary.spent_in_window <= Amount::new(400));
}

#[tokio::test]
async fn test_agents_share_a_wallet() {
    let engine = AuthorizationEngine::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryTransactionLog::new()),
        EngineConfig::default(),
    );
    let wallet = engine.create_wallet().await.unwrap();
    engine.fund_wallet(&wallet.id, Amount::new(1000)).await.unwrap();

    let a = engine.register_agent(&wallet.id, Amount::new(500)).await.unwrap();
    let b = engine.register_agent(&wallet.id, Amount::new(500)).await.unwrap();

    engine.authorize(&a.id, Amount::new(400), purchase("a")).await.unwrap();
    engine.authorize(&b.id, Amount::new(400), purchase("b")).await.unwrap();

    // Both holds land on the one shared wallet; the third cannot fit.
    let state = engine.ledger().wallet(&wallet.id).await.unwrap();
    assert_eq!(state.reserved, Amount::new(800));
    let result = engine.authorize(&a.id, Amount::new(300), purchase("a again")).await;
    assert!(matches!(
        result,
        Err(SpendError::Denied(Denial::InsufficientFunds { .. }))
    ));
}

#[tokio::test]
async fn test_refund_credits_wallet_without_restoring_window() {
    let (engine, agent, wallet_id) = setup(1000, 500).await;
    let reservation = engine
        .authorize(&agent, Amount::new(300), purchase("returned item"))
        .await
        .unwrap();
    let record = engine.confirm(&reservation.id, None).await.unwrap();

    let refund = engine.refund(&record.id, None).await.unwrap();
    assert!(matches!(refund.outcome, Outcome::Refunded { .. }));

    let wallet = engine.ledger().wallet(&wallet_id).await.unwrap();
    assert_eq!(wallet.balance, Amount::new(1000));

    // The daily budget stays consumed.
    let summary = engine.get_spend_summary(&agent).await.unwrap();
    assert_eq!(summary.spent_in_window, Amount::new(300));
}

#[tokio::test]
async fn test_cumulative_refunds_capped_at_captured_amount() {
    let (engine, agent, wallet_id) = setup(1000, 500).await;
    let reservation = engine
        .authorize(&agent, Amount::new(300), purchase("disputed"))
        .await
        .unwrap();
    let record = engine.confirm(&reservation.id, None).await.unwrap();

    engine
        .refund(&record.id, Some(Amount::new(200)))
        .await
        .unwrap();

    // Only 100 of the captured 300 is still refundable.
    let over = engine.refund(&record.id, Some(Amount::new(200))).await;
    assert!(matches!(
        over,
        Err(SpendError::Denied(Denial::AmountExceedsReservation {
            requested: Amount(200),
            reserved: Amount(100),
        }))
    ));

    // An open-amount refund takes exactly the remainder, then the record
    // is exhausted.
    engine.refund(&record.id, None).await.unwrap();
    let drained = engine.refund(&record.id, None).await;
    assert!(matches!(
        drained,
        Err(SpendError::Denied(Denial::InvalidAmount))
    ));

    // Fully refunded means back to the starting balance, never above it.
    let wallet = engine.ledger().wallet(&wallet_id).await.unwrap();
    assert_eq!(wallet.balance, Amount::new(1000));
}

#[tokio::test]
async fn test_audit_chain_stays_verifiable() {
    let (engine, agent, _) = setup(10_000, 10_000).await;

    for i in 0..5u64 {
        let reservation = engine
            .authorize(&agent, Amount::new(100 + i), purchase("loop"))
            .await
            .unwrap();
        if i % 2 == 0 {
            engine.confirm(&reservation.id, None).await.unwrap();
        } else {
            engine.void(&reservation.id, "odd one out").await.unwrap();
        }
    }

    assert!(engine.log().verify_chain().await.unwrap());
    let records = engine.log().for_agent(&agent).await.unwrap();
    assert_eq!(records.len(), 5);
}
