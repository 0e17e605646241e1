mod common;

use common::{add_member, balance_of, gid, harness, mid, setup_group};
use chrono::{Duration, Utc};
use fairshare::error::AppError;
use fairshare::models::{GroupId, IntentState, MemberId, TransferIntent};
use fairshare::store::{collections, DataStoreExt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_transfer_takes_fee_and_logs() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(100), "solar").await;
    add_member(&harness, "g1", "bob", dec!(100)).await;
    add_member(&harness, "g1", "carol", dec!(100)).await;

    // Fee 5%: sending 20 costs 21, receiver gains exactly 20.
    let receipt = harness
        .ledger
        .transfer(
            &gid("g1"),
            &mid("alice"),
            &mid("bob"),
            dec!(20),
            dec!(5),
            Some("firewood".to_string()),
        )
        .await
        .expect("transfer");

    assert_eq!(receipt.fee, dec!(1));
    assert_eq!(receipt.total, dec!(21));
    assert_eq!(balance_of(&harness, "g1", "alice").await, dec!(79));
    assert_eq!(balance_of(&harness, "g1", "bob").await, dec!(120));
    assert_eq!(balance_of(&harness, "g1", "carol").await, dec!(100));

    let now = Utc::now();
    let volume = harness
        .ledger
        .volume(&gid("g1"), now - Duration::hours(1), now + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(volume.count, 1);
    assert_eq!(volume.amount, dec!(20));

    let sent = harness
        .ledger
        .sent_in_window(
            &gid("g1"),
            &mid("alice"),
            now - Duration::hours(1),
            now + Duration::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message.as_deref(), Some("firewood"));
}

#[tokio::test]
async fn test_insufficient_funds_leaves_balances_untouched() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(100), "solar").await;
    add_member(&harness, "g1", "bob", dec!(120)).await;
    harness
        .ledger
        .set_amount(&gid("g1"), &mid("alice"), dec!(79))
        .await
        .unwrap();

    let result = harness
        .ledger
        .transfer(&gid("g1"), &mid("alice"), &mid("bob"), dec!(1000), dec!(5), None)
        .await;
    assert!(matches!(result, Err(AppError::InsufficientFunds { .. })));

    assert_eq!(balance_of(&harness, "g1", "alice").await, dec!(79));
    assert_eq!(balance_of(&harness, "g1", "bob").await, dec!(120));
    // A rejected transfer leaves no intent behind.
    let intents: Vec<TransferIntent> = harness
        .store
        .select_as(collections::TRANSFER_INTENTS, &[])
        .await
        .unwrap();
    assert!(intents.is_empty());
}

#[tokio::test]
async fn test_transfer_rejects_self_and_nonpositive_amounts() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(100), "solar").await;
    add_member(&harness, "g1", "bob", dec!(100)).await;

    let to_self = harness
        .ledger
        .transfer(&gid("g1"), &mid("alice"), &mid("alice"), dec!(5), dec!(5), None)
        .await;
    assert!(matches!(to_self, Err(AppError::InvalidInput(_))));

    let zero = harness
        .ledger
        .transfer(&gid("g1"), &mid("alice"), &mid("bob"), dec!(0), dec!(5), None)
        .await;
    assert!(matches!(zero, Err(AppError::InvalidInput(_))));

    let stranger = harness
        .ledger
        .transfer(&gid("g1"), &mid("mallory"), &mid("bob"), dec!(5), dec!(5), None)
        .await;
    assert!(matches!(stranger, Err(AppError::NotAMember { .. })));
}

#[tokio::test]
async fn test_money_supply_and_gini() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(100), "solar").await;
    add_member(&harness, "g1", "bob", dec!(100)).await;
    add_member(&harness, "g1", "carol", dec!(100)).await;

    assert_eq!(
        harness.ledger.money_supply(&gid("g1")).await.unwrap(),
        dec!(300)
    );
    // Identical balances: perfectly level.
    assert_eq!(
        harness.ledger.gini_index(&gid("g1")).await.unwrap(),
        Decimal::ZERO
    );

    harness
        .ledger
        .transfer(&gid("g1"), &mid("alice"), &mid("bob"), dec!(20), dec!(5), None)
        .await
        .unwrap();
    let gini = harness.ledger.gini_index(&gid("g1")).await.unwrap();
    assert!(gini > Decimal::ZERO);

    // Scaling every balance 10x leaves the index unchanged.
    for member in ["alice", "bob", "carol"] {
        let amount = balance_of(&harness, "g1", member).await;
        harness
            .ledger
            .set_amount(&gid("g1"), &mid(member), amount * dec!(10))
            .await
            .unwrap();
    }
    assert_eq!(harness.ledger.gini_index(&gid("g1")).await.unwrap(), gini);
}

#[tokio::test]
async fn test_send_to_all_pays_every_other_member() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(10), dec!(100), "solar").await;
    add_member(&harness, "g1", "bob", dec!(50)).await;
    add_member(&harness, "g1", "carol", dec!(50)).await;
    harness
        .ledger
        .set_amount(&gid("g1"), &mid("alice"), dec!(100))
        .await
        .unwrap();

    // 2 recipients x 10 = 20, plus 10% fee on the total = 22.
    let receipt = harness
        .ledger
        .send_to_all(&gid("g1"), &mid("alice"), dec!(10), dec!(10))
        .await
        .expect("send to all");
    assert_eq!(receipt.recipients, 2);
    assert_eq!(receipt.total, dec!(20));
    assert_eq!(receipt.fee, dec!(2));
    assert_eq!(balance_of(&harness, "g1", "alice").await, dec!(78));
    assert_eq!(balance_of(&harness, "g1", "bob").await, dec!(60));
    assert_eq!(balance_of(&harness, "g1", "carol").await, dec!(60));
}

#[tokio::test]
async fn test_recovery_replays_debited_intent() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(0), dec!(100), "solar").await;
    add_member(&harness, "g1", "bob", dec!(100)).await;

    // Simulate a crash after the debit: sender already at 80, intent
    // stuck in Debited, receiver not yet credited.
    harness
        .ledger
        .set_amount(&gid("g1"), &mid("alice"), dec!(80))
        .await
        .unwrap();
    let mut intent = TransferIntent::new(
        GroupId::from("g1"),
        MemberId::from("alice"),
        MemberId::from("bob"),
        dec!(20),
        dec!(0),
        None,
        dec!(100),
    );
    intent.state = IntentState::Debited;
    harness
        .store
        .insert_as(collections::TRANSFER_INTENTS, &intent)
        .await
        .unwrap();

    let report = harness.ledger.recover_incomplete().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(balance_of(&harness, "g1", "bob").await, dec!(120));

    let now = Utc::now();
    let received = harness
        .ledger
        .received_in_window(
            &gid("g1"),
            &mid("bob"),
            now - Duration::hours(1),
            now + Duration::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(received.len(), 1);

    // Replay is complete: nothing left to recover.
    let report = harness.ledger.recover_incomplete().await.unwrap();
    assert_eq!(report.completed, 0);
}

#[tokio::test]
async fn test_recovery_discards_unapplied_pending_intent() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(0), dec!(100), "solar").await;
    add_member(&harness, "g1", "bob", dec!(100)).await;

    // Crash before the debit: balance still matches the before-snapshot.
    let intent = TransferIntent::new(
        GroupId::from("g1"),
        MemberId::from("alice"),
        MemberId::from("bob"),
        dec!(20),
        dec!(0),
        None,
        dec!(100),
    );
    harness
        .store
        .insert_as(collections::TRANSFER_INTENTS, &intent)
        .await
        .unwrap();

    let report = harness.ledger.recover_incomplete().await.unwrap();
    assert_eq!(report.discarded, 1);
    assert_eq!(balance_of(&harness, "g1", "alice").await, dec!(100));
    assert_eq!(balance_of(&harness, "g1", "bob").await, dec!(100));
}
