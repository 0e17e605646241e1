mod common;

use common::{add_member, gid, harness, mid, setup_group};
use fairshare::error::AppError;
use fairshare::models::{ChannelRef, RoleRef};
use fairshare::services::UpdateRequest;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_setup_seeds_founder_and_rejects_rerun() {
    let harness = harness();
    let config = setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    assert_eq!(config.fee_percent, dec!(5));
    assert_eq!(config.daily_income, dec!(50));
    assert!(config.voting_open);
    assert!(harness
        .ledger
        .is_member(&gid("g1"), &mid("alice"))
        .await
        .unwrap());

    let rerun = harness
        .groups
        .setup(fairshare::services::SetupRequest {
            group_id: gid("g1"),
            founder: mid("bob"),
            fee_percent: None,
            daily_income: None,
            member_role: RoleRef::from("member-role"),
            admin_role: RoleRef::from("admin-role"),
            currency_name: "solar".to_string(),
            feed_channel: None,
        })
        .await;
    assert!(matches!(rerun, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn test_update_changes_wiring_only() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;

    let updated = harness
        .groups
        .update(
            &gid("g1"),
            UpdateRequest {
                currency_name: Some("lunar".to_string()),
                feed_channel: Some(ChannelRef::from("feed-1")),
                ..UpdateRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.currency_name, "lunar");
    assert_eq!(updated.feed_channel, Some(ChannelRef::from("feed-1")));
    // Untouched fields carry over.
    assert_eq!(updated.fee_percent, dec!(5));
    assert_eq!(updated.member_role, RoleRef::from("member-role"));

    let cleared = harness
        .groups
        .update(
            &gid("g1"),
            UpdateRequest {
                remove_feed: true,
                ..UpdateRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.feed_channel, None);
}

#[tokio::test]
async fn test_stats_aggregates_group_health() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(100), "solar").await;
    add_member(&harness, "g1", "bob", dec!(100)).await;
    harness
        .ledger
        .transfer(&gid("g1"), &mid("alice"), &mid("bob"), dec!(20), dec!(5), None)
        .await
        .unwrap();

    let stats = harness.groups.stats(&gid("g1")).await.unwrap();
    assert_eq!(stats.members, 2);
    // 100 + 100 minus the 1.00 fee burned by the transfer.
    assert_eq!(stats.money_supply, dec!(199));
    assert_eq!(stats.volume_7d.count, 1);
    assert_eq!(stats.volume_7d.amount, dec!(20));
    assert_eq!(stats.fee_percent, dec!(5));
    assert!(stats.gini_index > rust_decimal::Decimal::ZERO);
}
