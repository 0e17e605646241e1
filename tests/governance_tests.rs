mod common;

use common::{add_member, balance_of, gid, harness, harness_with_policy, mid, setup_group};
use fairshare::config::PolicySettings;
use fairshare::error::AppError;
use fairshare::services::EndorseOutcome;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_sponsor_records_first_endorsement() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    add_member(&harness, "g1", "bob", dec!(50)).await;
    add_member(&harness, "g1", "carol", dec!(50)).await;
    add_member(&harness, "g1", "dave", dec!(50)).await;

    let outcome = harness
        .governance
        .sponsor(&gid("g1"), &mid("alice"), &mid("erin"))
        .await
        .expect("sponsor");
    assert_eq!(
        outcome,
        EndorseOutcome::Recorded {
            endorsement_weight: 1,
            rejection_weight: 0
        }
    );

    // The sponsor's endorsement is already on file.
    let again = harness
        .governance
        .endorse(&gid("g1"), &mid("alice"), &mid("erin"))
        .await;
    assert!(matches!(again, Err(AppError::AlreadyVoted { .. })));

    // One pending request per applicant.
    let duplicate = harness
        .governance
        .sponsor(&gid("g1"), &mid("bob"), &mid("erin"))
        .await;
    assert!(matches!(duplicate, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn test_endorsements_admit_at_super_majority() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    add_member(&harness, "g1", "bob", dec!(50)).await;
    add_member(&harness, "g1", "carol", dec!(50)).await;
    add_member(&harness, "g1", "dave", dec!(50)).await;

    harness
        .governance
        .sponsor(&gid("g1"), &mid("alice"), &mid("erin"))
        .await
        .unwrap();
    // Threshold is 0.66 x 4 = 2.64: two votes keep it pending, the third
    // admits.
    let second = harness
        .governance
        .endorse(&gid("g1"), &mid("bob"), &mid("erin"))
        .await
        .unwrap();
    assert_eq!(
        second,
        EndorseOutcome::Recorded {
            endorsement_weight: 2,
            rejection_weight: 0
        }
    );
    let third = harness
        .governance
        .endorse(&gid("g1"), &mid("carol"), &mid("erin"))
        .await
        .unwrap();
    assert_eq!(third, EndorseOutcome::Accepted);

    // New member starts with the daily income and power 1.
    assert_eq!(balance_of(&harness, "g1", "erin").await, dec!(50));
    let erin = harness
        .ledger
        .balance(&gid("g1"), &mid("erin"))
        .await
        .unwrap();
    assert_eq!(erin.endorsing_power, 1);
    assert_eq!(erin.sponsor_id, Some(mid("alice")));
    assert!(harness
        .governance
        .find_request(&gid("g1"), &mid("erin"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_sponsorship_alone_admits_into_one_member_group() {
    let harness = harness();
    setup_group(&harness, "solo", "alice", dec!(5), dec!(50), "solar").await;

    // Threshold 0.66 x 1: the founder's own endorsement crosses it.
    let outcome = harness
        .governance
        .sponsor(&gid("solo"), &mid("alice"), &mid("bob"))
        .await
        .unwrap();
    assert_eq!(outcome, EndorseOutcome::Accepted);
    assert!(harness
        .ledger
        .is_member(&gid("solo"), &mid("bob"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_delegation_moves_power_and_conserves_total() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    for member in ["bob", "carol", "dave"] {
        add_member(&harness, "g1", member, dec!(50)).await;
    }

    harness
        .governance
        .delegate(&gid("g1"), &mid("bob"), &mid("alice"))
        .await
        .unwrap();
    harness
        .governance
        .delegate(&gid("g1"), &mid("carol"), &mid("bob"))
        .await
        .unwrap();

    // carol's chain runs through bob to alice: alice holds three units.
    let members = harness.ledger.members(&gid("g1")).await.unwrap();
    let power_of = |name: &str| {
        members
            .iter()
            .find(|balance| balance.member_id == mid(name))
            .unwrap()
            .endorsing_power
    };
    assert_eq!(power_of("alice"), 3);
    assert_eq!(power_of("bob"), 0);
    assert_eq!(power_of("carol"), 0);
    assert_eq!(power_of("dave"), 1);
    let total: u32 = members.iter().map(|balance| balance.endorsing_power).sum();
    assert_eq!(total as usize, members.len());

    // Undelegating recomputes from scratch.
    harness
        .governance
        .undelegate(&gid("g1"), &mid("carol"))
        .await
        .unwrap();
    let members = harness.ledger.members(&gid("g1")).await.unwrap();
    let total: u32 = members.iter().map(|balance| balance.endorsing_power).sum();
    assert_eq!(total as usize, members.len());
}

#[tokio::test]
async fn test_delegation_rejects_cycles_self_and_duplicates() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    for member in ["bob", "carol"] {
        add_member(&harness, "g1", member, dec!(50)).await;
    }

    let to_self = harness
        .governance
        .delegate(&gid("g1"), &mid("alice"), &mid("alice"))
        .await;
    assert!(matches!(to_self, Err(AppError::InvalidInput(_))));

    harness
        .governance
        .delegate(&gid("g1"), &mid("bob"), &mid("alice"))
        .await
        .unwrap();
    let duplicate = harness
        .governance
        .delegate(&gid("g1"), &mid("bob"), &mid("carol"))
        .await;
    assert!(matches!(duplicate, Err(AppError::AlreadyDelegated { .. })));

    // alice -> bob would close the loop bob -> alice.
    let cycle = harness
        .governance
        .delegate(&gid("g1"), &mid("alice"), &mid("bob"))
        .await;
    assert!(matches!(cycle, Err(AppError::CycleDetected { .. })));

    // Longer loop: carol -> bob, then alice -> carol (carol -> bob -> alice).
    harness
        .governance
        .delegate(&gid("g1"), &mid("carol"), &mid("bob"))
        .await
        .unwrap();
    let long_cycle = harness
        .governance
        .delegate(&gid("g1"), &mid("alice"), &mid("carol"))
        .await;
    assert!(matches!(long_cycle, Err(AppError::CycleDetected { .. })));
}

#[tokio::test]
async fn test_delegated_voter_has_no_power() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    for member in ["bob", "carol", "dave", "erin"] {
        add_member(&harness, "g1", member, dec!(50)).await;
    }
    harness
        .governance
        .delegate(&gid("g1"), &mid("bob"), &mid("alice"))
        .await
        .unwrap();
    harness
        .governance
        .sponsor(&gid("g1"), &mid("carol"), &mid("frank"))
        .await
        .unwrap();

    let powerless = harness
        .governance
        .endorse(&gid("g1"), &mid("bob"), &mid("frank"))
        .await;
    assert!(matches!(powerless, Err(AppError::InvalidInput(_))));

    // alice votes with bob's delegated unit on top of her own.
    let outcome = harness
        .governance
        .endorse(&gid("g1"), &mid("alice"), &mid("frank"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        EndorseOutcome::Recorded {
            endorsement_weight: 3,
            rejection_weight: 0
        }
    );
}

#[tokio::test]
async fn test_vote_median_tally_and_auto_accept() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    add_member(&harness, "g1", "bob", dec!(50)).await;
    add_member(&harness, "g1", "carol", dec!(50)).await;
    add_member(&harness, "g1", "dave", dec!(50)).await;

    let over = harness
        .governance
        .vote(&gid("g1"), &mid("alice"), dec!(101), dec!(50))
        .await;
    assert!(matches!(over, Err(AppError::InvalidInput(_))));

    let first = harness
        .governance
        .vote(&gid("g1"), &mid("alice"), dec!(4), dec!(40))
        .await
        .unwrap();
    assert!(!first.accepted);
    assert_eq!(first.tally.votes, 1);

    let second = harness
        .governance
        .vote(&gid("g1"), &mid("bob"), dec!(8), dec!(60))
        .await
        .unwrap();
    assert!(!second.accepted);
    assert_eq!(second.tally.fee_percent, dec!(6));
    assert_eq!(second.tally.daily_income, dec!(50));

    // Third vote passes 0.66 x 4 = 2.64: medians land in the config and
    // the ballot box empties.
    let third = harness
        .governance
        .vote(&gid("g1"), &mid("carol"), dec!(6), dec!(70))
        .await
        .unwrap();
    assert!(third.accepted);
    let config = harness.groups.config(&gid("g1")).await.unwrap();
    assert_eq!(config.fee_percent, dec!(6));
    assert_eq!(config.daily_income, dec!(60));
    assert!(harness.governance.tally(&gid("g1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_revote_replaces_and_admin_accepts() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    for member in ["bob", "carol", "dave", "erin"] {
        add_member(&harness, "g1", member, dec!(50)).await;
    }

    harness
        .governance
        .vote(&gid("g1"), &mid("alice"), dec!(4), dec!(40))
        .await
        .unwrap();
    harness
        .governance
        .vote(&gid("g1"), &mid("alice"), dec!(10), dec!(80))
        .await
        .unwrap();
    let tally = harness
        .governance
        .tally(&gid("g1"))
        .await
        .unwrap()
        .expect("one vote");
    assert_eq!(tally.votes, 1);
    assert_eq!(tally.fee_percent, dec!(10));

    let accepted = harness.governance.accept_votes(&gid("g1")).await.unwrap();
    assert_eq!(accepted.fee_percent, dec!(10));
    let config = harness.groups.config(&gid("g1")).await.unwrap();
    assert_eq!(config.fee_percent, dec!(10));
    assert_eq!(config.daily_income, dec!(80));
}

#[tokio::test]
async fn test_strikes_expel_at_super_majority() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    add_member(&harness, "g1", "bob", dec!(50)).await;
    add_member(&harness, "g1", "mallory", dec!(50)).await;

    let self_strike = harness
        .governance
        .strike(&gid("g1"), &mid("mallory"), &mid("mallory"))
        .await;
    assert!(matches!(self_strike, Err(AppError::InvalidInput(_))));

    let first = harness
        .governance
        .strike(&gid("g1"), &mid("alice"), &mid("mallory"))
        .await
        .unwrap();
    assert_eq!(first.strikes, 1);
    assert!(!first.expelled);

    let repeat = harness
        .governance
        .strike(&gid("g1"), &mid("alice"), &mid("mallory"))
        .await;
    assert!(matches!(repeat, Err(AppError::AlreadyStruck { .. })));

    // Second strike passes 0.66 x 3 = 1.98 and expels.
    let second = harness
        .governance
        .strike(&gid("g1"), &mid("bob"), &mid("mallory"))
        .await
        .unwrap();
    assert!(second.expelled);
    assert!(!harness
        .ledger
        .is_member(&gid("g1"), &mid("mallory"))
        .await
        .unwrap());

    // A rejoin starts from a fresh request.
    let rejoin = harness
        .governance
        .sponsor(&gid("g1"), &mid("alice"), &mid("mallory"))
        .await;
    assert!(rejoin.is_ok());
}

#[tokio::test]
async fn test_expulsion_cleans_up_delegation() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    for member in ["bob", "mallory"] {
        add_member(&harness, "g1", member, dec!(50)).await;
    }
    harness
        .governance
        .delegate(&gid("g1"), &mid("bob"), &mid("mallory"))
        .await
        .unwrap();

    harness
        .governance
        .strike(&gid("g1"), &mid("alice"), &mid("mallory"))
        .await
        .unwrap();
    harness
        .governance
        .strike(&gid("g1"), &mid("bob"), &mid("mallory"))
        .await
        .unwrap();
    assert!(!harness
        .ledger
        .is_member(&gid("g1"), &mid("mallory"))
        .await
        .unwrap());

    // bob's edge died with the expulsion; his power is back and the total
    // matches the remaining membership.
    let members = harness.ledger.members(&gid("g1")).await.unwrap();
    let total: u32 = members.iter().map(|balance| balance.endorsing_power).sum();
    assert_eq!(total as usize, members.len());
    assert!(harness
        .governance
        .delegatee_of(&gid("g1"), &mid("bob"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_withdraw_membership_guards_last_member() {
    let harness = harness();
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;

    let last = harness
        .governance
        .withdraw_membership(&gid("g1"), &mid("alice"))
        .await;
    assert!(matches!(last, Err(AppError::InvalidInput(_))));

    add_member(&harness, "g1", "bob", dec!(50)).await;
    harness
        .governance
        .withdraw_membership(&gid("g1"), &mid("alice"))
        .await
        .unwrap();
    assert!(!harness
        .ledger
        .is_member(&gid("g1"), &mid("alice"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_overdue_requests_resolve_from_tally() {
    // Resolve window 0: every request is immediately overdue.
    let policy = PolicySettings {
        request_resolve_hours: 0,
        ..PolicySettings::default()
    };
    let harness = harness_with_policy(policy);
    setup_group(&harness, "g1", "alice", dec!(5), dec!(50), "solar").await;
    for member in ["bob", "carol", "dave", "erin", "frank"] {
        add_member(&harness, "g1", member, dec!(50)).await;
    }

    // peggy: one endorsement, one rejection -> ratio 0.5, rejected.
    harness
        .governance
        .sponsor(&gid("g1"), &mid("alice"), &mid("peggy"))
        .await
        .unwrap();
    harness
        .governance
        .reject(&gid("g1"), &mid("bob"), &mid("peggy"))
        .await
        .unwrap();
    // trent: three endorsements, one rejection -> ratio 0.75, accepted.
    harness
        .governance
        .sponsor(&gid("g1"), &mid("carol"), &mid("trent"))
        .await
        .unwrap();
    harness
        .governance
        .endorse(&gid("g1"), &mid("dave"), &mid("trent"))
        .await
        .unwrap();
    harness
        .governance
        .endorse(&gid("g1"), &mid("erin"), &mid("trent"))
        .await
        .unwrap();
    harness
        .governance
        .reject(&gid("g1"), &mid("frank"), &mid("trent"))
        .await
        .unwrap();
    // victor: sponsored by a powerless member, so nobody's weight lands
    // and the 0/0 tie rejects.
    harness
        .governance
        .delegate(&gid("g1"), &mid("frank"), &mid("alice"))
        .await
        .unwrap();
    harness
        .governance
        .sponsor(&gid("g1"), &mid("frank"), &mid("victor"))
        .await
        .unwrap();

    let resolved = harness.governance.resolve_overdue(&gid("g1")).await.unwrap();
    assert_eq!(resolved, 3);
    assert!(!harness.ledger.is_member(&gid("g1"), &mid("peggy")).await.unwrap());
    assert!(harness.ledger.is_member(&gid("g1"), &mid("trent")).await.unwrap());
    assert!(!harness.ledger.is_member(&gid("g1"), &mid("victor")).await.unwrap());
    assert!(harness.governance.candidates(&gid("g1")).await.unwrap().is_empty());
}
