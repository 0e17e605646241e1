use fairshare::config::PolicySettings;
use fairshare::gateway::{NoopGateway, NotificationGateway};
use fairshare::models::{GroupConfig, GroupId, MemberId, RoleRef};
use fairshare::services::{
    ExchangeService, GovernanceService, GroupService, LedgerService, MarketService, SetupRequest,
};
use fairshare::store::{DataStore, MemoryStore};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Everything a test needs: an in-memory store, a silent gateway, and the
/// full service stack wired the way the binary wires it.
pub struct Harness {
    pub store: Arc<dyn DataStore>,
    pub gateway: Arc<dyn NotificationGateway>,
    pub ledger: Arc<LedgerService>,
    pub groups: Arc<GroupService>,
    pub governance: Arc<GovernanceService>,
    pub exchange: Arc<ExchangeService>,
    pub market: Arc<MarketService>,
    pub policy: PolicySettings,
}

pub fn harness() -> Harness {
    harness_with_policy(PolicySettings::default())
}

pub fn harness_with_policy(policy: PolicySettings) -> Harness {
    let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
    let gateway: Arc<dyn NotificationGateway> = Arc::new(NoopGateway);
    let ledger = Arc::new(LedgerService::new(store.clone()));
    let groups = Arc::new(GroupService::new(
        store.clone(),
        gateway.clone(),
        ledger.clone(),
    ));
    let governance = Arc::new(GovernanceService::new(
        store.clone(),
        gateway.clone(),
        ledger.clone(),
        groups.clone(),
        policy.clone(),
    ));
    let exchange = Arc::new(ExchangeService::new(
        store.clone(),
        gateway.clone(),
        ledger.clone(),
        groups.clone(),
        policy.clone(),
    ));
    let market = Arc::new(MarketService::new(
        store.clone(),
        gateway.clone(),
        ledger.clone(),
        groups.clone(),
        policy.clone(),
    ));
    Harness {
        store,
        gateway,
        ledger,
        groups,
        governance,
        exchange,
        market,
        policy,
    }
}

pub fn gid(value: &str) -> GroupId {
    GroupId::from(value)
}

pub fn mid(value: &str) -> MemberId {
    MemberId::from(value)
}

/// Sets up a group with the founder as first member.
pub async fn setup_group(
    harness: &Harness,
    group: &str,
    founder: &str,
    fee_percent: Decimal,
    daily_income: Decimal,
    currency: &str,
) -> GroupConfig {
    harness
        .groups
        .setup(SetupRequest {
            group_id: gid(group),
            founder: mid(founder),
            fee_percent: Some(fee_percent),
            daily_income: Some(daily_income),
            member_role: RoleRef::from("member-role"),
            admin_role: RoleRef::from("admin-role"),
            currency_name: currency.to_string(),
            feed_channel: None,
        })
        .await
        .expect("group setup")
}

/// Admits a member directly through the ledger, bypassing governance.
pub async fn add_member(harness: &Harness, group: &str, member: &str, amount: Decimal) {
    harness
        .ledger
        .create_member(&gid(group), &mid(member), None, amount)
        .await
        .expect("member creation");
}

pub async fn balance_of(harness: &Harness, group: &str, member: &str) -> Decimal {
    harness
        .ledger
        .balance(&gid(group), &mid(member))
        .await
        .expect("balance lookup")
        .amount
}
