use super::{notify_feed, notify_member};
use crate::error::{AppError, Result};
use crate::gateway::NotificationGateway;
use crate::models::{ChannelRef, GroupConfig, GroupId, MemberId, RoleRef};
use crate::money;
use crate::services::ledger::{LedgerService, Volume};
use crate::store::{collections, DataStore, DataStoreExt, Filter};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Parameters for bootstrapping a group.
#[derive(Debug, Clone)]
pub struct SetupRequest {
    pub group_id: GroupId,
    pub founder: MemberId,
    pub fee_percent: Option<Decimal>,
    pub daily_income: Option<Decimal>,
    pub member_role: RoleRef,
    pub admin_role: RoleRef,
    pub currency_name: String,
    pub feed_channel: Option<ChannelRef>,
}

/// Mutable subset of the group configuration. Identity fields and the
/// voted rates are not updatable here.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub member_role: Option<RoleRef>,
    pub currency_name: Option<String>,
    pub feed_channel: Option<ChannelRef>,
    pub remove_feed: bool,
}

/// Aggregate health figures for one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStats {
    pub members: u64,
    pub money_supply: Decimal,
    pub volume_7d: Volume,
    pub fee_percent: Decimal,
    pub daily_income: Decimal,
    pub gini_index: Decimal,
    pub last_payout_at: DateTime<Utc>,
}

/// Group lifecycle and configuration.
pub struct GroupService {
    store: Arc<dyn DataStore>,
    gateway: Arc<dyn NotificationGateway>,
    ledger: Arc<LedgerService>,
}

impl GroupService {
    pub fn new(
        store: Arc<dyn DataStore>,
        gateway: Arc<dyn NotificationGateway>,
        ledger: Arc<LedgerService>,
    ) -> Self {
        Self {
            store,
            gateway,
            ledger,
        }
    }

    pub async fn find_config(&self, group: &GroupId) -> Result<Option<GroupConfig>> {
        self.store
            .select_one(collections::GROUP_CONFIGS, &[Filter::eq("group_id", group)])
            .await
    }

    pub async fn config(&self, group: &GroupId) -> Result<GroupConfig> {
        self.find_config(group)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group '{group}'")))
    }

    pub async fn configured_groups(&self) -> Result<Vec<GroupConfig>> {
        self.store.select_as(collections::GROUP_CONFIGS, &[]).await
    }

    /// Creates the group: one config row, the founder as first member with
    /// the daily income as their starting balance, and the member role on
    /// the founder.
    pub async fn setup(&self, request: SetupRequest) -> Result<GroupConfig> {
        if self.find_config(&request.group_id).await?.is_some() {
            return Err(AppError::InvalidInput(format!(
                "group '{}' is already set up",
                request.group_id
            )));
        }
        let fee_percent = request.fee_percent.unwrap_or_else(|| Decimal::from(8));
        let daily_income = request.daily_income.unwrap_or_else(|| Decimal::from(50));
        validate_rates(fee_percent, daily_income)?;

        let config = GroupConfig::new(
            request.group_id.clone(),
            money::round2(fee_percent),
            money::round2(daily_income),
            request.member_role,
            request.admin_role,
            request.currency_name,
            request.feed_channel,
        );
        self.gateway
            .grant_role(&config.group_id, &request.founder, &config.member_role)
            .await?;
        self.store
            .insert_as(collections::GROUP_CONFIGS, &config)
            .await?;
        self.ledger
            .create_member(&config.group_id, &request.founder, None, config.daily_income)
            .await?;

        info!(group = %config.group_id, founder = %request.founder, "group set up");
        Ok(config)
    }

    /// Updates platform wiring. Economic rates only change through voting.
    pub async fn update(&self, group: &GroupId, request: UpdateRequest) -> Result<GroupConfig> {
        let current = self.config(group).await?;
        let member_role = request.member_role.unwrap_or(current.member_role);
        let currency_name = request.currency_name.unwrap_or(current.currency_name);
        let feed_channel = if request.remove_feed {
            None
        } else {
            request.feed_channel.or(current.feed_channel)
        };
        self.store
            .update(
                collections::GROUP_CONFIGS,
                &[Filter::eq("group_id", group)],
                json!({
                    "member_role": member_role,
                    "currency_name": currency_name,
                    "feed_channel": feed_channel,
                }),
            )
            .await?;
        self.config(group).await
    }

    /// Installs voted (or force-accepted) rates.
    pub async fn set_rates(
        &self,
        group: &GroupId,
        fee_percent: Decimal,
        daily_income: Decimal,
    ) -> Result<()> {
        validate_rates(fee_percent, daily_income)?;
        let touched = self
            .store
            .update(
                collections::GROUP_CONFIGS,
                &[Filter::eq("group_id", group)],
                json!({
                    "fee_percent": money::round2(fee_percent),
                    "daily_income": money::round2(daily_income),
                }),
            )
            .await?;
        if touched == 0 {
            return Err(AppError::NotFound(format!("group '{group}'")));
        }
        Ok(())
    }

    /// Advances the dividend clock. The sweeper moves it by whole periods
    /// so a late tick does not drift the schedule.
    pub async fn set_last_payout(&self, group: &GroupId, when: DateTime<Utc>) -> Result<()> {
        self.store
            .update(
                collections::GROUP_CONFIGS,
                &[Filter::eq("group_id", group)],
                json!({ "last_payout_at": when }),
            )
            .await?;
        Ok(())
    }

    pub async fn stats(&self, group: &GroupId) -> Result<GroupStats> {
        let config = self.config(group).await?;
        let now = Utc::now();
        Ok(GroupStats {
            members: self.ledger.member_count(group).await?,
            money_supply: self.ledger.money_supply(group).await?,
            volume_7d: self.ledger.volume(group, now - Duration::days(7), now).await?,
            fee_percent: config.fee_percent,
            daily_income: config.daily_income,
            gini_index: money::ceil2(self.ledger.gini_index(group).await?),
            last_payout_at: config.last_payout_at,
        })
    }

    /// Announces `text` on the group's feed channel, if one is configured.
    /// Delivery failures are soft.
    pub async fn announce(&self, group: &GroupId, text: &str) -> Result<()> {
        let config = self.config(group).await?;
        notify_feed(self.gateway.as_ref(), &config, text).await;
        Ok(())
    }

    /// Soft direct message to a member.
    pub async fn message_member(&self, member: &MemberId, text: &str) {
        notify_member(self.gateway.as_ref(), member, text).await;
    }
}

fn validate_rates(fee_percent: Decimal, daily_income: Decimal) -> Result<()> {
    if fee_percent > Decimal::ONE_HUNDRED {
        return Err(AppError::InvalidInput(
            "fee cannot be greater than 100%".to_string(),
        ));
    }
    if fee_percent < Decimal::ZERO || daily_income < Decimal::ZERO {
        return Err(AppError::InvalidInput(
            "rates cannot be negative".to_string(),
        ));
    }
    Ok(())
}
