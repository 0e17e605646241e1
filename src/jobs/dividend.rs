use super::Sweeper;
use crate::config::PolicySettings;
use crate::error::Result;
use crate::gateway::NotificationGateway;
use crate::observability::metrics::get_metrics;
use crate::services::{GroupService, LedgerService};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Pays the periodic dividend. A group is due once a whole payout period
/// has elapsed since its last payout; the clock then advances by exactly
/// one period, so a late sweep tick neither skips nor drifts the schedule.
pub struct DividendSweeper {
    ledger: Arc<LedgerService>,
    groups: Arc<GroupService>,
    gateway: Arc<dyn NotificationGateway>,
    policy: PolicySettings,
}

impl DividendSweeper {
    pub fn new(
        ledger: Arc<LedgerService>,
        groups: Arc<GroupService>,
        gateway: Arc<dyn NotificationGateway>,
        policy: PolicySettings,
    ) -> Self {
        Self {
            ledger,
            groups,
            gateway,
            policy,
        }
    }

    async fn pay_group(&self, config: &crate::models::GroupConfig) -> Result<u64> {
        let group = &config.group_id;
        let mut paid = 0;
        for member in self.ledger.members(group).await? {
            // Members who left the platform without withdrawing keep
            // their balance but draw no dividend.
            let present = self
                .gateway
                .resolve_membership(group, &member.member_id)
                .await
                .unwrap_or(false);
            if !present {
                continue;
            }
            match self
                .ledger
                .credit(group, &member.member_id, config.daily_income)
                .await
            {
                Ok(_) => paid += 1,
                Err(err) => {
                    warn!(%group, member = %member.member_id, %err, "dividend credit failed");
                    get_metrics().record_sweep_item_failure(Self::NAME);
                }
            }
        }
        Ok(paid)
    }
}

#[async_trait::async_trait]
impl Sweeper for DividendSweeper {
    const NAME: &'static str = "dividend";

    async fn sweep_once(&self) -> Result<u64> {
        let now = Utc::now();
        let period = self.policy.payout_period();
        let mut groups_paid = 0;
        for config in self.groups.configured_groups().await? {
            if config.daily_income <= Decimal::ZERO {
                continue;
            }
            if !config.payout_due(now, period) {
                continue;
            }
            match self.pay_group(&config).await {
                Ok(paid) => {
                    self.groups
                        .set_last_payout(&config.group_id, config.last_payout_at + period)
                        .await?;
                    self.groups
                        .announce(
                            &config.group_id,
                            &format!(
                                "Your dividend of {} {} shares has been sent!",
                                config.daily_income, config.currency_name
                            ),
                        )
                        .await?;
                    get_metrics().record_dividend_payout(config.group_id.as_str(), paid);
                    info!(group = %config.group_id, paid, "dividend payout complete");
                    groups_paid += 1;
                }
                Err(err) => {
                    warn!(group = %config.group_id, %err, "dividend payout failed");
                    get_metrics().record_sweep_item_failure(Self::NAME);
                }
            }
        }
        Ok(groups_paid)
    }
}
