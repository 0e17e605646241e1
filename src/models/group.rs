use super::ids::{ChannelRef, GroupId, RoleRef};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-group economic policy and platform wiring. One row per group,
/// created at setup. `group_id` and `created_at` never change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub group_id: GroupId,
    /// Percentage fee taken on every internal transfer ("5" means 5%).
    pub fee_percent: Decimal,
    /// Dividend credited to each member per payout period.
    pub daily_income: Decimal,
    pub member_role: RoleRef,
    pub admin_role: RoleRef,
    pub currency_name: String,
    pub feed_channel: Option<ChannelRef>,
    pub voting_open: bool,
    pub created_at: DateTime<Utc>,
    pub last_payout_at: DateTime<Utc>,
}

impl GroupConfig {
    pub fn new(
        group_id: GroupId,
        fee_percent: Decimal,
        daily_income: Decimal,
        member_role: RoleRef,
        admin_role: RoleRef,
        currency_name: String,
        feed_channel: Option<ChannelRef>,
    ) -> Self {
        let now = Utc::now();
        Self {
            group_id,
            fee_percent,
            daily_income,
            member_role,
            admin_role,
            currency_name,
            feed_channel,
            voting_open: true,
            created_at: now,
            last_payout_at: now,
        }
    }

    /// A payout is due once a whole period has elapsed since the last one.
    pub fn payout_due(&self, now: DateTime<Utc>, period: chrono::Duration) -> bool {
        now - self.last_payout_at >= period
    }
}
