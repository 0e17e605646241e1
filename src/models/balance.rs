use super::ids::{GroupId, MemberId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A member's standing within one group: currency balance, sponsorship
/// lineage, accumulated strikes, and current endorsing power.
/// Unique on `(group_id, member_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberBalance {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub sponsor_id: Option<MemberId>,
    pub joined_at: DateTime<Utc>,
    pub strike_count: u32,
    pub endorsing_power: u32,
}

impl MemberBalance {
    /// Creates the balance row for a newly admitted member. New members
    /// start with one unit of endorsing power and no strikes.
    pub fn new(
        group_id: GroupId,
        member_id: MemberId,
        sponsor_id: Option<MemberId>,
        starting_amount: Decimal,
    ) -> Self {
        Self {
            group_id,
            member_id,
            amount: starting_amount,
            sponsor_id,
            joined_at: Utc::now(),
            strike_count: 0,
            endorsing_power: 1,
        }
    }

    /// Whether the balance covers a debit of `amount`.
    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.amount >= amount
    }
}
