use super::ids::{GroupId, MemberId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A pending application to join a group, with the running vote tallies.
/// Deleted on acceptance, rejection, or expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub sponsor_id: Option<MemberId>,
    pub requested_at: DateTime<Utc>,
    pub endorsement_weight: u32,
    pub rejection_weight: u32,
}

impl JoinRequest {
    pub fn new(group_id: GroupId, member_id: MemberId, sponsor_id: Option<MemberId>) -> Self {
        Self {
            group_id,
            member_id,
            sponsor_id,
            requested_at: Utc::now(),
            endorsement_weight: 0,
            rejection_weight: 0,
        }
    }

    pub fn is_older_than(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.requested_at > window
    }

    /// Fraction of cast weight that endorses. A 0/0 tie counts as a
    /// rejection, so it reports 0.
    pub fn approval_ratio(&self) -> Decimal {
        // A request nobody voted on scores as one rejection.
        let rejections = if self.endorsement_weight == 0 && self.rejection_weight == 0 {
            1
        } else {
            self.rejection_weight
        };
        let total = self.endorsement_weight + rejections;
        if total == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.endorsement_weight) / Decimal::from(total)
    }
}

/// One voter's weighted endorsement (or rejection) of an applicant.
/// A voter casts at most one record per applicant; the record carries the
/// voter's endorsing power at the time of the vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndorsementRecord {
    pub group_id: GroupId,
    pub sender_id: MemberId,
    pub receiver_id: MemberId,
    pub weight: u32,
    pub is_rejection: bool,
}

/// One member's standing delegation of endorsing power to another.
/// The edges form a forest; a member has at most one outgoing edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationEdge {
    pub group_id: GroupId,
    pub delegator_id: MemberId,
    pub delegatee_id: MemberId,
    pub created_at: DateTime<Utc>,
}

impl DelegationEdge {
    pub fn new(group_id: GroupId, delegator_id: MemberId, delegatee_id: MemberId) -> Self {
        Self {
            group_id,
            delegator_id,
            delegatee_id,
            created_at: Utc::now(),
        }
    }
}

/// One strike cast against a member. At most one per sender/receiver pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strike {
    pub group_id: GroupId,
    pub sender_id: MemberId,
    pub receiver_id: MemberId,
    pub created_at: DateTime<Utc>,
}

impl Strike {
    pub fn new(group_id: GroupId, sender_id: MemberId, receiver_id: MemberId) -> Self {
        Self {
            group_id,
            sender_id,
            receiver_id,
            created_at: Utc::now(),
        }
    }
}

/// One member's live vote on the group's fee and dividend rates.
/// Re-voting replaces the row; all rows clear on acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeIncomeVote {
    pub group_id: GroupId,
    pub member_id: MemberId,
    pub fee_percent: Decimal,
    pub daily_income: Decimal,
}
