use super::ids::{GroupId, MemberId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An escrow-backed, bearer redemption code for a one-time cross-group
/// payment. `amount` and `fee` are in the sender's (origin) currency.
/// Unfunded coupons hold no escrow; funding debits the sender and starts
/// the redemption clock, which is why `created_at` is reset at that point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemittanceCoupon {
    pub id: Uuid,
    pub coupon_code: String,
    pub sender_id: MemberId,
    pub destination_group_id: GroupId,
    pub origin_group_id: GroupId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub message: Option<String>,
    pub is_funded: bool,
    pub is_redeemed: bool,
    pub created_at: DateTime<Utc>,
}

impl RemittanceCoupon {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coupon_code: String,
        sender_id: MemberId,
        destination_group_id: GroupId,
        origin_group_id: GroupId,
        amount: Decimal,
        fee: Decimal,
        message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            coupon_code,
            sender_id,
            destination_group_id,
            origin_group_id,
            amount,
            fee,
            message,
            is_funded: false,
            is_redeemed: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// A pinned settlement route awaiting the claimant's confirmation.
/// `amount` is the post-fee credit in the destination currency; `fee` is
/// the destination group's cut. At most one live ticket per coupon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemTicket {
    pub id: Uuid,
    pub coupon_code: String,
    pub claimant_id: MemberId,
    pub amount: Decimal,
    pub fee: Decimal,
    /// The origin-side position of the chosen route.
    pub route_position_id: Uuid,
    pub origin_group_id: GroupId,
    pub destination_group_id: GroupId,
    pub is_redeemed: bool,
}

const CODE_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const CODE_LEN: usize = 6;

/// Generates a candidate coupon code: six lowercase base-36 characters
/// drawn from a fresh v4 UUID. Callers must collision-check against
/// currently-unredeemed coupons before issuing.
pub fn generate_coupon_code() -> String {
    let mut value = Uuid::new_v4().as_u128();
    let mut code = String::with_capacity(CODE_LEN);
    for _ in 0..CODE_LEN {
        code.push(CODE_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    code
}
