use super::ids::{GroupId, MemberId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A member's offer on the group marketplace. Free-form text priced in
/// conversation; listings expire after 30 days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketListing {
    pub id: Uuid,
    pub group_id: GroupId,
    pub seller_id: MemberId,
    pub item: String,
    pub created_at: DateTime<Utc>,
}

impl MarketListing {
    pub fn new(group_id: GroupId, seller_id: MemberId, item: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            seller_id,
            item,
            created_at: Utc::now(),
        }
    }

    pub fn is_older_than(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.created_at > window
    }
}
