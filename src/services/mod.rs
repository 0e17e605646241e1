pub mod exchange;
pub mod governance;
pub mod group;
pub mod ledger;
pub mod market;

pub use exchange::{
    CouponQuote, ExchangeService, PairSide, PositionUpdate, RedeemQuote, SettlementReceipt,
};
pub use governance::{EndorseOutcome, GovernanceService, StrikeOutcome, Tally, VoteOutcome};
pub use group::{GroupService, GroupStats, SetupRequest, UpdateRequest};
pub use ledger::{LedgerService, RecoveryReport, SendAllReceipt, TransferReceipt, Volume};
pub use market::MarketService;

use crate::gateway::NotificationGateway;
use crate::models::{GroupConfig, MemberId};
use tracing::warn;

/// Best-effort direct message. Delivery failures are reported as warnings
/// and never propagate into the operation that triggered them.
pub(crate) async fn notify_member(
    gateway: &dyn NotificationGateway,
    member: &MemberId,
    text: &str,
) {
    if let Err(error) = gateway.send_direct_message(member, text).await {
        warn!(%member, %error, "direct message failed");
    }
}

/// Best-effort feed-channel announcement, skipped when the group has no
/// feed channel configured.
pub(crate) async fn notify_feed(
    gateway: &dyn NotificationGateway,
    config: &GroupConfig,
    text: &str,
) {
    if let Some(channel) = &config.feed_channel {
        if let Err(error) = gateway.send_channel_message(channel, text).await {
            warn!(group = %config.group_id, %error, "feed message failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::gateway::MockNotificationGateway;
    use crate::models::{ChannelRef, GroupId, RoleRef};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_undeliverable_dm_is_swallowed() {
        let mut gateway = MockNotificationGateway::new();
        gateway
            .expect_send_direct_message()
            .times(1)
            .returning(|_, _| Err(AppError::NotFound("member closed their DMs".to_string())));

        // Delivery failures must never surface into the calling operation.
        notify_member(&gateway, &MemberId::from("alice"), "hello").await;
    }

    #[tokio::test]
    async fn test_feed_skipped_without_channel() {
        let mut gateway = MockNotificationGateway::new();
        gateway.expect_send_channel_message().times(0);

        let config = GroupConfig::new(
            GroupId::from("g1"),
            dec!(5),
            dec!(50),
            RoleRef::from("member-role"),
            RoleRef::from("admin-role"),
            "solar".to_string(),
            None,
        );
        notify_feed(&gateway, &config, "ignored").await;

        let mut gateway = MockNotificationGateway::new();
        gateway
            .expect_send_channel_message()
            .times(1)
            .returning(|_, _| Ok(()));
        let with_channel = GroupConfig {
            feed_channel: Some(ChannelRef::from("feed")),
            ..config
        };
        notify_feed(&gateway, &with_channel, "announced").await;
    }
}
