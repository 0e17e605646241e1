//! Notification/Identity Gateway: the chat platform as seen by the engine.
//! The engine never touches platform payloads; it needs exactly these
//! primitives plus the opaque ids in `models::ids`. Delivery failures are
//! soft — callers log a warning and carry on, never roll back money.

use crate::error::Result;
use crate::models::{ChannelRef, GroupId, MemberId, RoleRef};
use async_trait::async_trait;
use tracing::debug;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Direct message to a member. May fail if the member is undeliverable.
    async fn send_direct_message(&self, member: &MemberId, text: &str) -> Result<()>;

    /// Message to a group's public feed channel.
    async fn send_channel_message(&self, channel: &ChannelRef, text: &str) -> Result<()>;

    /// Whether the member is still present on the platform side of the group.
    async fn resolve_membership(&self, group: &GroupId, member: &MemberId) -> Result<bool>;

    async fn grant_role(&self, group: &GroupId, member: &MemberId, role: &RoleRef) -> Result<()>;

    async fn revoke_role(&self, group: &GroupId, member: &MemberId, role: &RoleRef) -> Result<()>;
}

/// Gateway that logs deliveries and answers every membership probe with
/// "present". Stands in where no platform adapter is wired up (the binary
/// without a chat integration, integration tests).
#[derive(Debug, Default, Clone)]
pub struct NoopGateway;

#[async_trait]
impl NotificationGateway for NoopGateway {
    async fn send_direct_message(&self, member: &MemberId, text: &str) -> Result<()> {
        debug!(%member, text, "dm suppressed (noop gateway)");
        Ok(())
    }

    async fn send_channel_message(&self, channel: &ChannelRef, text: &str) -> Result<()> {
        debug!(%channel, text, "channel message suppressed (noop gateway)");
        Ok(())
    }

    async fn resolve_membership(&self, _group: &GroupId, _member: &MemberId) -> Result<bool> {
        Ok(true)
    }

    async fn grant_role(&self, group: &GroupId, member: &MemberId, role: &RoleRef) -> Result<()> {
        debug!(%group, %member, %role, "role grant suppressed (noop gateway)");
        Ok(())
    }

    async fn revoke_role(&self, group: &GroupId, member: &MemberId, role: &RoleRef) -> Result<()> {
        debug!(%group, %member, %role, "role revoke suppressed (noop gateway)");
        Ok(())
    }
}
