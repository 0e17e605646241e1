use super::Sweeper;
use crate::error::Result;
use crate::observability::metrics::get_metrics;
use crate::services::{GovernanceService, GroupService};
use std::sync::Arc;
use tracing::warn;

/// Resolves join requests past the voting window from their current tally
/// and purges requests past hard expiry or with a departed applicant.
pub struct RequestExpirySweeper {
    groups: Arc<GroupService>,
    governance: Arc<GovernanceService>,
}

impl RequestExpirySweeper {
    pub fn new(groups: Arc<GroupService>, governance: Arc<GovernanceService>) -> Self {
        Self { groups, governance }
    }
}

#[async_trait::async_trait]
impl Sweeper for RequestExpirySweeper {
    const NAME: &'static str = "request_expiry";

    async fn sweep_once(&self) -> Result<u64> {
        let mut acted = 0;
        for config in self.groups.configured_groups().await? {
            let group = &config.group_id;
            // Purge first so a request past hard expiry is never resolved
            // from a tally that nobody acted on for a week.
            match self.governance.purge_stale_requests(group).await {
                Ok(purged) => acted += purged,
                Err(err) => {
                    warn!(%group, %err, "stale request purge failed");
                    get_metrics().record_sweep_item_failure(Self::NAME);
                }
            }
            match self.governance.resolve_overdue(group).await {
                Ok(resolved) => acted += resolved,
                Err(err) => {
                    warn!(%group, %err, "overdue request resolution failed");
                    get_metrics().record_sweep_item_failure(Self::NAME);
                }
            }
        }
        Ok(acted)
    }
}
