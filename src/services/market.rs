use super::{notify_feed, notify_member};
use crate::config::PolicySettings;
use crate::error::{AppError, Result};
use crate::gateway::NotificationGateway;
use crate::models::{GroupId, MarketListing, MemberId};
use crate::services::group::GroupService;
use crate::services::ledger::LedgerService;
use crate::store::{collections, DataStore, DataStoreExt, Filter};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// The group marketplace: free-form listings that expire after a month.
pub struct MarketService {
    store: Arc<dyn DataStore>,
    gateway: Arc<dyn NotificationGateway>,
    ledger: Arc<LedgerService>,
    groups: Arc<GroupService>,
    policy: PolicySettings,
}

impl MarketService {
    pub fn new(
        store: Arc<dyn DataStore>,
        gateway: Arc<dyn NotificationGateway>,
        ledger: Arc<LedgerService>,
        groups: Arc<GroupService>,
        policy: PolicySettings,
    ) -> Self {
        Self {
            store,
            gateway,
            ledger,
            groups,
            policy,
        }
    }

    pub async fn listings(&self, group: &GroupId) -> Result<Vec<MarketListing>> {
        self.store
            .select_as(
                collections::MARKET_LISTINGS,
                &[Filter::eq("group_id", group)],
            )
            .await
    }

    pub async fn all_listings(&self) -> Result<Vec<MarketListing>> {
        self.store.select_as(collections::MARKET_LISTINGS, &[]).await
    }

    pub async fn add_listing(
        &self,
        group: &GroupId,
        seller: &MemberId,
        item: String,
    ) -> Result<MarketListing> {
        let config = self.groups.config(group).await?;
        self.ledger.balance(group, seller).await?;
        if item.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "listing text cannot be empty".to_string(),
            ));
        }
        let listing = MarketListing::new(group.clone(), seller.clone(), item);
        self.store
            .insert_as(collections::MARKET_LISTINGS, &listing)
            .await?;
        notify_feed(
            self.gateway.as_ref(),
            &config,
            &format!("'{seller}' has added '{}' to the marketplace!", listing.item),
        )
        .await;
        Ok(listing)
    }

    /// Sellers may only remove their own listings.
    pub async fn remove_listing(&self, id: Uuid, seller: &MemberId) -> Result<()> {
        let listing: MarketListing = self
            .store
            .select_one(collections::MARKET_LISTINGS, &[Filter::eq("id", id)])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("market listing '{id}'")))?;
        if &listing.seller_id != seller {
            return Err(AppError::InvalidInput(
                "you did not create this listing".to_string(),
            ));
        }
        self.store
            .delete(collections::MARKET_LISTINGS, &[Filter::eq("id", id)])
            .await?;
        Ok(())
    }

    /// Expires listings past their window (notifying the seller) and drops
    /// listings whose seller has left the platform. Returns the number
    /// removed.
    pub async fn expire_listings(&self) -> Result<u64> {
        let now = Utc::now();
        let mut removed = 0;
        for listing in self.all_listings().await? {
            let departed = !self
                .gateway
                .resolve_membership(&listing.group_id, &listing.seller_id)
                .await
                .unwrap_or(true);
            if departed {
                self.store
                    .delete(
                        collections::MARKET_LISTINGS,
                        &[Filter::eq("id", listing.id)],
                    )
                    .await?;
                removed += 1;
            } else if listing.is_older_than(now, self.policy.listing_expiry_window()) {
                notify_member(
                    self.gateway.as_ref(),
                    &listing.seller_id,
                    &format!("Your marketplace listing '{}' has expired.", listing.item),
                )
                .await;
                self.store
                    .delete(
                        collections::MARKET_LISTINGS,
                        &[Filter::eq("id", listing.id)],
                    )
                    .await?;
                info!(group = %listing.group_id, listing = %listing.id, "market listing expired");
                removed += 1;
            }
        }
        Ok(removed)
    }
}
