use super::Sweeper;
use crate::error::Result;
use crate::services::MarketService;
use std::sync::Arc;

/// Drops marketplace listings that aged out or whose seller left.
pub struct ListingExpirySweeper {
    market: Arc<MarketService>,
}

impl ListingExpirySweeper {
    pub fn new(market: Arc<MarketService>) -> Self {
        Self { market }
    }
}

#[async_trait::async_trait]
impl Sweeper for ListingExpirySweeper {
    const NAME: &'static str = "listing_expiry";

    async fn sweep_once(&self) -> Result<u64> {
        self.market.expire_listings().await
    }
}
