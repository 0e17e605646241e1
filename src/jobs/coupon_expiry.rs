use super::Sweeper;
use crate::error::Result;
use crate::observability::metrics::get_metrics;
use crate::services::ExchangeService;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

/// Expires unredeemed remittance coupons past the redemption window,
/// refunding escrow on the funded ones.
pub struct CouponExpirySweeper {
    exchange: Arc<ExchangeService>,
}

impl CouponExpirySweeper {
    pub fn new(exchange: Arc<ExchangeService>) -> Self {
        Self { exchange }
    }
}

#[async_trait::async_trait]
impl Sweeper for CouponExpirySweeper {
    const NAME: &'static str = "coupon_expiry";

    async fn sweep_once(&self) -> Result<u64> {
        let now = Utc::now();
        let mut expired = 0;
        for coupon in self.exchange.all_coupons().await? {
            if coupon.is_redeemed || !self.exchange.is_coupon_expired(&coupon, now) {
                continue;
            }
            match self.exchange.expire_coupon(&coupon).await {
                Ok(()) => expired += 1,
                Err(err) => {
                    warn!(coupon = %coupon.coupon_code, %err, "coupon expiry failed");
                    get_metrics().record_sweep_item_failure(Self::NAME);
                }
            }
        }
        Ok(expired)
    }
}
