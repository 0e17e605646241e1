//! Background consistency sweepers. Each sweeper owns one recurring pass
//! (`sweep_once`) and a polling loop that runs it until shutdown; the
//! scheduler spawns them as independent tasks sharing one shutdown signal.

mod coupon_expiry;
mod dividend;
mod listing_expiry;
mod request_expiry;

pub use coupon_expiry::CouponExpirySweeper;
pub use dividend::DividendSweeper;
pub use listing_expiry::ListingExpirySweeper;
pub use request_expiry::RequestExpirySweeper;

use crate::config::{PolicySettings, SweepSettings};
use crate::gateway::NotificationGateway;
use crate::observability::metrics::{get_metrics, LatencyTimer};
use crate::services::{
    ExchangeService, GovernanceService, GroupService, LedgerService, MarketService,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Spawns the sweep loops and hands back their join handles. Flip the
/// shutdown sender to `true` (or drop it) to stop every loop.
pub struct Scheduler {
    ledger: Arc<LedgerService>,
    dividends: Arc<DividendSweeper>,
    coupons: Arc<CouponExpirySweeper>,
    requests: Arc<RequestExpirySweeper>,
    listings: Arc<ListingExpirySweeper>,
    sweeps: SweepSettings,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<LedgerService>,
        groups: Arc<GroupService>,
        governance: Arc<GovernanceService>,
        exchange: Arc<ExchangeService>,
        market: Arc<MarketService>,
        gateway: Arc<dyn NotificationGateway>,
        sweeps: SweepSettings,
        policy: PolicySettings,
    ) -> Self {
        Self {
            dividends: Arc::new(DividendSweeper::new(
                ledger.clone(),
                groups.clone(),
                gateway,
                policy,
            )),
            coupons: Arc::new(CouponExpirySweeper::new(exchange)),
            requests: Arc::new(RequestExpirySweeper::new(groups, governance)),
            listings: Arc::new(ListingExpirySweeper::new(market)),
            ledger,
            sweeps,
        }
    }

    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        // Replay transfers interrupted by the previous shutdown before the
        // periodic work starts.
        let ledger = self.ledger.clone();
        let recovery = tokio::spawn(async move {
            match ledger.recover_incomplete().await {
                Ok(report) => info!(
                    completed = report.completed,
                    discarded = report.discarded,
                    ambiguous = report.ambiguous,
                    "transfer intent recovery finished"
                ),
                Err(err) => error!(%err, "transfer intent recovery failed"),
            }
        });

        vec![
            recovery,
            spawn_loop(
                self.dividends.clone(),
                Duration::from_secs(self.sweeps.payout_interval_secs),
                shutdown.clone(),
            ),
            spawn_loop(
                self.coupons.clone(),
                Duration::from_secs(self.sweeps.coupon_interval_secs),
                shutdown.clone(),
            ),
            spawn_loop(
                self.requests.clone(),
                Duration::from_secs(self.sweeps.request_interval_secs),
                shutdown.clone(),
            ),
            spawn_loop(
                self.listings.clone(),
                Duration::from_secs(self.sweeps.listing_interval_secs),
                shutdown,
            ),
        ]
    }
}

/// One recurring consistency pass.
#[async_trait::async_trait]
pub trait Sweeper: Send + Sync + 'static {
    const NAME: &'static str;

    /// Runs one pass, returning how many items it acted on. Per-item
    /// failures are logged inside and do not abort the pass.
    async fn sweep_once(&self) -> crate::error::Result<u64>;
}

fn spawn_loop<S: Sweeper>(
    sweeper: Arc<S>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(sweep = S::NAME, period_secs = period.as_secs(), "sweep loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let timer = LatencyTimer::new();
                    match sweeper.sweep_once().await {
                        Ok(acted) => {
                            get_metrics().record_sweep_pass(S::NAME, timer.elapsed_ms());
                            if acted > 0 {
                                info!(sweep = S::NAME, acted, "sweep pass finished");
                            }
                        }
                        Err(err) => error!(sweep = S::NAME, %err, "sweep pass failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!(sweep = S::NAME, "sweep loop stopping");
                    break;
                }
            }
        }
    })
}
