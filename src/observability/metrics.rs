use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for the mutual-credit engine.
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_transfer(&self, group: &str) {
        counter!("fairshare_transfers_total", "group" => group.to_string()).increment(1);
    }

    pub fn record_transfer_rejected(&self, group: &str) {
        counter!("fairshare_transfers_rejected_total", "group" => group.to_string()).increment(1);
    }

    pub fn record_dividend_payout(&self, group: &str, members: u64) {
        counter!("fairshare_dividend_payouts_total", "group" => group.to_string()).increment(1);
        counter!("fairshare_dividends_paid_total", "group" => group.to_string())
            .increment(members);
    }

    pub fn record_member_admitted(&self, group: &str) {
        counter!("fairshare_members_admitted_total", "group" => group.to_string()).increment(1);
    }

    pub fn record_member_removed(&self, group: &str, reason: &str) {
        counter!("fairshare_members_removed_total", "group" => group.to_string(), "reason" => reason.to_string()).increment(1);
    }

    pub fn record_coupon_issued(&self, origin: &str, destination: &str) {
        counter!("fairshare_coupons_issued_total", "origin" => origin.to_string(), "destination" => destination.to_string()).increment(1);
    }

    pub fn record_coupon_expired(&self, funded: bool) {
        counter!("fairshare_coupons_expired_total", "funded" => funded.to_string()).increment(1);
    }

    pub fn record_redemption(&self, origin: &str, destination: &str) {
        counter!("fairshare_redemptions_total", "origin" => origin.to_string(), "destination" => destination.to_string()).increment(1);
    }

    pub fn record_sweep_pass(&self, sweep: &str, duration_ms: f64) {
        counter!("fairshare_sweep_passes_total", "sweep" => sweep.to_string()).increment(1);
        histogram!("fairshare_sweep_duration_ms", "sweep" => sweep.to_string())
            .record(duration_ms);
    }

    pub fn record_sweep_item_failure(&self, sweep: &str) {
        counter!("fairshare_sweep_item_failures_total", "sweep" => sweep.to_string()).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the metrics system and returns the Prometheus handle.
pub fn init_metrics() -> PrometheusHandle {
    let handle = METRICS_HANDLE.get_or_init(|| {
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .expect("Failed to install Prometheus recorder");

        describe_metrics();
        handle
    });

    METRICS.get_or_init(Metrics::new);

    handle.clone()
}

/// Describes all metrics for Prometheus.
fn describe_metrics() {
    describe_counter!(
        "fairshare_transfers_total",
        Unit::Count,
        "Settled internal transfers"
    );
    describe_counter!(
        "fairshare_transfers_rejected_total",
        Unit::Count,
        "Transfers rejected for insufficient funds"
    );
    describe_counter!(
        "fairshare_dividend_payouts_total",
        Unit::Count,
        "Dividend payout rounds completed"
    );
    describe_counter!(
        "fairshare_dividends_paid_total",
        Unit::Count,
        "Individual dividend credits"
    );
    describe_counter!(
        "fairshare_members_admitted_total",
        Unit::Count,
        "Members admitted through governance"
    );
    describe_counter!(
        "fairshare_members_removed_total",
        Unit::Count,
        "Members removed (withdrawal or expulsion)"
    );
    describe_counter!(
        "fairshare_coupons_issued_total",
        Unit::Count,
        "Remittance coupons issued"
    );
    describe_counter!(
        "fairshare_coupons_expired_total",
        Unit::Count,
        "Remittance coupons expired by the sweeper"
    );
    describe_counter!(
        "fairshare_redemptions_total",
        Unit::Count,
        "Cross-group redemptions settled"
    );
    describe_counter!(
        "fairshare_sweep_passes_total",
        Unit::Count,
        "Background sweep passes completed"
    );
    describe_counter!(
        "fairshare_sweep_item_failures_total",
        Unit::Count,
        "Per-item failures skipped by sweepers"
    );
    describe_histogram!(
        "fairshare_sweep_duration_ms",
        Unit::Milliseconds,
        "Sweep pass latency in milliseconds"
    );
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
