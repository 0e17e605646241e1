use chrono::Duration;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub sweeps: SweepSettings,
    pub policy: PolicySettings,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationSettings {
    pub log_level: String,
    pub log_format: String,
}

/// Poll intervals for the background sweep loops, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepSettings {
    pub coupon_interval_secs: u64,
    pub payout_interval_secs: u64,
    pub request_interval_secs: u64,
    pub listing_interval_secs: u64,
}

/// Domain policy knobs. Defaults follow the production values; tests
/// shrink the windows to make expiry observable in a single pass.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySettings {
    /// Fraction of the membership required for auto-acceptance of votes,
    /// endorsements, and strikes.
    pub super_majority: Decimal,
    /// How long a funded coupon stays redeemable.
    pub coupon_ttl_secs: i64,
    /// Age at which a join request is force-resolved from its tally.
    pub request_resolve_hours: i64,
    /// Age at which a join request is purged regardless of tally.
    pub request_expiry_days: i64,
    /// Dividend payout period.
    pub payout_period_hours: i64,
    /// Age at which a market listing expires.
    pub listing_expiry_days: i64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            super_majority: Decimal::new(66, 2),
            coupon_ttl_secs: 300,
            request_resolve_hours: 48,
            request_expiry_days: 7,
            payout_period_hours: 24,
            listing_expiry_days: 30,
        }
    }
}

impl PolicySettings {
    pub fn coupon_ttl(&self) -> Duration {
        Duration::seconds(self.coupon_ttl_secs)
    }

    pub fn request_resolve_window(&self) -> Duration {
        Duration::hours(self.request_resolve_hours)
    }

    pub fn request_expiry_window(&self) -> Duration {
        Duration::days(self.request_expiry_days)
    }

    pub fn payout_period(&self) -> Duration {
        Duration::hours(self.payout_period_hours)
    }

    pub fn listing_expiry_window(&self) -> Duration {
        Duration::days(self.listing_expiry_days)
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("database.url", "postgres://localhost/fairshare")?
            .set_default("database.pool_size", 5)?
            .set_default("application.log_level", "info")?
            .set_default("application.log_format", "pretty")?
            .set_default("sweeps.coupon_interval_secs", 60)?
            .set_default("sweeps.payout_interval_secs", 3600)?
            .set_default("sweeps.request_interval_secs", 3600)?
            .set_default("sweeps.listing_interval_secs", 14400)?
            .set_default("policy.super_majority", "0.66")?
            .set_default("policy.coupon_ttl_secs", 300)?
            .set_default("policy.request_resolve_hours", 48)?
            .set_default("policy.request_expiry_days", 7)?
            .set_default("policy.payout_period_hours", 24)?
            .set_default("policy.listing_expiry_days", 30)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
