use fairshare::config::Settings;
use fairshare::gateway::NoopGateway;
use fairshare::jobs::Scheduler;
use fairshare::observability::logging::{init_logging, LogConfig, LogFormat};
use fairshare::observability::metrics::init_metrics;
use fairshare::services::{
    ExchangeService, GovernanceService, GroupService, LedgerService, MarketService,
};
use fairshare::store::PostgresStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    init_logging(&LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(settings.application.log_format.as_str()),
        include_target: true,
    });
    let _metrics = init_metrics();
    info!("Configuration loaded");

    info!("Connecting to database at {}...", settings.database.url);
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("Database connection established");

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    let store: Arc<dyn fairshare::store::DataStore> = Arc::new(PostgresStore::new(pool));
    // The chat-platform adapter is wired in by the embedding process; on
    // its own the binary runs the sweep loops against a silent gateway.
    let gateway: Arc<dyn fairshare::gateway::NotificationGateway> = Arc::new(NoopGateway);

    let ledger = Arc::new(LedgerService::new(store.clone()));
    let groups = Arc::new(GroupService::new(
        store.clone(),
        gateway.clone(),
        ledger.clone(),
    ));
    let governance = Arc::new(GovernanceService::new(
        store.clone(),
        gateway.clone(),
        ledger.clone(),
        groups.clone(),
        settings.policy.clone(),
    ));
    let exchange = Arc::new(ExchangeService::new(
        store.clone(),
        gateway.clone(),
        ledger.clone(),
        groups.clone(),
        settings.policy.clone(),
    ));
    let market = Arc::new(MarketService::new(
        store,
        gateway.clone(),
        ledger.clone(),
        groups.clone(),
        settings.policy.clone(),
    ));

    let scheduler = Scheduler::new(
        ledger,
        groups,
        governance,
        exchange,
        market,
        gateway,
        settings.sweeps.clone(),
        settings.policy.clone(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = scheduler.spawn(shutdown_rx);
    info!("Sweep loops running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown_tx.send(true).ok();
    for handle in handles {
        handle.await.ok();
    }
    info!("All sweep loops stopped");

    Ok(())
}
