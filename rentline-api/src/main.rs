use anyhow::Context;
use rentline_api::{app, worker, AppState, AuthConfig};
use rentline_catalog::{DiscountResolver, PricingEngine};
use rentline_core::alerts::TracingAlerts;
use rentline_core::lease::{HoldLease, LocalLease};
use rentline_core::payment::SimulatedPaymentAdapter;
use rentline_core::ChangeFeed;
use rentline_order::{BookingOrchestrator, HoldResolutionHandler, HoldScheduler, OrchestratorDeps};
use rentline_store::{
    Config, DbClient, HttpRouting, PgAvailabilityStore, PgBookingRepository, PgDiscountCatalog,
    PgHoldRepository, RedisClient,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rentline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Rentline API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let lease: Arc<dyn HoldLease> = match &config.redis {
        Some(redis) => Arc::new(
            RedisClient::new(&redis.url)
                .await
                .context("Failed to connect to Redis")?,
        ),
        None => {
            tracing::warn!("No Redis configured; hold lease is process-local");
            Arc::new(LocalLease::new())
        }
    };

    // The simulated processor is the only adapter; it never runs unless asked for
    if !config.payments.simulated {
        anyhow::bail!("No payment processor configured; set payments.simulated = true for local runs");
    }
    tracing::warn!("Using the simulated payment processor; card verifications always succeed");
    let payments = Arc::new(SimulatedPaymentAdapter::new());

    let alerts = Arc::new(TracingAlerts);
    let hold_config = config.hold_scheduler();
    let holds_repo = Arc::new(PgHoldRepository::new(db.pool.clone()));
    let resolution = HoldResolutionHandler::new(holds_repo.clone(), payments.clone(), lease.clone(), alerts.clone())
        .with_lease_ttl(hold_config.lease_ttl);
    let holds = Arc::new(HoldScheduler::new(
        holds_repo,
        payments.clone(),
        lease,
        alerts,
        hold_config,
    ));

    let orchestrator = Arc::new(BookingOrchestrator::new(OrchestratorDeps {
        bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
        availability: Arc::new(PgAvailabilityStore::new(db.pool.clone(), ChangeFeed::default())),
        routing: Arc::new(HttpRouting::new(&config.routing).context("Failed to build routing client")?),
        payments: payments.clone(),
        discounts: DiscountResolver::new(Arc::new(PgDiscountCatalog::new(db.pool.clone()))),
        pricing: PricingEngine::new(config.pricing_rules()),
        holds,
        resolution: Arc::new(resolution),
    }));

    tokio::spawn(worker::start_hold_sweeper(
        orchestrator.clone(),
        Duration::from_secs(config.scheduler.sweep_interval_seconds),
    ));

    let app_state = AppState::new(
        orchestrator,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state)).await?;
    Ok(())
}
