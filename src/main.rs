use speculate::{
    build_router,
    leaderboard::repository::PostgresLeaderboardRepository,
    points::repository::PostgresLedgerRepository,
    scheduler::spawn_background_jobs,
    AppConfig, AppState, EventBus, EventDispatcher, Repositories, StatsEventHandler, SystemClock,
};
use std::error::Error;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speculate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting speculation scoring server");

    let config = AppConfig::from_env();
    let mut repositories = Repositories::in_memory();

    // The ledger and snapshots move to Postgres when a database is configured
    if let Some(database_url) = &config.database_url {
        let pool = sqlx::PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        repositories.ledger = Arc::new(PostgresLedgerRepository::new(pool.clone()));
        repositories.leaderboards = Arc::new(PostgresLeaderboardRepository::new(pool));
        info!("Using PostgreSQL for points ledger and leaderboards");
    }

    let event_bus = EventBus::new(config.event_bus_capacity);
    let app_state = AppState::new(
        &config,
        repositories,
        Arc::new(SystemClock),
        event_bus.clone(),
    );

    // Cached stats are not persisted, so they are derived again from picks and the ledger
    let rebuilt = app_state.points_service.rebuild_all_user_stats().await?;
    info!(users = rebuilt.rebuilt, failed = rebuilt.failed, "Stats cache rebuilt");

    let mut dispatcher = EventDispatcher::new(event_bus)
        .with_max_retries(config.stats_max_retries)
        .with_handler_timeout(config.stats_handler_timeout);
    dispatcher.add_handler(Arc::new(StatsEventHandler::new(
        app_state.stats_service.clone(),
    )));
    dispatcher.start_listening();

    spawn_background_jobs(&app_state, &config);

    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
