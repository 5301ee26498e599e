use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use consult_portal_api::config::Config;
use consult_portal_api::db::Database;
use consult_portal_api::db_storage::PgStore;
use consult_portal_api::handlers::AppState;
use consult_portal_api::store::Store;
use consult_portal_api::{routes, sweeper};

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool and every provider
/// client, starts the orphaned-booking sweep and serves the API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "consult_portal_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(db.pool.clone()));

    let app_state = Arc::new(
        AppState::new(config.clone(), store.clone())
            .map_err(|e| anyhow::anyhow!("Failed to initialize clients: {}", e))?,
    );
    tracing::info!("Provider clients initialized");

    sweeper::spawn(
        store,
        config.orphan_sweep_hours,
        Duration::from_secs(config.orphan_sweep_interval_secs),
    );
    tracing::info!(
        "Orphan sweep scheduled every {}s (max age {}h)",
        config.orphan_sweep_interval_secs,
        config.orphan_sweep_hours
    );

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = routes::api_routes().layer(
        ServiceBuilder::new()
            // Request size limit: 5MB max payload
            .layer(RequestBodyLimitLayer::new(routes::BODY_LIMIT_BYTES))
            // Rate limiting: 10 req/sec per IP, burst of 20
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check and the payment webhook bypass rate limiting
    let app: Router = routes::open_routes()
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
