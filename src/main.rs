//! GridPresence binary entry point

use gridpresence::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Load configuration from file and environment
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start background tasks (cache pruning)
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("GRIDPRESENCE__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gridpresence=info,tower_http=debug".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting GridPresence...");

    // 2. Initialize metrics
    gridpresence::metrics::init_metrics();

    // 3. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        database = %config.database.path.display(),
        fetch_display_names = config.display_names.fetch,
        "Configuration loaded"
    );

    // 4. Initialize application state
    let state = AppState::new(config.clone()).await?;

    // 5. Build Axum router
    let app = gridpresence::build_router(state.clone());

    // 6. Start background tasks
    spawn_cache_prune_task(state.clone());

    // 7. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn background task dropping expired presence cache entries
fn spawn_cache_prune_task(state: AppState) {
    tokio::spawn(async move {
        let interval_secs = state.config.cache.prune_interval_seconds.max(1);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        // The first tick fires immediately; nothing has expired yet.
        interval.tick().await;

        loop {
            interval.tick().await;

            let pruned = state.cache.prune_expired().await;
            if pruned > 0 {
                let stats = state.cache.stats().await;
                tracing::debug!(
                    pruned,
                    remaining = stats.total_entries,
                    "Pruned expired presence cache entries"
                );
            }
        }
    });

    tracing::info!("Cache prune task spawned");
}
