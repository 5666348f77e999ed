//! GridPresence - presence resolution for federated virtual-world grids
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Display-name authority endpoint                          │
//! │  - Operator views                                           │
//! │  - Health / metrics                                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Presence resolver (cache, disambiguation, writes)        │
//! │  - Batch lookups, display-name refresh                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - Record store (SQLite via sqlx)                           │
//! │  - In-memory TTL cache                                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Presence resolution and batch lookups
//! - `federation`: User identifiers and remote display names
//! - `data`: Record store and cache layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod federation;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Backing record store
    pub store: Arc<dyn data::RecordStore>,

    /// Presence cache (volatile, shared by every resolver call)
    pub cache: Arc<service::PresenceCache>,

    /// Single-user presence reads and writes
    pub resolver: Arc<service::PresenceResolver>,

    /// Batch lookups and operator queries
    pub presence: Arc<service::PresenceService>,

    /// HTTP client for remote authorities
    pub http_client: Arc<reqwest::Client>,
}

impl AppState {
    /// Initialize application state
    ///
    /// Connects to the SQLite store at `database.path` and wires the
    /// services on top of it.
    ///
    /// # Errors
    /// Returns error if the store cannot be opened or migrated
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let store = data::SqliteRecordStore::connect(&config.database.path).await?;
        tracing::info!("Record store connected");

        Self::with_store(config, Arc::new(store))
    }

    /// Wire services over an already opened store
    pub fn with_store(
        config: config::AppConfig,
        store: Arc<dyn data::RecordStore>,
    ) -> Result<Self, error::AppError> {
        let cache = Arc::new(service::PresenceCache::new(
            "presence",
            config.cache.max_entries,
        ));
        tracing::info!(max_entries = config.cache.max_entries, "Presence cache initialized");

        let resolver = Arc::new(service::PresenceResolver::new(
            store.clone(),
            cache.clone(),
            &config.cache,
        ));

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("GridPresence/", env!("CARGO_PKG_VERSION")))
            .timeout(config.display_names.request_timeout())
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;
        let http_client = Arc::new(http_client);

        let refresher = if config.display_names.fetch {
            let connector = federation::DisplayNameConnector::new(http_client.clone());
            Some(federation::DisplayNameRefresher::new(
                Arc::new(connector),
                resolver.clone(),
                &config.display_names,
            ))
        } else {
            None
        };

        let presence = Arc::new(service::PresenceService::new(
            store.clone(),
            resolver.clone(),
            refresher,
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            store,
            cache,
            resolver,
            presence,
            http_client,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    Router::new()
        .merge(api::ops_router())
        .merge(api::display_names_router())
        .nest("/admin", api::admin_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
