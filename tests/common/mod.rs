//! Common test utilities for E2E tests

#![allow(dead_code)]

use gridpresence::{AppState, config};
use std::path::Path;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const ADA: &str = "11111111-1111-1111-1111-111111111111";
pub const GRACE: &str = "22222222-2222-2222-2222-222222222222";
pub const ALAN: &str = "33333333-3333-3333-3333-333333333333";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

/// Configuration pointing at a throwaway database
pub fn test_config(db_path: &Path) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
        },
        database: config::DatabaseConfig {
            path: db_path.to_path_buf(),
        },
        cache: config::CacheConfig::default(),
        display_names: config::DisplayNameConfig {
            request_timeout_seconds: 2,
            ..config::DisplayNameConfig::default()
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the default test configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        gridpresence::metrics::init_metrics();

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir.path().join("test.db"));
        adjust(&mut config);

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = gridpresence::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Authority part of a federated identifier homed on this server
    pub fn authority(&self) -> &str {
        self.addr.trim_start_matches("http://")
    }

    /// Seed a local user with a display name
    pub async fn create_named_user(&self, user_id: &str, display_name: &str) {
        assert!(
            self.state
                .resolver
                .set_display_name(user_id, display_name)
                .await
        );
    }
}
