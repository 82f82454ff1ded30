//! Test server harness for E2E testing
//!
//! Provides `TestBffServer` for spawning real BFF instances in tests. The key
//! set is initialized against a caller-provided JWKS URL and the downstream
//! base URLs usually point at wiremock servers.

use crate::token_builders::{TEST_AUDIENCE, TEST_CLIENT_ID, TEST_ISSUER};
use bff_service::auth::jwks::KeySetCache;
use bff_service::config::Config;
use bff_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the BFF in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<()> {
///     let jwks = MockJwks::start(vec![PRIMARY_RSA.jwk("kc-1")]).await;
///     let server = TestBffServer::spawn(&jwks.url(), "http://teams", "http://tasks").await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestBffServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestBffServer {
    /// Spawn a server with default test configuration.
    pub async fn spawn(
        jwks_url: &str,
        team_service_url: &str,
        task_service_url: &str,
    ) -> Result<Self, anyhow::Error> {
        Self::spawn_with(jwks_url, team_service_url, task_service_url, HashMap::new()).await
    }

    /// Spawn a server, overriding configuration variables with `overrides`.
    ///
    /// The server will:
    /// - Fetch the initial key set (fails if the JWKS endpoint is unusable)
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn_with(
        jwks_url: &str,
        team_service_url: &str,
        task_service_url: &str,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("JWKS_URL".to_string(), jwks_url.to_string()),
            ("TOKEN_ISSUER".to_string(), TEST_ISSUER.to_string()),
            ("TOKEN_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("TOKEN_CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
            ("TEAM_SERVICE_URL".to_string(), team_service_url.to_string()),
            ("TASK_SERVICE_URL".to_string(), task_service_url.to_string()),
            ("REQUEST_TIMEOUT_SECONDS".to_string(), "5".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let key_set = KeySetCache::initialize(config.key_set_config())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize key set: {}", e))?;

        let state = Arc::new(
            AppState::new(config, Arc::new(key_set))
                .map_err(|e| anyhow::anyhow!("Failed to build app state: {}", e))?,
        );

        // Recorder is built but not installed globally
        let metrics_handle = {
            use metrics_exporter_prometheus::PrometheusBuilder;
            let recorder = PrometheusBuilder::new().build_recorder();
            recorder.handle()
        };

        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared state, e.g. to drive a key refresh directly.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn key_set(&self) -> &Arc<KeySetCache> {
        &self.state.key_set
    }
}

impl Drop for TestBffServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
