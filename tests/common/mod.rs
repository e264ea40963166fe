//! Common test utilities for E2E tests

use tempfile::TempDir;
use timeline_engine::config::{CacheConfig, DatabaseConfig, EngineConfig, LoggingConfig, ServerConfig, StrategyConfig};
use timeline_engine::engine::EngineContext;
use tokio::net::TcpListener;

/// Test server instance. `None` Redis URL means the caller should skip
/// the test — we never assert the harness owns a running Redis.
pub struct TestServer {
    pub addr: String,
    pub ctx: EngineContext,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance. Returns `None` when
    /// `TIMELINE_TEST_REDIS_URL` is unset, per this codebase's
    /// skip-if-unconfigured idiom for Redis-dependent tests.
    pub async fn new() -> Option<Self> {
        let redis_url = std::env::var("TIMELINE_TEST_REDIS_URL").ok()?;

        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = EngineConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                path: db_path,
                max_connections: 5,
            },
            cache: CacheConfig { redis_url },
            engine: StrategyConfig {
                celebrity_threshold: 10_000,
                timeline_cache_size: 800,
                timeline_page_size: 50,
            },
            logging: LoggingConfig {
                level: "error".to_string(),
                format: "pretty".to_string(),
            },
        };

        let ctx = EngineContext::new(config).await.unwrap();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = build_test_router(ctx.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Some(Self {
            addr: addr_str,
            ctx,
            _temp_dir: temp_dir,
            client,
        })
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

/// Build router for testing — mirrors `main.rs::build_router` minus the
/// compression layer, which complicates reading JSON bodies in tests.
fn build_test_router(ctx: EngineContext) -> axum::Router {
    use axum::Router;
    use tower_http::{cors::CorsLayer, trace::TraceLayer};

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(timeline_engine::api::engine_router(ctx))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .merge(timeline_engine::api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}
