//! HTTP server for solcodes.
//!
//! REST endpoints for redemption code storage plus the cached transaction
//! statistics read path. The stats endpoint serves whatever snapshot the
//! refresh scheduler last stored; it never talks to the upstream itself.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use eyre::{Result, WrapErr};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::StatsCache;
use crate::db::{CodeRecord, CodeStore};
use crate::indexer::HeliusIndexer;
use crate::scheduler;
use crate::stats::StatsSnapshot;

/// Maximum accepted wallet address length.
const MAX_WALLET_LEN: usize = 64;
/// Maximum accepted redemption code length.
const MAX_CODE_LEN: usize = 128;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Upstream RPC URL (API key included)
    pub rpc_url: String,
    /// Program-derived address whose transactions are counted
    pub program_address: String,
    /// Path to the SQLite code database
    pub database_path: PathBuf,
    /// Period between refresh cycles
    pub refresh_interval: Duration,
    /// Rate limit in requests per minute per IP (0 = no limit)
    pub rate_limit_rpm: u32,
    /// Allowed CORS origins (None/empty = allow any)
    pub allowed_origins: Option<Vec<String>>,
    /// API keys for the code endpoints (None/empty = no auth)
    pub api_keys: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            rpc_url: String::new(),
            program_address: String::new(),
            database_path: PathBuf::from("solcodes.db"),
            refresh_interval: Duration::from_secs(scheduler::DEFAULT_REFRESH_INTERVAL_SECS),
            rate_limit_rpm: 60,
            allowed_origins: None,
            api_keys: None,
        }
    }
}

/// Request body for storing a redemption code
#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub wallet: String,
    pub code: String,
}

/// Response for code storage and lookup
#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CodeRecord>,
}

impl CodeResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            record: None,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub rpc_connected: bool,
    pub stats_last_updated: i64,
}

/// Type alias for per-IP rate limiters
type IpRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Shared set of valid API keys for the code endpoints.
pub type ApiKeySet = Arc<HashSet<String>>;

/// Server state
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub indexer: Arc<HeliusIndexer>,
    pub cache: StatsCache,
    pub store: CodeStore,
    pub rate_limiters: Mutex<HashMap<std::net::IpAddr, Arc<IpRateLimiter>>>,
}

impl ServerState {
    pub async fn get_rate_limiter(&self, ip: std::net::IpAddr) -> Option<Arc<IpRateLimiter>> {
        if self.config.rate_limit_rpm == 0 {
            return None;
        }

        let mut limiters = self.rate_limiters.lock().await;

        if let Some(limiter) = limiters.get(&ip) {
            return Some(Arc::clone(limiter));
        }

        let quota = Quota::per_minute(NonZeroU32::new(self.config.rate_limit_rpm)?);
        let limiter = Arc::new(RateLimiter::direct(quota));
        limiters.insert(ip, Arc::clone(&limiter));

        if limiters.len() > 10000 {
            tracing::warn!("rate limiter map exceeded 10000 entries, clearing");
            limiters.clear();
            limiters.insert(ip, Arc::clone(&limiter));
        }

        Some(limiter)
    }
}

/// Middleware checking for a valid key in the `X-API-Key` header.
/// An empty key set means no auth is configured and all requests pass.
async fn require_api_key(
    axum::extract::State(keys): axum::extract::State<ApiKeySet>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if keys.is_empty() {
        return Ok(next.run(request).await);
    }

    let api_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    match api_key {
        Some(key) if keys.contains(key) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("invalid API key provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("missing X-API-Key header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Run the HTTP server.
///
/// Opens the code database, runs one refresh cycle before accepting traffic
/// (a failed initial cycle serves the zero snapshot rather than blocking
/// startup), then spawns the periodic refresh task and serves until shutdown.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    use axum::{
        middleware,
        routing::{get, post},
        Router,
    };

    let prometheus_handle = crate::metrics::install_prometheus_recorder();

    let api_keys: ApiKeySet = Arc::new(
        config
            .api_keys
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect::<HashSet<_>>(),
    );
    let has_api_keys = !api_keys.is_empty();

    let store = CodeStore::open(&config.database_path)
        .await
        .wrap_err("failed to open code database")?;
    let indexer = Arc::new(HeliusIndexer::new(&config.rpc_url));
    let cache = StatsCache::new();

    // Startup cycle, synchronous: the first read should see real data when
    // the upstream is reachable.
    match scheduler::refresh_cycle(&indexer, &cache, &config.program_address).await {
        Ok(snapshot) => {
            tracing::info!(total_tx = snapshot.total_tx, "initial refresh complete")
        }
        Err(e) => {
            tracing::warn!(error = %e, "initial refresh failed, starting with empty stats");
        }
    }

    let _refresh_task = scheduler::spawn_refresh_task(
        Arc::clone(&indexer),
        cache.clone(),
        config.program_address.clone(),
        config.refresh_interval,
    );

    let state = Arc::new(ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        indexer,
        cache,
        store,
        rate_limiters: Mutex::new(HashMap::new()),
    });

    let cors = match &config.allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed: Vec<axum::http::HeaderValue> =
                origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::HeaderName::from_static("x-api-key"),
                ])
        }
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers(Any),
    };

    // Code endpoints sit behind the API key gate when one is configured.
    let protected = Router::new()
        .route("/api/codes", post(upsert_code_handler))
        .route("/api/codes/{wallet}", get(get_code_handler))
        .route_layer(middleware::from_fn_with_state(
            api_keys.clone(),
            require_api_key,
        ))
        .with_state(state.clone());

    let open = Router::new()
        .route("/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .route(
            "/metrics",
            get(move || {
                let handle = prometheus_handle.clone();
                async move { handle.render() }
            }),
        )
        .with_state(state.clone());

    let app = Router::new().merge(open).merge(protected).layer(cors);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("solcodes server listening on {}", config.bind_addr);
    tracing::info!(
        "Endpoints: GET /health, GET /metrics, GET /api/stats, POST /api/codes, GET /api/codes/{{wallet}}"
    );
    if config.rate_limit_rpm > 0 {
        tracing::info!(rate_limit_rpm = config.rate_limit_rpm, "rate limiting enabled");
    }
    if has_api_keys {
        tracing::info!("API key authentication enabled");
    }

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Health check handler
async fn health_handler(
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    // Check upstream connectivity with 3s timeout
    let rpc_connected = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        state.indexer.current_slot(),
    )
    .await
    .map(|r| r.is_ok())
    .unwrap_or(false);

    let status = if rpc_connected {
        "ok".to_string()
    } else {
        "degraded".to_string()
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        rpc_connected,
        stats_last_updated: state.cache.read().last_updated,
    };
    axum::Json(response)
}

/// Stats read handler. Serves the cached snapshot verbatim; never refreshes.
async fn stats_handler(
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> axum::Json<StatsSnapshot> {
    axum::Json(state.cache.read())
}

/// Store or update a redemption code for a wallet
async fn upsert_code_handler(
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<SocketAddr>,
    axum::Json(request): axum::Json<CodeRequest>,
) -> (StatusCode, axum::Json<CodeResponse>) {
    let client_ip = addr.ip();

    if let Some(limiter) = state.get_rate_limiter(client_ip).await {
        if limiter.check().is_err() {
            tracing::warn!(%client_ip, "rate limit exceeded");
            crate::metrics::record_rate_limit_hit();
            return (
                StatusCode::TOO_MANY_REQUESTS,
                axum::Json(CodeResponse::error(format!(
                    "Rate limit exceeded. Maximum {} requests per minute.",
                    state.config.rate_limit_rpm
                ))),
            );
        }
    }

    let wallet = request.wallet.trim();
    let code = request.code.trim();
    if wallet.is_empty() || wallet.len() > MAX_WALLET_LEN {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(CodeResponse::error("invalid wallet address")),
        );
    }
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(CodeResponse::error("invalid redemption code")),
        );
    }

    match state.store.upsert_code(wallet, code).await {
        Ok(()) => {
            tracing::info!(wallet, "stored redemption code");
            (
                StatusCode::OK,
                axum::Json(CodeResponse {
                    success: true,
                    error: None,
                    record: None,
                }),
            )
        }
        Err(e) => {
            tracing::warn!(wallet, error = %e, "failed to store code");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(CodeResponse::error(format!("storage failed: {}", e))),
            )
        }
    }
}

/// Look up the stored redemption code for a wallet
async fn get_code_handler(
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<SocketAddr>,
    axum::extract::Path(wallet): axum::extract::Path<String>,
) -> (StatusCode, axum::Json<CodeResponse>) {
    let client_ip = addr.ip();

    if let Some(limiter) = state.get_rate_limiter(client_ip).await {
        if limiter.check().is_err() {
            crate::metrics::record_rate_limit_hit();
            return (
                StatusCode::TOO_MANY_REQUESTS,
                axum::Json(CodeResponse::error("Rate limit exceeded")),
            );
        }
    }

    match state.store.get_code(&wallet).await {
        Ok(Some(record)) => {
            crate::metrics::record_code_lookup(true);
            (
                StatusCode::OK,
                axum::Json(CodeResponse {
                    success: true,
                    error: None,
                    record: Some(record),
                }),
            )
        }
        Ok(None) => {
            crate::metrics::record_code_lookup(false);
            (
                StatusCode::NOT_FOUND,
                axum::Json(CodeResponse::error("no code stored for wallet")),
            )
        }
        Err(e) => {
            tracing::warn!(wallet, error = %e, "code lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(CodeResponse::error(format!("lookup failed: {}", e))),
            )
        }
    }
}
