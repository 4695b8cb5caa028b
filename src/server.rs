// Dashboard Server - REST API with Axum
// Thin layer: every handler is one dashboard call plus response shaping

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::cache::{QueryCache, SystemClock};
use crate::config::AppConfig;
use crate::dashboard::{self, DashboardError};
use crate::executor::QueryExecutor;
use crate::pool::{Pool, PoolConfig, PoolStatus};
use crate::warehouse::ConnectionManager;

/// Lets a CDN hold aggregate responses for the same five minutes as the query cache
pub const CACHE_CONTROL: &str = "public, s-maxage=300, stale-while-revalidate=59";

/// Shared application state
pub struct AppState<M: ConnectionManager> {
    executor: QueryExecutor<M>,
}

impl<M: ConnectionManager> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
        }
    }
}

impl<M: ConnectionManager> AppState<M> {
    pub fn new(executor: QueryExecutor<M>) -> Self {
        Self { executor }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    /// Client input rejected before touching the warehouse (400)
    BadRequest(String),

    /// Fetch failed (500), with warehouse diagnostics when there are any
    Fetch {
        error: &'static str,
        details: String,
        sql_state: Option<String>,
        sql_message: Option<String>,
    },

    /// Diagnostic endpoint failed (500)
    Check { message: &'static str, error: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchErrorBody<'a> {
    error: &'a str,
    details: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql_state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql_message: Option<&'a str>,
}

impl ApiError {
    fn from_dashboard(error: &'static str, err: DashboardError) -> Self {
        match err {
            DashboardError::MissingState | DashboardError::InvalidState(_) => ApiError::BadRequest(err.to_string()),
            DashboardError::Execute(e) => ApiError::Fetch {
                error,
                details: e.to_string(),
                sql_state: e.sql_state().map(String::from),
                sql_message: e.sql_message().map(String::from),
            },
            DashboardError::Decode(e) => ApiError::Fetch {
                error,
                details: e.to_string(),
                sql_state: None,
                sql_message: None,
            },
        }
    }

    fn check(message: &'static str, err: DashboardError) -> Self {
        ApiError::Check {
            message,
            error: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Fetch {
                error: summary,
                details,
                sql_state,
                sql_message,
            } => {
                error!(%details, sql_state = ?sql_state, "{}", summary);
                let body = FetchErrorBody {
                    error: summary,
                    details,
                    sql_state: sql_state.as_deref(),
                    sql_message: sql_message.as_deref(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
            ApiError::Check { message, error: cause } => {
                error!(error = %cause, "{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "status": "error", "message": message, "error": cause })),
                )
                    .into_response()
            }
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Liveness only, never touches the warehouse
async fn health_check() -> impl IntoResponse {
    Json(json!({ "success": true, "data": "OK" }))
}

/// GET /api/categorized-data - Everything, bucketed by category and state
async fn categorized_data<M: ConnectionManager>(State(state): State<AppState<M>>) -> Result<Response, ApiError> {
    let overview = dashboard::overview(&state.executor)
        .await
        .map_err(|e| ApiError::from_dashboard("Failed to fetch categorized data", e))?;

    Ok(([(header::CACHE_CONTROL, CACHE_CONTROL)], Json(overview)).into_response())
}

/// GET /api/state-data/:state - Financial and tourism rows for one state
async fn state_data<M: ConnectionManager>(
    State(state): State<AppState<M>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    info!(state = %name, "fetching state data");

    let data = dashboard::state_data(&state.executor, &name)
        .await
        .map_err(|e| ApiError::from_dashboard("Failed to fetch state data", e))?;

    Ok(([(header::CACHE_CONTROL, CACHE_CONTROL)], Json(data)).into_response())
}

/// GET /api/state-data - No state in the path
async fn missing_state() -> ApiError {
    ApiError::BadRequest(DashboardError::MissingState.to_string())
}

#[derive(Serialize)]
struct PingResponse {
    status: &'static str,
    message: &'static str,
    timestamp: serde_json::Value,
    pool: PoolStatus,
}

/// GET /api/warehouse/ping - Uncached round-trip to the warehouse
async fn warehouse_ping<M: ConnectionManager>(State(state): State<AppState<M>>) -> Result<Json<PingResponse>, ApiError> {
    let timestamp = dashboard::ping(&state.executor)
        .await
        .map_err(|e| ApiError::check("Failed to connect to warehouse", e))?;

    Ok(Json(PingResponse {
        status: "success",
        message: "Successfully connected to warehouse",
        timestamp,
        pool: state.executor.pool_status(),
    }))
}

/// GET /api/warehouse/tables - Row counts and a sample row per table
async fn warehouse_tables<M: ConnectionManager>(
    State(state): State<AppState<M>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tables = dashboard::table_report(&state.executor)
        .await
        .map_err(|e| ApiError::check("Failed to check tables", e))?;

    Ok(Json(json!({ "status": "success", "tables": tables })))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeConfig {
    warehouse: String,
    pool: PoolConfig,
    cache_ttl_secs: i64,
    cached_queries: usize,
}

/// GET /api/config - Non-secret runtime settings
async fn runtime_config<M: ConnectionManager>(State(state): State<AppState<M>>) -> Json<RuntimeConfig> {
    let executor = &state.executor;
    Json(RuntimeConfig {
        warehouse: executor.pool().manager().describe(),
        pool: *executor.pool().config(),
        cache_ttl_secs: executor.cache().ttl().num_seconds(),
        cached_queries: executor.cache().len(),
    })
}

/// POST /api/cache/clear - Drop every cached query result
async fn clear_cache<M: ConnectionManager>(State(state): State<AppState<M>>) -> Json<serde_json::Value> {
    let cleared = state.executor.clear_cache();
    Json(json!({ "cleared": cleared }))
}

// ============================================================================
// Router & Server
// ============================================================================

pub fn router<M: ConnectionManager>(state: AppState<M>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/categorized-data", get(categorized_data::<M>))
        .route("/state-data", get(missing_state))
        .route("/state-data/", get(missing_state))
        .route("/state-data/:state", get(state_data::<M>))
        .route("/warehouse/ping", get(warehouse_ping::<M>))
        .route("/warehouse/tables", get(warehouse_tables::<M>))
        .route("/config", get(runtime_config::<M>))
        .route("/cache/clear", post(clear_cache::<M>))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Connect to the warehouse, then serve until Ctrl+C / SIGTERM
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let manager = config.warehouse.manager();
    let pool = Pool::new(manager, config.pool);
    pool.warm_up(config.retry_policy())
        .await
        .with_context(|| format!("cannot reach warehouse at {}", config.warehouse.path.display()))?;

    let cache = Arc::new(QueryCache::new(config.cache_ttl(), Arc::new(SystemClock)));
    let app = router(AppState::new(QueryExecutor::new(pool, cache)));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown"),
        _ = terminate => info!("Received SIGTERM, starting shutdown"),
    }
}
