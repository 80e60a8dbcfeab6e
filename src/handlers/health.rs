use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;

use crate::{errors::ServiceError, AppState};

/// Component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
    Degraded,
}

/// Individual component health details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub database: ComponentHealth,
    pub reservations: ComponentHealth,
}

/// Full health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub details: HealthDetails,
    pub response_time_ms: u128,
}

/// Tracks application start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn get_uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(liveness_check))
        .route("/health/ready", get(readiness_check))
        .route("/health/detailed", get(detailed_health_check))
}

/// Liveness probe: the process is up and serving.
async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Readiness probe: the database answers.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    match crate::db::check_connection(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": { "database": { "status": "up" } },
                "response_time_ms": start.elapsed().as_millis()
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "database": { "status": "down", "error": e.to_string() } },
                "response_time_ms": start.elapsed().as_millis()
            })),
        ),
    }
}

/// Database status plus the reservation sweep backlog. A backlog of
/// expired-but-unswept holds marks the service degraded, not down.
async fn detailed_health_check(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let start = Instant::now();

    let db_start = Instant::now();
    let db_result = crate::db::check_connection(&state.db).await;
    let db_health = ComponentHealth {
        status: if db_result.is_ok() {
            ComponentStatus::Up
        } else {
            ComponentStatus::Down
        },
        message: db_result.as_ref().map_or_else(
            |e| format!("Connection failed: {}", e),
            |_| "Connection successful".to_string(),
        ),
        latency_ms: Some(db_start.elapsed().as_millis() as u64),
    };

    let reservations = match state.services.reservations.stats().await {
        Ok(stats) if stats.expired_not_swept == 0 => ComponentHealth {
            status: ComponentStatus::Up,
            message: format!("{} active holds", stats.active_reservations),
            latency_ms: None,
        },
        Ok(stats) => ComponentHealth {
            status: ComponentStatus::Degraded,
            message: format!("{} expired holds awaiting sweep", stats.expired_not_swept),
            latency_ms: None,
        },
        Err(e) => ComponentHealth {
            status: ComponentStatus::Down,
            message: format!("Stats unavailable: {}", e),
            latency_ms: None,
        },
    };

    let overall = match (db_health.status, reservations.status) {
        (ComponentStatus::Down, _) => ComponentStatus::Down,
        (ComponentStatus::Up, ComponentStatus::Up) => ComponentStatus::Up,
        _ => ComponentStatus::Degraded,
    };
    let status_code = match overall {
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        ComponentStatus::Up | ComponentStatus::Degraded => StatusCode::OK,
    };

    let response = HealthResponse {
        status: overall,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: get_uptime_secs(),
        details: HealthDetails {
            database: db_health,
            reservations,
        },
        response_time_ms: start.elapsed().as_millis(),
    };

    Ok((status_code, Json(response)))
}
