//! Health checks and the monitoring HTTP surface
//!
//! Readiness and liveness probes over the live components, plus the
//! monitoring endpoints served on the same listener as the session
//! endpoint: `/health`, `/ready`, `/alive`, `/metrics` and `/stats`.

use crate::service::app::AppHandle;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Guessers currently queued
    pub guessers_waiting: usize,
    /// Mimics currently queued
    pub mimics_waiting: usize,
    /// Rooms currently active
    pub active_rooms: usize,
    /// Human pairs formed since start
    pub human_matches: u64,
    /// Substituted pairs formed since start
    pub substituted_matches: u64,
    /// Peer waits that expired since start
    pub match_timeouts: u64,
    /// Service uptime information
    pub uptime_info: String,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(handle: &AppHandle) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(handle).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let engine_check = Self::check_matching_loop(handle);
        if engine_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if engine_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(engine_check);

        let registry_check = Self::check_room_registry(handle);
        if registry_check.status != HealthStatus::Healthy
            && overall_status == HealthStatus::Healthy
        {
            overall_status = registry_check.status.clone();
        }
        checks.push(registry_check);

        Ok(HealthCheck {
            status: overall_status,
            service: handle.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(handle),
        })
    }

    /// Simple liveness check: the service flag is up
    pub async fn liveness_check(handle: &AppHandle) -> Result<HealthStatus> {
        if handle.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check: running and able to match
    pub async fn readiness_check(handle: &AppHandle) -> Result<HealthStatus> {
        if !handle.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }
        Ok(Self::check_matching_loop(handle).status)
    }

    async fn check_service_running(handle: &AppHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if handle.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// The matching loop must be running; a loop that stopped on its own
    /// leaves queued participants waiting forever.
    fn check_matching_loop(handle: &AppHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if handle.engine.is_running() {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Matching loop is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "matching_loop".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_room_registry(handle: &AppHandle) -> ComponentCheck {
        let start = std::time::Instant::now();

        // Reading the counters goes through the registry lock, so the read
        // succeeding at all is the signal this check is after.
        let stats = handle.registry.stats();
        let status = HealthStatus::Healthy;
        let message = Some(format!("{} active rooms", stats.active_rooms));

        ComponentCheck {
            name: "room_registry".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn gather_service_stats(handle: &AppHandle) -> ServiceStats {
        let (guessers_waiting, mimics_waiting) = handle.queues.depths();
        let engine_stats = handle.engine.stats();
        let registry_stats = handle.registry.stats();

        ServiceStats {
            guessers_waiting,
            mimics_waiting,
            active_rooms: registry_stats.active_rooms,
            human_matches: engine_stats.human_matches,
            substituted_matches: engine_stats.substituted_matches,
            match_timeouts: engine_stats.timeouts,
            uptime_info: format!(
                "Started {}, {} matching cycles",
                handle.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                engine_stats.cycles
            ),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

/// Build the monitoring router served alongside the session endpoint.
pub fn monitoring_router(handle: AppHandle) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/alive", get(alive_handler))
        .route("/metrics", get(metrics_handler))
        .route("/stats", get(stats_handler))
        .with_state(handle)
}

/// Root endpoint handler - shows service information
async fn root_handler(State(handle): State<AppHandle>) -> impl IntoResponse {
    let info = json!({
        "service": handle.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/ws",
            "/health",
            "/ready",
            "/alive",
            "/metrics",
            "/stats"
        ]
    });

    Json(info)
}

/// Lightweight health check endpoint handler
async fn health_handler(State(handle): State<AppHandle>) -> impl IntoResponse {
    debug!("Health check requested");

    let (code, label) = match HealthCheck::liveness_check(&handle).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "healthy"),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, "degraded"),
        Ok(HealthStatus::Unhealthy) | Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    (
        code,
        Json(json!({
            "status": label,
            "service": handle.service_name,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint handler
async fn ready_handler(State(handle): State<AppHandle>) -> impl IntoResponse {
    debug!("Readiness check requested");

    match HealthCheck::readiness_check(&handle).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Ready"),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, "Degraded but ready"),
        Ok(HealthStatus::Unhealthy) => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
        }
    }
}

/// Liveness check endpoint handler
async fn alive_handler(State(handle): State<AppHandle>) -> impl IntoResponse {
    debug!("Liveness check requested");

    match HealthCheck::liveness_check(&handle).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Alive"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
    }
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(handle): State<AppHandle>) -> impl IntoResponse {
    debug!("Metrics endpoint requested");

    let registry = handle.metrics.registry();
    let metric_families = registry.gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_output) => {
            debug!("Serving {} metric families", metric_families.len());

            Response::builder()
                .status(StatusCode::OK)
                .header("content-type", encoder.format_type())
                .body(metrics_output)
                .unwrap()
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);

            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body("Failed to encode metrics".to_string())
                .unwrap()
        }
    }
}

/// Detailed service statistics endpoint handler (for debugging/human consumption)
async fn stats_handler(State(handle): State<AppHandle>) -> impl IntoResponse {
    debug!("Stats endpoint requested");

    match HealthCheck::check(&handle).await {
        Ok(health) => {
            let stats = json!({
                "service": {
                    "name": health.service,
                    "version": health.version,
                    "status": health.status,
                    "uptime": health.stats.uptime_info
                },
                "queues": {
                    "guessers_waiting": health.stats.guessers_waiting,
                    "mimics_waiting": health.stats.mimics_waiting
                },
                "rooms": {
                    "active": health.stats.active_rooms,
                    "human_matches": health.stats.human_matches,
                    "substituted_matches": health.stats.substituted_matches,
                    "match_timeouts": health.stats.match_timeouts
                },
                "components": health.checks,
                "timestamp": chrono::Utc::now()
            });

            (StatusCode::OK, Json(stats))
        }
        Err(e) => {
            error!("Failed to get stats: {}", e);

            let error_response = json!({
                "service": {
                    "name": handle.service_name,
                    "version": env!("CARGO_PKG_VERSION"),
                    "status": "error"
                },
                "error": "Failed to get service stats",
                "timestamp": chrono::Utc::now()
            });

            (StatusCode::SERVICE_UNAVAILABLE, Json(error_response))
        }
    }
}
