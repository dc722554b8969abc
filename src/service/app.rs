//! Main application state and service coordination
//!
//! This module wires the matchmaking components together, owns the matching
//! loop and background tasks, and serves the combined WebSocket + monitoring
//! listener.

use crate::config::AppConfig;
use crate::matchmaker::{MatchmakingEngine, QueuePair, SubstitutionPolicy};
use crate::metrics::MetricsCollector;
use crate::responder::{DisabledReplyProvider, HttpReplyProvider, ReplyProvider};
use crate::room::RoomRegistry;
use crate::service::health;
use crate::session::pump::{ws_handler, SessionState};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Listener error: {message}")]
    Listener { message: String },
}

/// Cloneable handle onto the live components, shared with the monitoring
/// endpoints and background tasks.
#[derive(Clone)]
pub struct AppHandle {
    pub service_name: String,
    pub started_at: DateTime<Utc>,
    pub queues: Arc<QueuePair>,
    pub registry: Arc<RoomRegistry>,
    pub substitution: Arc<SubstitutionPolicy>,
    pub engine: Arc<MatchmakingEngine>,
    pub metrics: Arc<MetricsCollector>,
    pub is_running: Arc<RwLock<bool>>,
}

impl AppHandle {
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}

/// The assembled service: configuration, component handle, listener and
/// background tasks.
pub struct ServiceApp {
    config: AppConfig,
    handle: AppHandle,
    background_tasks: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ServiceApp {
    /// Construct every component from the configuration.
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing {} service components", config.server.name);

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let queues = Arc::new(QueuePair::new(config.matchmaking.queue_capacity));
        let registry = Arc::new(RoomRegistry::with_metrics(metrics.clone()));
        let provider = Self::build_reply_provider(&config)?;
        let substitution = Arc::new(SubstitutionPolicy::with_metrics(
            config.matchmaking.substitution_rate,
            provider,
            metrics.clone(),
        ));
        let engine = Arc::new(MatchmakingEngine::with_metrics(
            queues.clone(),
            registry.clone(),
            substitution.clone(),
            config.peer_wait(),
            metrics.clone(),
        ));

        let handle = AppHandle {
            service_name: config.server.name.clone(),
            started_at: Utc::now(),
            queues,
            registry,
            substitution,
            engine,
            metrics,
            is_running: Arc::new(RwLock::new(false)),
        };

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            handle,
            background_tasks: Vec::new(),
            shutdown_tx,
        })
    }

    /// Pick the responder implementation from the configuration.
    ///
    /// Without an API key the responder is disabled: substituted rooms form
    /// normally but never hear back, which matches the swallow-failures
    /// contract.
    fn build_reply_provider(
        config: &AppConfig,
    ) -> Result<Arc<dyn ReplyProvider>, ServiceError> {
        if config.responder.api_key.is_some() {
            let provider = HttpReplyProvider::new(&config.responder).map_err(|e| {
                ServiceError::Initialization {
                    message: format!("Failed to build responder client: {}", e),
                }
            })?;
            info!(
                "Responder enabled: {} ({})",
                config.responder.api_url, config.responder.model
            );
            Ok(Arc::new(provider))
        } else {
            if config.matchmaking.substitution_rate > 0 {
                warn!(
                    "No responder API key set; substituted rooms will receive no replies \
                     (substitution rate {}%)",
                    config.matchmaking.substitution_rate
                );
            }
            Ok(Arc::new(DisabledReplyProvider))
        }
    }

    /// Handle onto the live components.
    pub fn handle(&self) -> AppHandle {
        self.handle.clone()
    }

    /// Service configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// State handed to every session pump.
    pub fn session_state(&self) -> SessionState {
        SessionState {
            queues: self.handle.queues.clone(),
            registry: self.handle.registry.clone(),
            substitution: self.handle.substitution.clone(),
            metrics: self.handle.metrics.clone(),
            sink_capacity: self.config.matchmaking.sink_capacity,
            heartbeat_interval: self.config.heartbeat_interval(),
            read_deadline: self.config.read_deadline(),
        }
    }

    /// The combined router: the session upgrade endpoint plus the
    /// monitoring surface, on one listener.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.session_state())
            .merge(health::monitoring_router(self.handle.clone()))
    }

    /// Start the matching loop, background tasks and the listener.
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {} service", self.config.server.name);
        *self.handle.is_running.write().await = true;

        self.spawn_matching_loop();
        self.spawn_health_metrics_task();
        self.start_listener().await?;

        info!("✅ {} service started successfully", self.config.server.name);
        Ok(())
    }

    /// Perform graceful shutdown: stop the loop, close the listener, cancel
    /// the remaining tasks and log final counters.
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.server.name);
        *self.handle.is_running.write().await = false;

        self.handle.engine.stop();
        if self.shutdown_tx.send(()).is_err() {
            debug!("No listener task to signal during shutdown");
        }

        // Give the listener and the loop a moment to wind down before
        // aborting whatever is still blocked.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let task_count = self.background_tasks.len();
        for task in self.background_tasks.drain(..) {
            task.abort();
        }
        info!("✅ {} background tasks stopped", task_count);

        let engine_stats = self.handle.engine.stats();
        let registry_stats = self.handle.registry.stats();
        info!(
            "Final statistics: {} human matches, {} substituted, {} timeouts, \
             {} rooms created, {} torn down",
            engine_stats.human_matches,
            engine_stats.substituted_matches,
            engine_stats.timeouts,
            registry_stats.rooms_created,
            registry_stats.rooms_torn_down
        );
        info!("✅ {} shutdown completed", self.config.server.name);
        Ok(())
    }

    fn spawn_matching_loop(&mut self) {
        info!(
            "Starting matching loop (peer wait {:?}, substitution rate {}%)",
            self.config.peer_wait(),
            self.config.matchmaking.substitution_rate
        );
        let engine = self.handle.engine.clone();
        self.background_tasks.push(tokio::spawn(async move {
            engine.run().await;
        }));
    }

    /// Periodic uptime and component-health gauge updates.
    fn spawn_health_metrics_task(&mut self) {
        let handle = self.handle.clone();
        self.background_tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            let started = tokio::time::Instant::now();
            debug!("Health metrics task started");

            while handle.is_running().await {
                interval.tick().await;

                handle
                    .metrics
                    .service()
                    .uptime_seconds
                    .set(started.elapsed().as_secs() as i64);

                let engine_up = handle.engine.is_running();
                handle
                    .metrics
                    .update_health_status(if engine_up { 2 } else { 0 });
                handle
                    .metrics
                    .update_component_health("matching_engine", engine_up);
                handle.metrics.update_component_health("room_registry", true);
            }

            debug!("Health metrics task stopped");
        }));
    }

    async fn start_listener(&mut self) -> Result<(), ServiceError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServiceError::Listener {
                message: format!("Failed to bind {}: {}", addr, e),
            })?;
        info!("Listening on http://{} (/ws, /health, /metrics)", addr);

        let router = self.router();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.background_tasks.push(tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Listener shutdown signal received");
            });
            if let Err(e) = serve.await {
                error!("Listener failed: {}", e);
            }
        }));
        Ok(())
    }
}
