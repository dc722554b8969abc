//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the mimic-room relay
//! service using Prometheus metrics.

use crate::types::{Role, RoomKind};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the relay service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Connection-level metrics
    connection_metrics: ConnectionMetrics,

    /// Matchmaking metrics
    matchmaking_metrics: MatchmakingMetrics,

    /// Room and relay metrics
    room_metrics: RoomMetrics,

    /// Responder metrics
    responder_metrics: ResponderMetrics,

    /// Service-level metrics
    service_metrics: ServiceMetrics,
}

/// Connection-level metrics
#[derive(Clone)]
pub struct ConnectionMetrics {
    /// Currently open sessions
    pub active_connections: IntGauge,

    /// Total sessions opened
    pub connections_total: IntCounter,

    /// Total sessions closed
    pub disconnections_total: IntCounter,

    /// Total inbound text frames
    pub frames_received_total: IntCounter,

    /// Inbound frames dropped as unrecognized outside a room
    pub frames_ignored_total: IntCounter,

    /// Session lifetime distribution
    pub session_duration_seconds: Histogram,
}

/// Matchmaking metrics
#[derive(Clone)]
pub struct MatchmakingMetrics {
    /// Participants currently waiting, per role
    pub queue_depth: IntGaugeVec,

    /// Total accepted match requests, per role
    pub enqueued_total: IntCounterVec,

    /// Match requests rejected because the queue was full
    pub queue_rejections_total: IntCounterVec,

    /// Rooms produced by matching, per kind
    pub matches_total: IntCounterVec,

    /// Wait windows that closed without a peer
    pub match_timeouts_total: IntCounter,

    /// Substitution draws by outcome
    pub substitution_draws_total: IntCounterVec,

    /// Time from first pull to room registration
    pub pairing_wait_seconds: Histogram,
}

/// Room and relay metrics
#[derive(Clone)]
pub struct RoomMetrics {
    /// Currently live rooms
    pub active_rooms: IntGauge,

    /// Total rooms registered, per kind
    pub rooms_created_total: IntCounterVec,

    /// Total rooms torn down
    pub rooms_torn_down_total: IntCounter,

    /// Payload frames forwarded between peers
    pub frames_relayed_total: IntCounter,

    /// Payload frames dropped (stale room or saturated sink)
    pub relay_drops_total: IntCounter,
}

/// Responder metrics
#[derive(Clone)]
pub struct ResponderMetrics {
    /// Replies generated successfully
    pub replies_total: IntCounter,

    /// Reply generation failures
    pub failures_total: IntCounter,

    /// Reply latency distribution
    pub reply_duration_seconds: Histogram,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Guesser => "guesser",
        Role::Mimic => "mimic",
    }
}

fn kind_label(kind: RoomKind) -> &'static str {
    match kind {
        RoomKind::SubstitutedPair => "substituted",
        RoomKind::HumanPair => "human",
    }
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with a custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let connection_metrics = ConnectionMetrics::new(&registry)?;
        let matchmaking_metrics = MatchmakingMetrics::new(&registry)?;
        let room_metrics = RoomMetrics::new(&registry)?;
        let responder_metrics = ResponderMetrics::new(&registry)?;
        let service_metrics = ServiceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            connection_metrics,
            matchmaking_metrics,
            room_metrics,
            responder_metrics,
            service_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get connection metrics
    pub fn connections(&self) -> &ConnectionMetrics {
        &self.connection_metrics
    }

    /// Get matchmaking metrics
    pub fn matchmaking(&self) -> &MatchmakingMetrics {
        &self.matchmaking_metrics
    }

    /// Get room metrics
    pub fn rooms(&self) -> &RoomMetrics {
        &self.room_metrics
    }

    /// Get responder metrics
    pub fn responder(&self) -> &ResponderMetrics {
        &self.responder_metrics
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Record a session being opened
    pub fn record_connection_opened(&self) {
        self.connection_metrics.connections_total.inc();
        self.connection_metrics.active_connections.inc();
    }

    /// Record a session being closed
    pub fn record_connection_closed(&self, session: Duration) {
        self.connection_metrics.disconnections_total.inc();
        self.connection_metrics.active_connections.dec();
        self.connection_metrics
            .session_duration_seconds
            .observe(session.as_secs_f64());
    }

    /// Record an inbound text frame
    pub fn record_frame_received(&self) {
        self.connection_metrics.frames_received_total.inc();
    }

    /// Record an unrecognized frame dropped outside a room
    pub fn record_frame_ignored(&self) {
        self.connection_metrics.frames_ignored_total.inc();
    }

    /// Record an accepted match request
    pub fn record_enqueue(&self, role: Role) {
        self.matchmaking_metrics
            .enqueued_total
            .with_label_values(&[role_label(role)])
            .inc();
    }

    /// Record a match request rejected on a full queue
    pub fn record_enqueue_rejected(&self, role: Role) {
        self.matchmaking_metrics
            .queue_rejections_total
            .with_label_values(&[role_label(role)])
            .inc();
    }

    /// Update a role queue depth gauge
    pub fn set_queue_depth(&self, role: Role, depth: usize) {
        self.matchmaking_metrics
            .queue_depth
            .with_label_values(&[role_label(role)])
            .set(depth as i64);
    }

    /// Record a completed match and the wait it took
    pub fn record_match_created(&self, kind: RoomKind, wait: Duration) {
        self.matchmaking_metrics
            .matches_total
            .with_label_values(&[kind_label(kind)])
            .inc();
        self.matchmaking_metrics
            .pairing_wait_seconds
            .observe(wait.as_secs_f64());
    }

    /// Record a wait window closing without a peer
    pub fn record_match_timeout(&self) {
        self.matchmaking_metrics.match_timeouts_total.inc();
    }

    /// Record a substitution draw outcome
    pub fn record_substitution_draw(&self, substituted: bool) {
        let outcome = if substituted { "substituted" } else { "human" };
        self.matchmaking_metrics
            .substitution_draws_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a room registration
    pub fn record_room_created(&self, kind: RoomKind, active: usize) {
        self.room_metrics
            .rooms_created_total
            .with_label_values(&[kind_label(kind)])
            .inc();
        self.room_metrics.active_rooms.set(active as i64);
    }

    /// Record a room teardown
    pub fn record_room_torn_down(&self, active: usize) {
        self.room_metrics.rooms_torn_down_total.inc();
        self.room_metrics.active_rooms.set(active as i64);
    }

    /// Record a payload frame forwarded to a peer
    pub fn record_relay_forwarded(&self) {
        self.room_metrics.frames_relayed_total.inc();
    }

    /// Record a payload frame dropped during relay
    pub fn record_relay_dropped(&self) {
        self.room_metrics.relay_drops_total.inc();
    }

    /// Record a successful responder reply
    pub fn record_responder_reply(&self, latency: Duration) {
        self.responder_metrics.replies_total.inc();
        self.responder_metrics
            .reply_duration_seconds
            .observe(latency.as_secs_f64());
    }

    /// Record a responder failure
    pub fn record_responder_failure(&self) {
        self.responder_metrics.failures_total.inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ConnectionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_connections =
            IntGauge::new("mimic_room_active_connections", "Currently open sessions")?;
        registry.register(Box::new(active_connections.clone()))?;

        let connections_total =
            IntCounter::new("mimic_room_connections_total", "Total sessions opened")?;
        registry.register(Box::new(connections_total.clone()))?;

        let disconnections_total =
            IntCounter::new("mimic_room_disconnections_total", "Total sessions closed")?;
        registry.register(Box::new(disconnections_total.clone()))?;

        let frames_received_total = IntCounter::new(
            "mimic_room_frames_received_total",
            "Total inbound text frames",
        )?;
        registry.register(Box::new(frames_received_total.clone()))?;

        let frames_ignored_total = IntCounter::new(
            "mimic_room_frames_ignored_total",
            "Inbound frames dropped as unrecognized outside a room",
        )?;
        registry.register(Box::new(frames_ignored_total.clone()))?;

        let session_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "mimic_room_session_duration_seconds",
                "Session lifetime in seconds",
            )
            .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        )?;
        registry.register(Box::new(session_duration_seconds.clone()))?;

        Ok(Self {
            active_connections,
            connections_total,
            disconnections_total,
            frames_received_total,
            frames_ignored_total,
            session_duration_seconds,
        })
    }
}

impl MatchmakingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let queue_depth = IntGaugeVec::new(
            Opts::new("mimic_room_queue_depth", "Participants waiting per role"),
            &["role"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let enqueued_total = IntCounterVec::new(
            Opts::new("mimic_room_enqueued_total", "Total accepted match requests"),
            &["role"],
        )?;
        registry.register(Box::new(enqueued_total.clone()))?;

        let queue_rejections_total = IntCounterVec::new(
            Opts::new(
                "mimic_room_queue_rejections_total",
                "Match requests rejected on a full queue",
            ),
            &["role"],
        )?;
        registry.register(Box::new(queue_rejections_total.clone()))?;

        let matches_total = IntCounterVec::new(
            Opts::new("mimic_room_matches_total", "Rooms produced by matching"),
            &["kind"],
        )?;
        registry.register(Box::new(matches_total.clone()))?;

        let match_timeouts_total = IntCounter::new(
            "mimic_room_match_timeouts_total",
            "Wait windows closed without a peer",
        )?;
        registry.register(Box::new(match_timeouts_total.clone()))?;

        let substitution_draws_total = IntCounterVec::new(
            Opts::new(
                "mimic_room_substitution_draws_total",
                "Substitution draws by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(substitution_draws_total.clone()))?;

        let pairing_wait_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "mimic_room_pairing_wait_seconds",
                "Time from first pull to room registration",
            )
            .buckets(vec![0.05, 0.25, 1.0, 5.0, 10.0, 20.0, 30.0, 45.0]),
        )?;
        registry.register(Box::new(pairing_wait_seconds.clone()))?;

        Ok(Self {
            queue_depth,
            enqueued_total,
            queue_rejections_total,
            matches_total,
            match_timeouts_total,
            substitution_draws_total,
            pairing_wait_seconds,
        })
    }
}

impl RoomMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_rooms = IntGauge::new("mimic_room_active_rooms", "Currently live rooms")?;
        registry.register(Box::new(active_rooms.clone()))?;

        let rooms_created_total = IntCounterVec::new(
            Opts::new("mimic_room_rooms_created_total", "Total rooms registered"),
            &["kind"],
        )?;
        registry.register(Box::new(rooms_created_total.clone()))?;

        let rooms_torn_down_total =
            IntCounter::new("mimic_room_rooms_torn_down_total", "Total rooms torn down")?;
        registry.register(Box::new(rooms_torn_down_total.clone()))?;

        let frames_relayed_total = IntCounter::new(
            "mimic_room_frames_relayed_total",
            "Payload frames forwarded between peers",
        )?;
        registry.register(Box::new(frames_relayed_total.clone()))?;

        let relay_drops_total = IntCounter::new(
            "mimic_room_relay_drops_total",
            "Payload frames dropped during relay",
        )?;
        registry.register(Box::new(relay_drops_total.clone()))?;

        Ok(Self {
            active_rooms,
            rooms_created_total,
            rooms_torn_down_total,
            frames_relayed_total,
            relay_drops_total,
        })
    }
}

impl ResponderMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let replies_total = IntCounter::new(
            "mimic_room_responder_replies_total",
            "Replies generated successfully",
        )?;
        registry.register(Box::new(replies_total.clone()))?;

        let failures_total = IntCounter::new(
            "mimic_room_responder_failures_total",
            "Reply generation failures",
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        let reply_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "mimic_room_responder_reply_duration_seconds",
                "Reply latency in seconds",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(reply_duration_seconds.clone()))?;

        Ok(Self {
            replies_total,
            failures_total,
            reply_duration_seconds,
        })
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("mimic_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "mimic_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("mimic_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
