//! Metrics and monitoring for the mimic-room relay service
//!
//! This module provides metrics collection and performance tracking for the
//! matchmaking and relay components. The HTTP surface that exposes them
//! lives in the service layer, on the same listener as the session endpoint.

pub mod collector;

pub use collector::{
    ConnectionMetrics, MatchmakingMetrics, MetricsCollector, MetricsTimer, ResponderMetrics,
    RoomMetrics, ServiceMetrics,
};
