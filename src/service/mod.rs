//! Service layer for the matchmaking relay
//!
//! This module wires the components together, runs the listener and
//! background tasks, and serves the monitoring endpoints.

pub mod app;
pub mod health;

pub use app::{AppHandle, ServiceApp, ServiceError};
pub use health::{HealthCheck, HealthStatus};
