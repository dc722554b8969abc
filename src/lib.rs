//! Mimic Room - Matchmaking and session relay for anonymous deduction games
//!
//! This crate pairs anonymous players into two-seat rooms over WebSocket,
//! relays their frames verbatim, and probabilistically substitutes one seat
//! with a synthetic peer backed by a language-model responder.

pub mod config;
pub mod error;
pub mod matchmaker;
pub mod metrics;
pub mod protocol;
pub mod responder;
pub mod room;
pub mod service;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchError, Result};
pub use types::*;

// Re-export key components
pub use matchmaker::{MatchmakingEngine, QueuePair, SubstitutionPolicy};
pub use room::RoomRegistry;
pub use service::ServiceApp;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
