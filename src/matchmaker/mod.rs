//! Matchmaking system for the relay service
//!
//! This module handles role queues, the substitution draw and the matching
//! loop that turns waiting participants into rooms.

pub mod engine;
pub mod queues;
pub mod substitution;

// Re-export commonly used types
pub use engine::{CycleOutcome, EngineStats, MatchmakingEngine};
pub use queues::{EnqueueOutcome, QueuePair, RoleQueue};
pub use substitution::{SubstitutionPolicy, SubstitutionStats};
