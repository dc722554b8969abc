//! Room registry for live two-party sessions
//!
//! This module owns the shared mapping from room id to room state and the
//! relay and teardown operations performed against it.

pub mod registry;

// Re-export commonly used types
pub use registry::{PairingOutcome, RegistryStats, RelayOutcome, RoomRegistry};
