//! WebSocket session handling
//!
//! Each connected client gets one session pump: a reader that dispatches
//! inbound frames and a writer that drains the participant's outbound sink.

pub mod pump;

// Re-export commonly used types
pub use pump::ws_handler;
