//! Error types for the matchmaking and relay service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking and relay scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Queue is full: {role}")]
    QueueFull { role: String },

    #[error("Invalid match request: {reason}")]
    InvalidMatchRequest { reason: String },

    #[error("Room not found: {room_id}")]
    RoomNotFound { room_id: String },

    #[error("Participant not found: {participant_id}")]
    ParticipantNotFound { participant_id: String },

    #[error("Participant already bound to a room: {room_id}")]
    AlreadyInRoom { room_id: String },

    #[error("Outbound sink unavailable for participant: {participant_id}")]
    SinkUnavailable { participant_id: String },

    #[error("Responder request failed: {message}")]
    ResponderFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
