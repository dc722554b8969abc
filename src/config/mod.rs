//! Configuration management for the mimic-room service
//!
//! This module handles all configuration loading from files and environment
//! variables, validation, and default values for the relay service.

pub mod app;

// Re-export commonly used types
pub use app::{
    validate_config, AppConfig, MatchmakingSettings, ResponderSettings, ServerSettings,
};
