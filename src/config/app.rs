//! Main application configuration
//!
//! This module defines the primary configuration structures for the mimic-room
//! relay service, including file loading, environment variable overrides and
//! validation.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub matchmaking: MatchmakingSettings,
    pub responder: ResponderSettings,
}

/// Server-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Bind address for the combined WebSocket + health listener
    pub bind_host: String,
    /// Port for the combined WebSocket + health listener
    pub port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matchmaking and session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Capacity of each role queue
    pub queue_capacity: usize,
    /// How long a lone participant waits for a peer, in seconds
    pub peer_wait_seconds: u64,
    /// Percentage of matches substituted with the synthetic responder (0-100)
    pub substitution_rate: u8,
    /// Capacity of each participant's outbound sink
    pub sink_capacity: usize,
    /// Idle interval before the writer sends a transport ping, in seconds
    pub heartbeat_interval_seconds: u64,
    /// Read deadline for inbound frames, in seconds
    pub read_deadline_seconds: u64,
}

/// Synthetic responder API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderSettings {
    /// Chat-completions endpoint URL
    pub api_url: String,
    /// Model name sent with each request
    pub model: String,
    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
    /// API key; only ever read from the environment, never from files
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: "mimic-room".to_string(),
            log_level: "info".to_string(),
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            peer_wait_seconds: 30,
            substitution_rate: 50,
            sink_capacity: 64,
            heartbeat_interval_seconds: 50,
            read_deadline_seconds: 60,
        }
    }
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.deepseek.com/chat/completions".to_string(),
            model: "deepseek-chat".to_string(),
            request_timeout_seconds: 30,
            api_key: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still win
    /// over file values
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))?;
        config.apply_env_overrides()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Apply environment variable overrides onto the current values
    fn apply_env_overrides(&mut self) -> Result<()> {
        // Server settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.server.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.server.log_level = log_level;
        }
        if let Ok(host) = env::var("BIND_HOST") {
            self.server.bind_host = host;
        }
        if let Ok(port) = env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| anyhow!("Invalid PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.server.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Matchmaking settings
        if let Ok(capacity) = env::var("QUEUE_CAPACITY") {
            self.matchmaking.queue_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("Invalid QUEUE_CAPACITY value: {}", capacity))?;
        }
        if let Ok(wait) = env::var("PEER_WAIT_SECONDS") {
            self.matchmaking.peer_wait_seconds = wait
                .parse()
                .map_err(|_| anyhow!("Invalid PEER_WAIT_SECONDS value: {}", wait))?;
        }
        if let Ok(rate) = env::var("SUBSTITUTION_RATE") {
            self.matchmaking.substitution_rate = rate
                .parse()
                .map_err(|_| anyhow!("Invalid SUBSTITUTION_RATE value: {}", rate))?;
        }
        if let Ok(capacity) = env::var("SINK_CAPACITY") {
            self.matchmaking.sink_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("Invalid SINK_CAPACITY value: {}", capacity))?;
        }
        if let Ok(interval) = env::var("HEARTBEAT_INTERVAL_SECONDS") {
            self.matchmaking.heartbeat_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid HEARTBEAT_INTERVAL_SECONDS value: {}", interval))?;
        }
        if let Ok(deadline) = env::var("READ_DEADLINE_SECONDS") {
            self.matchmaking.read_deadline_seconds = deadline
                .parse()
                .map_err(|_| anyhow!("Invalid READ_DEADLINE_SECONDS value: {}", deadline))?;
        }

        // Responder settings
        if let Ok(url) = env::var("DEEPSEEK_API_URL") {
            self.responder.api_url = url;
        }
        if let Ok(model) = env::var("RESPONDER_MODEL") {
            self.responder.model = model;
        }
        if let Ok(timeout) = env::var("RESPONDER_TIMEOUT_SECONDS") {
            self.responder.request_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid RESPONDER_TIMEOUT_SECONDS value: {}", timeout))?;
        }
        if let Ok(key) = env::var("DEEPSEEK_API_KEY") {
            if !key.is_empty() {
                self.responder.api_key = Some(key);
            }
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_seconds)
    }

    /// Get peer wait window as Duration
    pub fn peer_wait(&self) -> Duration {
        Duration::from_secs(self.matchmaking.peer_wait_seconds)
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.heartbeat_interval_seconds)
    }

    /// Get read deadline as Duration
    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.matchmaking.read_deadline_seconds)
    }

    /// Get responder request timeout as Duration
    pub fn responder_timeout(&self) -> Duration {
        Duration::from_secs(self.responder.request_timeout_seconds)
    }

    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_host, self.server.port)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.server.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.server.log_level)),
    }

    // Validate ports and timeouts
    if config.server.port == 0 {
        return Err(anyhow!("Server port cannot be 0"));
    }
    if config.server.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate matchmaking settings
    if config.matchmaking.queue_capacity == 0 {
        return Err(anyhow!("Queue capacity must be greater than 0"));
    }
    if config.matchmaking.sink_capacity == 0 {
        return Err(anyhow!("Sink capacity must be greater than 0"));
    }
    if config.matchmaking.peer_wait_seconds == 0 {
        return Err(anyhow!("Peer wait window must be greater than 0"));
    }
    if config.matchmaking.substitution_rate > 100 {
        return Err(anyhow!(
            "Substitution rate must be between 0 and 100, got {}",
            config.matchmaking.substitution_rate
        ));
    }
    if config.matchmaking.heartbeat_interval_seconds == 0 {
        return Err(anyhow!("Heartbeat interval must be greater than 0"));
    }
    if config.matchmaking.read_deadline_seconds
        <= config.matchmaking.heartbeat_interval_seconds
    {
        return Err(anyhow!(
            "Read deadline must exceed the heartbeat interval ({}s <= {}s)",
            config.matchmaking.read_deadline_seconds,
            config.matchmaking.heartbeat_interval_seconds
        ));
    }

    // Validate responder settings
    if config.responder.api_url.is_empty() {
        return Err(anyhow!("Responder API URL cannot be empty"));
    }
    if config.responder.model.is_empty() {
        return Err(anyhow!("Responder model cannot be empty"));
    }
    if config.responder.request_timeout_seconds == 0 {
        return Err(anyhow!("Responder request timeout must be greater than 0"));
    }

    Ok(())
}
