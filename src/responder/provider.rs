//! Reply provider interface and implementations
//!
//! This module defines the interface for the synthetic peer's reply
//! generation. The production implementation talks to an OpenAI-compatible
//! chat-completions API; the mock implementation scripts replies for tests.

use crate::config::ResponderSettings;
use crate::error::{MatchError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

/// Trait for generating synthetic peer replies
///
/// Implementations may be slow (network-bound); callers must invoke them off
/// the registry lock and off the matching loop. Any error means "no reply"
/// to the client, never a relayed failure.
#[async_trait]
pub trait ReplyProvider: Send + Sync {
    /// Generate a reply to one payload from the real participant
    async fn generate_reply(&self, prompt: &str) -> Result<String>;
}

/// Chat-completions request body
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

/// One chat message in a request or response
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat-completions response body, reduced to the fields we read
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Production reply provider backed by an OpenAI-compatible
/// chat-completions HTTP API
pub struct HttpReplyProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpReplyProvider {
    /// Create a provider from responder settings.
    ///
    /// Fails when no API key is configured; a deployment without a key
    /// should run with substitution rate 0 instead.
    pub fn new(settings: &ResponderSettings) -> Result<Self> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            MatchError::ConfigurationError {
                message: "Responder API key is not set (DEEPSEEK_API_KEY)".to_string(),
            }
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .map_err(|e| MatchError::ResponderFailed {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            api_key,
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl ReplyProvider for HttpReplyProvider {
    async fn generate_reply(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        debug!("Sending responder request to {}", self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MatchError::ResponderFailed {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MatchError::ResponderFailed {
                message: format!("API returned status {}", status),
            }
            .into());
        }

        let body: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| MatchError::ResponderFailed {
                    message: format!("Failed to decode response: {}", e),
                })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| MatchError::ResponderFailed {
                message: "Response contained no choices".to_string(),
            })?;

        Ok(content)
    }
}

/// Reply provider used when no API credentials are configured.
///
/// Every call fails, and callers swallow responder failures, so substituted
/// rooms simply never hear back. Matching behavior is unaffected.
#[derive(Debug, Default)]
pub struct DisabledReplyProvider;

#[async_trait]
impl ReplyProvider for DisabledReplyProvider {
    async fn generate_reply(&self, _prompt: &str) -> Result<String> {
        Err(MatchError::ResponderFailed {
            message: "Responder is disabled: no API key configured".to_string(),
        }
        .into())
    }
}

/// Mock reply provider for testing and development
#[derive(Debug)]
pub struct MockReplyProvider {
    reply: RwLock<String>,
    fail: AtomicBool,
    delay: RwLock<Option<Duration>>,
    /// Prompts observed, in arrival order
    prompts: RwLock<Vec<String>>,
}

impl MockReplyProvider {
    /// Create a mock that answers every prompt with a fixed line
    pub fn new() -> Self {
        Self {
            reply: RwLock::new("mock reply".to_string()),
            fail: AtomicBool::new(false),
            delay: RwLock::new(None),
            prompts: RwLock::new(Vec::new()),
        }
    }

    /// Create a mock with a specific canned reply
    pub fn with_reply(reply: &str) -> Self {
        let provider = Self::new();
        if let Ok(mut guard) = provider.reply.write() {
            *guard = reply.to_string();
        }
        provider
    }

    /// Create a mock that fails every request
    pub fn failing() -> Self {
        let provider = Self::new();
        provider.fail.store(true, Ordering::Release);
        provider
    }

    /// Delay every reply, simulating a slow network-bound responder
    pub fn with_delay(self, delay: Duration) -> Self {
        if let Ok(mut guard) = self.delay.write() {
            *guard = Some(delay);
        }
        self
    }

    /// All prompts this mock has been asked to answer
    pub fn seen_prompts(&self) -> Vec<String> {
        self.prompts
            .read()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

impl Default for MockReplyProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReplyProvider for MockReplyProvider {
    async fn generate_reply(&self, prompt: &str) -> Result<String> {
        {
            let mut prompts = self.prompts.write().map_err(|_| {
                MatchError::InternalError {
                    message: "Failed to acquire prompts write lock".to_string(),
                }
            })?;
            prompts.push(prompt.to_string());
        }

        let delay = self.delay.read().ok().and_then(|guard| *guard);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail.load(Ordering::Acquire) {
            return Err(MatchError::ResponderFailed {
                message: "Mock responder configured to fail".to_string(),
            }
            .into());
        }

        let reply = self.reply.read().map_err(|_| {
            MatchError::InternalError {
                message: "Failed to acquire reply read lock".to_string(),
            }
        })?;

        Ok(reply.clone())
    }
}
