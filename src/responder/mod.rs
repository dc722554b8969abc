//! Synthetic responder integration
//!
//! This module defines the interface for generating synthetic peer replies
//! and its implementations: a chat-completions HTTP client for production
//! and a mock for tests.

pub mod provider;

// Re-export commonly used types
pub use provider::{DisabledReplyProvider, HttpReplyProvider, MockReplyProvider, ReplyProvider};
