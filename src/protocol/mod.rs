//! Wire protocol for the matchmaking and relay service
//!
//! This module defines the pipe-delimited text frames exchanged with clients
//! and the tokenize-then-match parsing of inbound frames.

pub mod frames;
pub mod parser;

// Re-export commonly used types
pub use frames::*;
pub use parser::{prompt_segment, ClientCommand};
