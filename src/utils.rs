//! Utility functions for the matchmaking and relay service

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes behind a room id
pub const ROOM_ID_BYTES: usize = 8;

/// Generate a new room id: crypto-random bytes, base64url-encoded without
/// padding.
///
/// A room id is the only credential needed to address a room on the relay
/// path, so ids carry no sequential or predictable component.
pub fn generate_room_id() -> String {
    let mut bytes = [0u8; ROOM_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Truncate a string for log output, marking elision
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let prefix: String = text.chars().take(max_chars).collect();
        format!("{}...", prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_room_id_length_and_charset() {
        let id = generate_room_id();
        // 8 bytes -> 11 base64 chars without padding
        assert_eq!(id.len(), 11);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!id.contains('='));
    }

    #[test]
    fn test_room_ids_are_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_room_id()));
        }
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("exactly-ten", 11), "exactly-ten");
        assert_eq!(truncate_for_log("somewhat longer text", 8), "somewhat...");
    }
}
