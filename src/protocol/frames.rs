//! Frame vocabulary and outbound frame construction
//!
//! Frames are newline-free text with pipe-delimited fields; the first field
//! names the command.

use crate::types::{Role, RoomId, RoomKind};

/// Field delimiter for all frames
pub const DELIMITER: char = '|';

/// Inbound command names
pub const CMD_PING: &str = "PING";
pub const CMD_SET_USERNAME: &str = "SET_USERNAME";
pub const CMD_REQUEST_MATCH: &str = "REQUEST_MATCH";

/// Outbound frame names
pub const FRAME_PONG: &str = "PONG";
pub const FRAME_MATCH_QUEUED: &str = "MATCH_QUEUED";
pub const FRAME_MATCH_QUEUE_FULL: &str = "MATCH_QUEUE_FULL";
pub const FRAME_INVALID_ROLE: &str = "INVALID_ROLE";
pub const FRAME_MATCH_SUCCESS: &str = "MATCH_SUCCESS";
pub const FRAME_MATCH_TIMEOUT: &str = "MATCH_TIMEOUT";
pub const FRAME_PLAYER_DISCONNECTED: &str = "PLAYER_DISCONNECTED";
pub const FRAME_AI_REPLY: &str = "AI";

/// Build a MATCH_QUEUED acknowledgement for the accepted role
pub fn match_queued(role: Role) -> String {
    format!("{}{}{}", FRAME_MATCH_QUEUED, DELIMITER, role.as_wire())
}

/// Build a MATCH_SUCCESS notification carrying the room id and kind
pub fn match_success(room_id: &RoomId, kind: RoomKind) -> String {
    format!(
        "{}{}{}{}{}",
        FRAME_MATCH_SUCCESS,
        DELIMITER,
        room_id,
        DELIMITER,
        kind.as_wire()
    )
}

/// Build an AI reply frame, tagged distinctly from relayed peer traffic
pub fn ai_reply(text: &str) -> String {
    format!("{}{}{}", FRAME_AI_REPLY, DELIMITER, text)
}
