//! Inbound frame parsing
//!
//! Parsing tokenizes on the delimiter before interpreting anything, so a
//! frame shorter than a command's shape is never mistaken for that command.
//! Frames that match no control command are left to the session layer, which
//! relays them as room payload or drops them.

use crate::protocol::frames::{CMD_PING, CMD_REQUEST_MATCH, CMD_SET_USERNAME, DELIMITER};
use crate::types::Role;

/// A recognized inbound control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Ping,
    SetUsername { name: String },
    RequestMatch { role: Role },
    /// REQUEST_MATCH carrying a token that names no known role
    InvalidRole { token: String },
}

impl ClientCommand {
    /// Parse one inbound frame into a control command.
    ///
    /// Returns `None` when the frame is not a control command at all; the
    /// caller decides between relay and silent drop. `SET_USERNAME` takes
    /// the entire remainder after the first delimiter, so names may contain
    /// delimiters themselves.
    pub fn parse(frame: &str) -> Option<ClientCommand> {
        let mut fields = frame.splitn(2, DELIMITER);
        let command = fields.next().unwrap_or("");
        let rest = fields.next();

        match (command, rest) {
            (CMD_PING, None) => Some(ClientCommand::Ping),
            (CMD_SET_USERNAME, Some(name)) => Some(ClientCommand::SetUsername {
                name: name.to_string(),
            }),
            (CMD_REQUEST_MATCH, Some(token)) => match Role::from_wire(token) {
                Some(role) => Some(ClientCommand::RequestMatch { role }),
                None => Some(ClientCommand::InvalidRole {
                    token: token.to_string(),
                }),
            },
            _ => None,
        }
    }
}

/// Extract the responder prompt from a room payload frame.
///
/// Clients send payloads as `SENDER|MESSAGE`; only the message field is a
/// prompt. A frame with no delimiter carries none.
pub fn prompt_segment(frame: &str) -> Option<&str> {
    frame.split(DELIMITER).nth(1)
}
