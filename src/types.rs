//! Common types used throughout the matchmaking and relay service

use crate::error::{MatchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for participants
pub type ParticipantId = Uuid;

/// Unique identifier for rooms (URL-safe, crypto-random)
pub type RoomId = String;

/// Matchmaking role a participant queues under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Guesser,
    Mimic,
}

impl Role {
    /// The role this one pairs against
    pub fn complement(&self) -> Role {
        match self {
            Role::Guesser => Role::Mimic,
            Role::Mimic => Role::Guesser,
        }
    }

    /// Parse a wire-format role token
    pub fn from_wire(token: &str) -> Option<Role> {
        match token {
            "GUESSER" => Some(Role::Guesser),
            "MIMIC" => Some(Role::Mimic),
            _ => None,
        }
    }

    /// Wire-format token for this role
    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::Guesser => "GUESSER",
            Role::Mimic => "MIMIC",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

/// Whether a room pairs two humans or a human with the synthetic responder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomKind {
    SubstitutedPair,
    HumanPair,
}

impl RoomKind {
    /// Numeric wire encoding carried in the MATCH_SUCCESS frame
    pub fn as_wire(&self) -> &'static str {
        match self {
            RoomKind::SubstitutedPair => "0",
            RoomKind::HumanPair => "1",
        }
    }
}

impl std::fmt::Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomKind::SubstitutedPair => write!(f, "substituted-pair"),
            RoomKind::HumanPair => write!(f, "human-pair"),
        }
    }
}

/// One matchmaking entity: a live connection, or the synthetic responder peer.
///
/// `room_id` transitions only unset -> set (on match) -> unset (on teardown);
/// both transitions happen under the registry write lock. `connected` is
/// cleared exactly once, before the owning session triggers teardown.
#[derive(Debug)]
pub struct Participant {
    pub id: ParticipantId,
    display_name: RwLock<String>,
    room_id: RwLock<Option<RoomId>>,
    outbound: Option<mpsc::Sender<String>>,
    connected: AtomicBool,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Create a participant backed by a live connection
    pub fn new(outbound: mpsc::Sender<String>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            display_name: RwLock::new(String::new()),
            room_id: RwLock::new(None),
            outbound: Some(outbound),
            connected: AtomicBool::new(true),
            joined_at: Utc::now(),
        })
    }

    /// Create the synthetic responder peer for a substituted room
    pub fn synthetic() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            display_name: RwLock::new("AI".to_string()),
            room_id: RwLock::new(None),
            outbound: None,
            connected: AtomicBool::new(true),
            joined_at: Utc::now(),
        })
    }

    /// Whether this participant has a live outbound sink (false for synthetic peers)
    pub fn has_sink(&self) -> bool {
        self.outbound.is_some()
    }

    pub fn display_name(&self) -> String {
        self.display_name
            .read()
            .map(|name| name.clone())
            .unwrap_or_default()
    }

    /// Set the display name; last write wins, empty writes are ignored
    pub fn set_display_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Ok(());
        }
        let mut guard = self.display_name.write().map_err(|_| {
            MatchError::InternalError {
                message: "Display name lock poisoned".to_string(),
            }
        })?;
        *guard = name.to_string();
        Ok(())
    }

    /// The room this participant is currently bound to, if any
    pub fn room_id(&self) -> Option<RoomId> {
        self.room_id.read().ok().and_then(|guard| guard.clone())
    }

    /// Bind this participant to a room.
    ///
    /// Callers must hold the registry write lock; binding while already
    /// bound violates the membership invariant and is rejected.
    pub fn bind_room(&self, room_id: &RoomId) -> Result<()> {
        let mut guard = self.room_id.write().map_err(|_| {
            MatchError::InternalError {
                message: "Room binding lock poisoned".to_string(),
            }
        })?;
        if let Some(existing) = guard.as_ref() {
            return Err(MatchError::AlreadyInRoom {
                room_id: existing.clone(),
            }
            .into());
        }
        *guard = Some(room_id.clone());
        Ok(())
    }

    /// Clear the room binding, returning the previous room id if one was set.
    ///
    /// Callers must hold the registry write lock. Returning `None` means the
    /// binding was already cleared (teardown already ran).
    pub fn take_room(&self) -> Option<RoomId> {
        self.room_id.write().ok().and_then(|mut guard| guard.take())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Mark this participant disconnected; idempotent, returns whether this
    /// call performed the transition.
    pub fn set_disconnected(&self) -> bool {
        self.connected.swap(false, Ordering::AcqRel)
    }

    /// Non-blocking push into the outbound sink.
    ///
    /// Synthetic participants have no sink and accept everything silently.
    /// A full or closed sink is reported as an error; callers log and move
    /// on rather than blocking.
    pub fn try_send(&self, frame: String) -> Result<()> {
        let Some(sender) = &self.outbound else {
            return Ok(());
        };
        sender
            .try_send(frame)
            .map_err(|_| {
                MatchError::SinkUnavailable {
                    participant_id: self.id.to_string(),
                }
                .into()
            })
    }
}

/// A two-slot relay session
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub slots: [Arc<Participant>; 2],
    pub kind: RoomKind,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: RoomId, slots: [Arc<Participant>; 2], kind: RoomKind) -> Self {
        Self {
            id,
            slots,
            kind,
            created_at: Utc::now(),
        }
    }

    /// The slot index occupied by the given participant, if any
    pub fn slot_of(&self, participant_id: ParticipantId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == participant_id)
    }

    /// The other occupant of the room, relative to the given participant
    pub fn peer_of(&self, participant_id: ParticipantId) -> Option<Arc<Participant>> {
        let slot = self.slot_of(participant_id)?;
        Some(Arc::clone(&self.slots[1 - slot]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_participant() -> (Arc<Participant>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (Participant::new(tx), rx)
    }

    #[test]
    fn test_role_wire_round_trip() {
        assert_eq!(Role::from_wire("GUESSER"), Some(Role::Guesser));
        assert_eq!(Role::from_wire("MIMIC"), Some(Role::Mimic));
        assert_eq!(Role::from_wire("JUDGE"), None);
        assert_eq!(Role::Guesser.complement(), Role::Mimic);
        assert_eq!(Role::Mimic.complement(), Role::Guesser);
    }

    #[test]
    fn test_room_binding_transitions() {
        let (participant, _rx) = connected_participant();
        assert_eq!(participant.room_id(), None);

        participant.bind_room(&"abc123".to_string()).unwrap();
        assert_eq!(participant.room_id(), Some("abc123".to_string()));

        // Double bind violates the membership invariant
        assert!(participant.bind_room(&"other".to_string()).is_err());

        assert_eq!(participant.take_room(), Some("abc123".to_string()));
        assert_eq!(participant.take_room(), None);
    }

    #[test]
    fn test_display_name_last_write_wins() {
        let (participant, _rx) = connected_participant();
        assert_eq!(participant.display_name(), "");

        participant.set_display_name("Alice").unwrap();
        participant.set_display_name("Bob").unwrap();
        assert_eq!(participant.display_name(), "Bob");

        // Empty writes are ignored
        participant.set_display_name("").unwrap();
        assert_eq!(participant.display_name(), "Bob");
    }

    #[test]
    fn test_disconnect_is_one_shot() {
        let (participant, _rx) = connected_participant();
        assert!(participant.is_connected());
        assert!(participant.set_disconnected());
        assert!(!participant.set_disconnected());
        assert!(!participant.is_connected());
    }

    #[test]
    fn test_try_send_reports_saturation() {
        let (tx, _rx) = mpsc::channel(1);
        let participant = Participant::new(tx);
        participant.try_send("first".to_string()).unwrap();
        assert!(participant.try_send("second".to_string()).is_err());
    }

    #[test]
    fn test_synthetic_accepts_silently() {
        let synthetic = Participant::synthetic();
        assert!(!synthetic.has_sink());
        synthetic.try_send("anything".to_string()).unwrap();
    }

    #[test]
    fn test_room_peer_lookup() {
        let (a, _rx_a) = connected_participant();
        let (b, _rx_b) = connected_participant();
        let room = Room::new(
            "room-1".to_string(),
            [Arc::clone(&a), Arc::clone(&b)],
            RoomKind::HumanPair,
        );

        assert_eq!(room.slot_of(a.id), Some(0));
        assert_eq!(room.slot_of(b.id), Some(1));
        assert_eq!(room.peer_of(a.id).map(|p| p.id), Some(b.id));
        assert_eq!(room.peer_of(b.id).map(|p| p.id), Some(a.id));
        assert!(room.peer_of(Uuid::new_v4()).is_none());
    }
}
