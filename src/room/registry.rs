//! Room registry
//!
//! Tracks every live room and performs the pairing, relay and teardown
//! operations against the shared map. All state transitions that must be
//! atomic with respect to each other happen inside a single write-lock
//! section, so a room is never observable with only one slot bound.

use crate::error::{MatchError, Result};
use crate::metrics::MetricsCollector;
use crate::protocol::FRAME_PLAYER_DISCONNECTED;
use crate::types::{Participant, Room, RoomId, RoomKind};
use crate::utils::{generate_room_id, truncate_for_log};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Result of attempting to register a pair as a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// Both slots were live; the room is registered and both bindings set.
    Registered(RoomId),
    /// The slot at this index was unusable: its participant disconnected,
    /// or still carried a binding from an earlier room. Nothing was
    /// inserted and the other slot was left untouched.
    SlotUnavailable(usize),
}

/// Result of relaying a payload frame on behalf of a room-bound sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The payload was handed to the peer's outbound sink.
    ForwardedToPeer,
    /// The sender's room is a substituted pair; the caller owns the
    /// responder hand-off for this payload.
    SubstitutedPrompt,
    /// No live room for the sender, or the peer sink was saturated.
    Dropped,
}

/// Counters describing registry activity since startup.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub rooms_created: u64,
    pub rooms_torn_down: u64,
    pub active_rooms: usize,
    pub frames_forwarded: u64,
    pub frames_dropped: u64,
}

/// Registry of live rooms keyed by room id.
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
    stats: Arc<RwLock<RegistryStats>>,
    metrics: Arc<MetricsCollector>,
}

impl RoomRegistry {
    /// Create a new registry with its own metrics collector.
    pub fn new() -> Self {
        let metrics = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));
        Self::with_metrics(metrics)
    }

    /// Create a new registry reporting into a shared metrics collector.
    pub fn with_metrics(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(RegistryStats::default())),
            metrics,
        }
    }

    /// Register a pair of participants as a new room.
    ///
    /// The liveness checks, the id insertion and both room bindings happen
    /// under one write-lock section. A participant that disconnected before
    /// this call aborts the registration and leaves no trace: the survivor
    /// keeps an unset binding and can be paired again.
    pub fn create_room(
        &self,
        first: Arc<Participant>,
        second: Arc<Participant>,
        kind: RoomKind,
    ) -> Result<PairingOutcome> {
        let mut rooms = self.rooms.write().map_err(|_| MatchError::InternalError {
            message: "Failed to acquire rooms lock".to_string(),
        })?;

        if !first.is_connected() {
            debug!("Pairing aborted: first participant {} disconnected", first.id);
            return Ok(PairingOutcome::SlotUnavailable(0));
        }
        if !second.is_connected() {
            debug!("Pairing aborted: second participant {} disconnected", second.id);
            return Ok(PairingOutcome::SlotUnavailable(1));
        }

        let mut room_id = generate_room_id();
        while rooms.contains_key(&room_id) {
            warn!("Room id collision on {}, drawing a new id", room_id);
            room_id = generate_room_id();
        }

        // A stale queue entry can surface a participant that was paired
        // since it enqueued; rejecting the bind keeps the other slot free.
        if let Err(e) = first.bind_room(&room_id) {
            debug!("Pairing aborted: {} ({})", first.id, e);
            return Ok(PairingOutcome::SlotUnavailable(0));
        }
        if let Err(e) = second.bind_room(&room_id) {
            debug!("Pairing aborted: {} ({})", second.id, e);
            // Leave no half-bound pair behind.
            first.take_room();
            return Ok(PairingOutcome::SlotUnavailable(1));
        }

        let room = Room::new(room_id.clone(), [first.clone(), second.clone()], kind);
        rooms.insert(room_id.clone(), room);
        let active = rooms.len();
        drop(rooms);

        if let Ok(mut stats) = self.stats.write() {
            stats.rooms_created += 1;
            stats.active_rooms = active;
        }
        self.metrics.record_room_created(kind, active);

        info!(
            "Room {} registered ({}) for {} and {}",
            room_id, kind, first.id, second.id
        );
        Ok(PairingOutcome::Registered(room_id))
    }

    /// Fetch a snapshot of a room by id.
    pub fn lookup(&self, room_id: &str) -> Result<Option<Room>> {
        let rooms = self.rooms.read().map_err(|_| MatchError::InternalError {
            message: "Failed to acquire rooms lock".to_string(),
        })?;
        Ok(rooms.get(room_id).cloned())
    }

    /// Relay an opaque payload frame from a room-bound sender.
    ///
    /// Human pairs get the payload forwarded to the peer's sink verbatim.
    /// Substituted pairs hand the payload back to the caller, which owns
    /// the responder call; the registry lock is never held across it.
    pub fn relay(&self, sender: &Participant, payload: &str) -> Result<RelayOutcome> {
        let Some(room_id) = sender.room_id() else {
            self.count_dropped_frame();
            return Ok(RelayOutcome::Dropped);
        };

        let rooms = self.rooms.read().map_err(|_| MatchError::InternalError {
            message: "Failed to acquire rooms lock".to_string(),
        })?;
        let Some(room) = rooms.get(&room_id) else {
            // Torn down between the binding read and here. Drop silently.
            debug!(
                "Dropping frame from {} for stale room {}",
                sender.id, room_id
            );
            drop(rooms);
            self.count_dropped_frame();
            return Ok(RelayOutcome::Dropped);
        };

        match room.kind {
            RoomKind::SubstitutedPair => {
                drop(rooms);
                Ok(RelayOutcome::SubstitutedPrompt)
            }
            RoomKind::HumanPair => {
                let Some(peer) = room.peer_of(sender.id) else {
                    drop(rooms);
                    self.count_dropped_frame();
                    return Err(MatchError::ParticipantNotFound {
                        participant_id: sender.id.to_string(),
                    }
                    .into());
                };
                let delivery = peer.try_send(payload.to_string());
                drop(rooms);
                match delivery {
                    Ok(()) => {
                        if let Ok(mut stats) = self.stats.write() {
                            stats.frames_forwarded += 1;
                        }
                        self.metrics.record_relay_forwarded();
                        Ok(RelayOutcome::ForwardedToPeer)
                    }
                    Err(e) => {
                        warn!(
                            "Dropping frame in room {}: {} (payload {})",
                            room_id,
                            e,
                            truncate_for_log(payload, 48)
                        );
                        self.count_dropped_frame();
                        Ok(RelayOutcome::Dropped)
                    }
                }
            }
        }
    }

    /// Tear down the room the participant is bound to, if any.
    ///
    /// Idempotent: the first caller to take the binding removes the room,
    /// clears the peer's binding and notifies the peer; every later caller
    /// finds the binding unset and returns `None`. Racing teardowns for the
    /// same room therefore produce exactly one peer notification.
    pub fn teardown(&self, participant: &Participant) -> Result<Option<RoomId>> {
        let mut rooms = self.rooms.write().map_err(|_| MatchError::InternalError {
            message: "Failed to acquire rooms lock".to_string(),
        })?;

        let Some(room_id) = participant.take_room() else {
            return Ok(None);
        };

        let Some(room) = rooms.remove(&room_id) else {
            // A set binding always has a backing room; both are cleared
            // under the same write lock.
            warn!(
                "Binding for {} pointed at missing room {}",
                participant.id, room_id
            );
            return Ok(None);
        };
        let active = rooms.len();

        if let Some(peer) = room.peer_of(participant.id) {
            peer.take_room();
            if peer.has_sink() {
                if let Err(e) = peer.try_send(FRAME_PLAYER_DISCONNECTED.to_string()) {
                    debug!("Peer {} unreachable during teardown: {}", peer.id, e);
                }
            }
        }
        drop(rooms);

        if let Ok(mut stats) = self.stats.write() {
            stats.rooms_torn_down += 1;
            stats.active_rooms = active;
        }
        self.metrics.record_room_torn_down(active);

        info!("Room {} torn down by {}", room_id, participant.id);
        Ok(Some(room_id))
    }

    /// Number of currently live rooms.
    pub fn active_rooms(&self) -> usize {
        self.rooms.read().map(|rooms| rooms.len()).unwrap_or_default()
    }

    /// Snapshot of registry counters.
    pub fn stats(&self) -> RegistryStats {
        self.stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    fn count_dropped_frame(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.frames_dropped += 1;
        }
        self.metrics.record_relay_dropped();
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
