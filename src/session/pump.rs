//! Per-connection session pumps
//!
//! Every accepted WebSocket upgrade gets one [`SessionPump`]: a reader that
//! enforces the 60s read deadline and dispatches inbound frames, and a
//! writer task that drains the participant's outbound sink and emits a
//! transport ping after 50s without traffic. Disconnection is terminal: the
//! reader exits, the participant leaves any queue it still occupies and its
//! room is torn down.

use crate::matchmaker::{EnqueueOutcome, QueuePair, SubstitutionPolicy};
use crate::metrics::MetricsCollector;
use crate::protocol::{
    match_queued, prompt_segment, ClientCommand, FRAME_INVALID_ROLE, FRAME_MATCH_QUEUE_FULL,
    FRAME_PONG,
};
use crate::room::{RelayOutcome, RoomRegistry};
use crate::types::Participant;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shared collaborators and tuning handed to every session pump.
#[derive(Clone)]
pub struct SessionState {
    pub queues: Arc<QueuePair>,
    pub registry: Arc<RoomRegistry>,
    pub substitution: Arc<SubstitutionPolicy>,
    pub metrics: Arc<MetricsCollector>,
    /// Capacity of each participant's outbound sink
    pub sink_capacity: usize,
    /// Idle interval before the writer sends a transport ping
    pub heartbeat_interval: Duration,
    /// Read deadline for inbound frames, reset on every received message
    pub read_deadline: Duration,
}

/// Axum handler for the `/ws` upgrade endpoint.
pub async fn ws_handler(State(state): State<SessionState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        SessionPump::new(state).run(socket).await;
    })
}

/// One connection's pump, owning its dispatch against the shared components.
pub struct SessionPump {
    state: SessionState,
}

impl SessionPump {
    pub fn new(state: SessionState) -> Self {
        Self { state }
    }

    /// Drive one socket until it disconnects, then clean up after it.
    pub async fn run(&self, socket: WebSocket) {
        let (ws_tx, ws_rx) = socket.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.state.sink_capacity);
        let participant = Participant::new(outbound_tx);

        self.state.metrics.record_connection_opened();
        info!("Session {} opened", participant.id);

        let writer = tokio::spawn(write_pump(
            ws_tx,
            outbound_rx,
            self.state.heartbeat_interval,
        ));

        self.read_pump(ws_rx, &participant).await;
        self.disconnect(&participant);

        // The read side is gone; the writer has nothing left to deliver to.
        writer.abort();
    }

    /// Inbound loop: wait for the next frame under the read deadline and
    /// dispatch it. Any read failure, deadline expiry or close frame ends
    /// the session.
    async fn read_pump(
        &self,
        mut ws_rx: impl StreamExt<Item = Result<Message, axum::Error>> + Unpin,
        participant: &Arc<Participant>,
    ) {
        loop {
            let message = match timeout(self.state.read_deadline, ws_rx.next()).await {
                Err(_) => {
                    warn!(
                        "Session {} exceeded the {:?} read deadline",
                        participant.id, self.state.read_deadline
                    );
                    return;
                }
                Ok(None) => {
                    debug!("Session {} stream ended", participant.id);
                    return;
                }
                Ok(Some(Err(e))) => {
                    debug!("Session {} read failed: {}", participant.id, e);
                    return;
                }
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => {
                    self.state.metrics.record_frame_received();
                    self.dispatch(participant, text.as_str());
                }
                Message::Close(_) => {
                    debug!("Session {} closed by the client", participant.id);
                    return;
                }
                // The transport answers pings itself; both directions of
                // keepalive traffic only serve to reset the deadline above.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    debug!("Session {} sent a binary frame, ignoring", participant.id);
                }
            }
        }
    }

    /// Dispatch one inbound text frame.
    ///
    /// Control commands act on the queues or the participant itself; any
    /// other frame is room payload when bound and dropped silently when not.
    pub fn dispatch(&self, participant: &Arc<Participant>, frame: &str) {
        match ClientCommand::parse(frame) {
            Some(ClientCommand::Ping) => {
                self.reply(participant, FRAME_PONG.to_string());
            }
            Some(ClientCommand::SetUsername { name }) => {
                if let Err(e) = participant.set_display_name(&name) {
                    warn!("Session {} failed to set name: {}", participant.id, e);
                } else {
                    debug!("Session {} set name to {:?}", participant.id, name);
                }
            }
            Some(ClientCommand::RequestMatch { role }) => {
                if participant.room_id().is_some() {
                    debug!(
                        "Session {} requested a match while in a room, ignoring",
                        participant.id
                    );
                    return;
                }
                match self.state.queues.enqueue(Arc::clone(participant), role) {
                    Ok(EnqueueOutcome::Queued(role)) => {
                        self.state.metrics.record_enqueue(role);
                        info!("Session {} queued as {}", participant.id, role);
                        self.reply(participant, match_queued(role));
                    }
                    Ok(EnqueueOutcome::AlreadyQueued(role)) => {
                        self.reply(participant, match_queued(role));
                    }
                    Ok(EnqueueOutcome::Full) => {
                        self.state.metrics.record_enqueue_rejected(role);
                        warn!("Queue {} full, rejecting session {}", role, participant.id);
                        self.reply(participant, FRAME_MATCH_QUEUE_FULL.to_string());
                    }
                    Err(e) => {
                        warn!("Enqueue failed for session {}: {}", participant.id, e);
                    }
                }
            }
            Some(ClientCommand::InvalidRole { token }) => {
                debug!(
                    "Session {} requested unknown role {:?}",
                    participant.id, token
                );
                self.reply(participant, FRAME_INVALID_ROLE.to_string());
            }
            None => {
                if participant.room_id().is_some() {
                    match self.state.registry.relay(participant, frame) {
                        Ok(RelayOutcome::SubstitutedPrompt) => {
                            // Payloads carry SENDER|MESSAGE; only the message
                            // field goes to the responder. The call runs on
                            // its own task, off this pump and off the
                            // registry lock.
                            if let Some(prompt) = prompt_segment(frame) {
                                self.state
                                    .substitution
                                    .spawn_reply(Arc::clone(participant), prompt.to_string());
                            } else {
                                debug!(
                                    "Session {} payload had no message field, no prompt",
                                    participant.id
                                );
                            }
                        }
                        Ok(RelayOutcome::ForwardedToPeer) | Ok(RelayOutcome::Dropped) => {}
                        Err(e) => {
                            warn!("Relay failed for session {}: {}", participant.id, e);
                        }
                    }
                } else {
                    // Unbound and not a control command: defined to drop.
                    debug!("Session {} sent an unrecognized frame, dropped", participant.id);
                    self.state.metrics.record_frame_ignored();
                }
            }
        }
    }

    /// Run the teardown sequence for a finished session.
    ///
    /// Ordering matters: the liveness flag falls first so the engine stops
    /// considering this participant, then any queue entry goes, then the
    /// bound room (if one exists) is torn down.
    pub fn disconnect(&self, participant: &Arc<Participant>) {
        if !participant.set_disconnected() {
            return;
        }

        match self.state.queues.remove(participant.id) {
            Ok(Some(role)) => {
                debug!("Removed session {} from the {} queue", participant.id, role)
            }
            Ok(None) => {}
            Err(e) => warn!("Queue removal failed for {}: {}", participant.id, e),
        }

        match self.state.registry.teardown(participant) {
            Ok(Some(room_id)) => {
                debug!("Session {} teardown removed room {}", participant.id, room_id)
            }
            Ok(None) => {}
            Err(e) => warn!("Teardown failed for {}: {}", participant.id, e),
        }

        let session = (crate::utils::current_timestamp() - participant.joined_at)
            .to_std()
            .unwrap_or_default();
        self.state.metrics.record_connection_closed(session);
        info!("Session {} closed", participant.id);
    }

    /// Non-blocking push of a control reply into the participant's sink.
    fn reply(&self, participant: &Participant, frame: String) {
        if let Err(e) = participant.try_send(frame) {
            warn!("Dropping reply for session {}: {}", participant.id, e);
        }
    }
}

/// Outbound loop: drain the sink into the socket, pinging after an idle
/// heartbeat interval. A closed sink sends a close frame; a failed write
/// stops the loop and lets the read side discover the broken connection.
async fn write_pump(
    mut ws_tx: impl Sink<Message, Error = axum::Error> + Unpin,
    mut outbound_rx: mpsc::Receiver<String>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = interval_at(
        Instant::now() + heartbeat_interval,
        heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            item = outbound_rx.recv() => match item {
                Some(frame) => {
                    if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                        debug!("Outbound write failed, stopping writer");
                        return;
                    }
                    // Application traffic counts as liveness.
                    heartbeat.reset();
                }
                None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    debug!("Outbound sink closed, sent close frame");
                    return;
                }
            },
            _ = heartbeat.tick() => {
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    debug!("Heartbeat ping failed, stopping writer");
                    return;
                }
            }
        }
    }
}
