//! Matchmaking engine
//!
//! Single consumer of the role queues. Each cycle pulls one waiting
//! participant, waits a bounded window for a complementary peer, applies
//! the substitution draw and registers the resulting room. Every outbound
//! notification uses non-blocking sends, so a stalled client can never
//! stall matching.

use crate::error::Result;
use crate::matchmaker::queues::QueuePair;
use crate::matchmaker::substitution::SubstitutionPolicy;
use crate::metrics::MetricsCollector;
use crate::protocol::{match_success, FRAME_MATCH_TIMEOUT};
use crate::room::{PairingOutcome, RoomRegistry};
use crate::types::{Participant, Role, RoomId, RoomKind};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Terminal outcome of one matching cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A room was registered and the participants notified.
    Matched { room_id: RoomId, kind: RoomKind },
    /// The wait window closed without a live peer.
    TimedOut,
    /// Everyone pulled this cycle had already disconnected.
    Abandoned,
}

/// Counters describing engine activity since startup
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub cycles: u64,
    pub human_matches: u64,
    pub substituted_matches: u64,
    pub timeouts: u64,
    pub discarded_disconnected: u64,
    pub last_cycle: Option<DateTime<Utc>>,
}

/// The matching loop and its collaborators.
pub struct MatchmakingEngine {
    queues: Arc<QueuePair>,
    registry: Arc<RoomRegistry>,
    substitution: Arc<SubstitutionPolicy>,
    peer_wait: Duration,
    stats: Arc<RwLock<EngineStats>>,
    metrics: Arc<MetricsCollector>,
    is_running: AtomicBool,
}

impl MatchmakingEngine {
    /// Create an engine with its own metrics collector.
    pub fn new(
        queues: Arc<QueuePair>,
        registry: Arc<RoomRegistry>,
        substitution: Arc<SubstitutionPolicy>,
        peer_wait: Duration,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));
        Self::with_metrics(queues, registry, substitution, peer_wait, metrics)
    }

    /// Create an engine reporting into a shared metrics collector.
    pub fn with_metrics(
        queues: Arc<QueuePair>,
        registry: Arc<RoomRegistry>,
        substitution: Arc<SubstitutionPolicy>,
        peer_wait: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            queues,
            registry,
            substitution,
            peer_wait,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            metrics,
            is_running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Ask the loop to stop after its current cycle.
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::Release);
    }

    /// Run matching cycles until stopped.
    pub async fn run(&self) {
        self.is_running.store(true, Ordering::Release);
        info!(
            "Matchmaking engine started (peer wait {:?}, substitution rate {}%)",
            self.peer_wait,
            self.substitution.rate()
        );
        while self.is_running() {
            match self.match_one().await {
                Ok(outcome) => debug!("Matching cycle finished: {:?}", outcome),
                Err(e) => {
                    error!("Matching cycle failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        info!("Matchmaking engine stopped");
    }

    /// Resolve one waiting participant to a terminal outcome.
    pub async fn match_one(&self) -> Result<CycleOutcome> {
        let (mut first, mut first_role) = self.queues.next_waiting().await?;
        self.touch_cycle();
        self.update_depth_gauges();

        if !first.is_connected() {
            debug!(
                "Discarding disconnected {} from the {} queue",
                first.id, first_role
            );
            self.note_discard();
            return Ok(CycleOutcome::Abandoned);
        }

        let mut deadline = Instant::now() + self.peer_wait;
        let mut wait_started = Instant::now();

        loop {
            let complement = self.queues.queue(first_role.complement());
            let second = match timeout_at(deadline, complement.pop_wait()).await {
                Ok(popped) => popped?,
                Err(_) => {
                    if first.is_connected() {
                        info!(
                            "No peer arrived for {} ({}) within {:?}",
                            first.id, first_role, self.peer_wait
                        );
                        if let Err(e) = first.try_send(FRAME_MATCH_TIMEOUT.to_string()) {
                            warn!("Dropping timeout notice for {}: {}", first.id, e);
                        }
                    } else {
                        debug!("Wait window closed after {} disconnected", first.id);
                    }
                    self.note_timeout();
                    self.metrics.record_match_timeout();
                    return Ok(CycleOutcome::TimedOut);
                }
            };
            self.update_depth_gauges();

            if !second.is_connected() {
                debug!(
                    "Discarding disconnected {} from the {} queue",
                    second.id,
                    first_role.complement()
                );
                self.note_discard();
                continue;
            }

            if self.substitution.should_substitute() {
                // The displaced peer keeps its place at the head of its queue.
                self.queues
                    .requeue_displaced(second.clone(), first_role.complement())?;
                match self.registry.create_room(
                    first.clone(),
                    Participant::synthetic(),
                    RoomKind::SubstitutedPair,
                )? {
                    PairingOutcome::Registered(room_id) => {
                        if let Err(e) =
                            first.try_send(match_success(&room_id, RoomKind::SubstitutedPair))
                        {
                            warn!("Dropping match notice for {}: {}", first.id, e);
                        }
                        self.note_match(RoomKind::SubstitutedPair);
                        self.metrics
                            .record_match_created(RoomKind::SubstitutedPair, wait_started.elapsed());
                        info!(
                            "Matched {} ({}) with the synthetic responder in room {}",
                            first.id, first_role, room_id
                        );
                        return Ok(CycleOutcome::Matched {
                            room_id,
                            kind: RoomKind::SubstitutedPair,
                        });
                    }
                    PairingOutcome::SlotUnavailable(_) => {
                        // First vanished between the draw and the registration.
                        // The displaced peer is already back at its queue head.
                        debug!("{} unavailable before room registration", first.id);
                        self.note_discard();
                        return Ok(CycleOutcome::Abandoned);
                    }
                }
            }

            match self
                .registry
                .create_room(first.clone(), second.clone(), RoomKind::HumanPair)?
            {
                PairingOutcome::Registered(room_id) => {
                    for participant in [&first, &second] {
                        if let Err(e) =
                            participant.try_send(match_success(&room_id, RoomKind::HumanPair))
                        {
                            warn!("Dropping match notice for {}: {}", participant.id, e);
                        }
                    }
                    self.note_match(RoomKind::HumanPair);
                    self.metrics
                        .record_match_created(RoomKind::HumanPair, wait_started.elapsed());
                    info!(
                        "Matched {} ({}) with {} ({}) in room {}",
                        first.id,
                        first_role,
                        second.id,
                        first_role.complement(),
                        room_id
                    );
                    return Ok(CycleOutcome::Matched {
                        room_id,
                        kind: RoomKind::HumanPair,
                    });
                }
                PairingOutcome::SlotUnavailable(0) => {
                    // The survivor takes over as first with a fresh window.
                    debug!(
                        "{} unavailable during pairing, {} takes over",
                        first.id, second.id
                    );
                    self.note_discard();
                    first = second;
                    first_role = first_role.complement();
                    deadline = Instant::now() + self.peer_wait;
                    wait_started = Instant::now();
                }
                PairingOutcome::SlotUnavailable(_) => {
                    debug!(
                        "{} unavailable during pairing, {} keeps waiting",
                        second.id, first.id
                    );
                    self.note_discard();
                }
            }
        }
    }

    /// Snapshot of engine counters.
    pub fn stats(&self) -> EngineStats {
        self.stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    fn touch_cycle(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.cycles += 1;
            stats.last_cycle = Some(Utc::now());
        }
    }

    fn note_match(&self, kind: RoomKind) {
        if let Ok(mut stats) = self.stats.write() {
            match kind {
                RoomKind::HumanPair => stats.human_matches += 1,
                RoomKind::SubstitutedPair => stats.substituted_matches += 1,
            }
        }
    }

    fn note_timeout(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.timeouts += 1;
        }
    }

    fn note_discard(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.discarded_disconnected += 1;
        }
    }

    fn update_depth_gauges(&self) {
        let (guessers, mimics) = self.queues.depths();
        self.metrics.set_queue_depth(Role::Guesser, guessers);
        self.metrics.set_queue_depth(Role::Mimic, mimics);
    }
}
