//! Role queues for waiting participants
//!
//! Each matchmaking role has one bounded FIFO. Admission is non-blocking,
//! removal by participant id supports disconnects while queued, and the
//! matching loop waits on either queue through [`QueuePair::next_waiting`].

use crate::error::{MatchError, Result};
use crate::types::{Participant, ParticipantId, Role};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::debug;

/// Outcome of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Newly admitted to the queue for this role
    Queued(Role),
    /// Already waiting; carries the role the participant is actually queued under
    AlreadyQueued(Role),
    /// Queue at capacity, not admitted
    Full,
}

/// A bounded FIFO of participants waiting under one role
pub struct RoleQueue {
    role: Role,
    capacity: usize,
    waiting: Mutex<VecDeque<Arc<Participant>>>,
    notify: Notify,
}

impl RoleQueue {
    pub fn new(role: Role, capacity: usize) -> Self {
        Self {
            role,
            capacity,
            waiting: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Current number of waiting participants
    pub fn depth(&self) -> usize {
        self.waiting
            .lock()
            .map(|waiting| waiting.len())
            .unwrap_or_default()
    }

    /// Non-blocking admission; returns false when the queue is at capacity
    pub fn try_push(&self, participant: Arc<Participant>) -> Result<bool> {
        let mut waiting = self
            .waiting
            .lock()
            .map_err(|_| MatchError::InternalError {
                message: "Failed to acquire queue lock".to_string(),
            })?;

        if waiting.len() >= self.capacity {
            return Ok(false);
        }

        waiting.push_back(participant);
        drop(waiting);

        self.notify.notify_one();
        Ok(true)
    }

    /// Return a displaced participant to the head of its queue.
    ///
    /// Displaced participants are never dropped, so this bypasses the
    /// capacity check; depth may transiently overshoot by one.
    pub fn push_front(&self, participant: Arc<Participant>) -> Result<()> {
        let mut waiting = self
            .waiting
            .lock()
            .map_err(|_| MatchError::InternalError {
                message: "Failed to acquire queue lock".to_string(),
            })?;

        waiting.push_front(participant);
        drop(waiting);

        self.notify.notify_one();
        Ok(())
    }

    /// Pop the next waiting participant, if any
    pub fn try_pop(&self) -> Result<Option<Arc<Participant>>> {
        let mut waiting = self
            .waiting
            .lock()
            .map_err(|_| MatchError::InternalError {
                message: "Failed to acquire queue lock".to_string(),
            })?;

        Ok(waiting.pop_front())
    }

    /// Whether the participant is currently waiting in this queue
    pub fn contains(&self, participant_id: ParticipantId) -> Result<bool> {
        let waiting = self
            .waiting
            .lock()
            .map_err(|_| MatchError::InternalError {
                message: "Failed to acquire queue lock".to_string(),
            })?;

        Ok(waiting.iter().any(|p| p.id == participant_id))
    }

    /// Remove a participant by id (disconnect while queued)
    pub fn remove(&self, participant_id: ParticipantId) -> Result<bool> {
        let mut waiting = self
            .waiting
            .lock()
            .map_err(|_| MatchError::InternalError {
                message: "Failed to acquire queue lock".to_string(),
            })?;

        let before = waiting.len();
        waiting.retain(|p| p.id != participant_id);
        Ok(waiting.len() != before)
    }

    /// Wait until a participant can be popped from this queue.
    ///
    /// Single consumer: only the matching loop pops. A notification permit
    /// survives an un-awaited wakeup, so pushes are never lost.
    pub async fn pop_wait(&self) -> Result<Arc<Participant>> {
        loop {
            let notified = self.notify.notified();
            if let Some(participant) = self.try_pop()? {
                return Ok(participant);
            }
            notified.await;
        }
    }
}

/// Both role queues plus the round-robin pull preference of the matching loop
pub struct QueuePair {
    guesser: RoleQueue,
    mimic: RoleQueue,
    prefer_guesser: AtomicBool,
}

impl QueuePair {
    pub fn new(capacity: usize) -> Self {
        Self {
            guesser: RoleQueue::new(Role::Guesser, capacity),
            mimic: RoleQueue::new(Role::Mimic, capacity),
            prefer_guesser: AtomicBool::new(true),
        }
    }

    pub fn queue(&self, role: Role) -> &RoleQueue {
        match role {
            Role::Guesser => &self.guesser,
            Role::Mimic => &self.mimic,
        }
    }

    /// Current depth of each queue, (guesser, mimic)
    pub fn depths(&self) -> (usize, usize) {
        (self.guesser.depth(), self.mimic.depth())
    }

    /// Enqueue a participant for a role.
    ///
    /// A participant already waiting in either queue is not admitted again;
    /// the pump dispatches frames one at a time, so a participant cannot
    /// race its own enqueues and the at-most-one-queue invariant holds.
    pub fn enqueue(&self, participant: Arc<Participant>, role: Role) -> Result<EnqueueOutcome> {
        for queue in [&self.guesser, &self.mimic] {
            if queue.contains(participant.id)? {
                debug!(
                    "Participant {} already queued as {}, ignoring re-request",
                    participant.id,
                    queue.role()
                );
                return Ok(EnqueueOutcome::AlreadyQueued(queue.role()));
            }
        }

        if self.queue(role).try_push(participant)? {
            Ok(EnqueueOutcome::Queued(role))
        } else {
            Ok(EnqueueOutcome::Full)
        }
    }

    /// Remove a participant from whichever queue holds it
    pub fn remove(&self, participant_id: ParticipantId) -> Result<Option<Role>> {
        if self.guesser.remove(participant_id)? {
            return Ok(Some(Role::Guesser));
        }
        if self.mimic.remove(participant_id)? {
            return Ok(Some(Role::Mimic));
        }
        Ok(None)
    }

    /// Return a displaced participant to the head of its origin queue
    pub fn requeue_displaced(&self, participant: Arc<Participant>, role: Role) -> Result<()> {
        if !participant.is_connected() {
            debug!(
                "Displaced participant {} already disconnected, not requeueing",
                participant.id
            );
            return Ok(());
        }
        self.queue(role).push_front(participant)
    }

    /// Wait for the next waiting participant from either queue.
    ///
    /// When both queues hold waiters the starting preference alternates
    /// between them, so neither role starves.
    pub async fn next_waiting(&self) -> Result<(Arc<Participant>, Role)> {
        loop {
            let guesser_notified = self.guesser.notify.notified();
            let mimic_notified = self.mimic.notify.notified();

            let (first, second) = if self.prefer_guesser.load(Ordering::Acquire) {
                (&self.guesser, &self.mimic)
            } else {
                (&self.mimic, &self.guesser)
            };

            for queue in [first, second] {
                if let Some(participant) = queue.try_pop()? {
                    // Pulled from this role; prefer the other one next time
                    self.prefer_guesser
                        .store(queue.role() != Role::Guesser, Ordering::Release);
                    return Ok((participant, queue.role()));
                }
            }

            tokio::select! {
                _ = guesser_notified => {}
                _ = mimic_notified => {}
            }
        }
    }
}
