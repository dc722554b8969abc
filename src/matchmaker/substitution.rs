//! Probabilistic peer substitution
//!
//! When a second participant arrives for a pairing, a crypto-random draw
//! decides whether the first participant is paired with the synthetic
//! responder instead. This module owns that draw and the responder relay
//! path used by substituted rooms.

use crate::metrics::MetricsCollector;
use crate::protocol::ai_reply;
use crate::responder::ReplyProvider;
use crate::types::Participant;
use crate::utils::truncate_for_log;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Statistics for substitution decisions and responder relays
#[derive(Debug, Clone, Default)]
pub struct SubstitutionStats {
    pub draws: u64,
    pub substitutions: u64,
    pub replies_generated: u64,
    pub replies_failed: u64,
    pub last_substitution: Option<DateTime<Utc>>,
}

/// Decides substitution and relays prompts to the reply provider.
///
/// The provider call always runs on its own task: neither the matching
/// loop nor any registry lock is ever held across it.
pub struct SubstitutionPolicy {
    rate: u8,
    provider: Arc<dyn ReplyProvider>,
    stats: Arc<RwLock<SubstitutionStats>>,
    metrics: Arc<MetricsCollector>,
}

impl SubstitutionPolicy {
    /// Create a policy with its own metrics collector.
    ///
    /// `rate` is a percentage in `[0, 100]`: 0 never substitutes and 100
    /// always does.
    pub fn new(rate: u8, provider: Arc<dyn ReplyProvider>) -> Self {
        let metrics = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));
        Self::with_metrics(rate, provider, metrics)
    }

    /// Create a policy reporting into a shared metrics collector.
    pub fn with_metrics(
        rate: u8,
        provider: Arc<dyn ReplyProvider>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            rate,
            provider,
            stats: Arc::new(RwLock::new(SubstitutionStats::default())),
            metrics,
        }
    }

    /// Configured substitution percentage.
    pub fn rate(&self) -> u8 {
        self.rate
    }

    /// Draw a fresh percentage from the OS entropy source.
    fn draw_percent() -> u8 {
        OsRng.gen_range(0..100)
    }

    /// Decide whether the pairing at hand gets substituted.
    ///
    /// Each call is an independent draw; `draw < rate` substitutes, so the
    /// boundary rates are exact: 0 never fires and 100 always does.
    pub fn should_substitute(&self) -> bool {
        let draw = Self::draw_percent();
        let substituted = draw < self.rate;
        if let Ok(mut stats) = self.stats.write() {
            stats.draws += 1;
            if substituted {
                stats.substitutions += 1;
                stats.last_substitution = Some(Utc::now());
            }
        }
        self.metrics.record_substitution_draw(substituted);
        debug!(
            "Substitution draw {} against rate {}: {}",
            draw,
            self.rate,
            if substituted { "substituted" } else { "human pair" }
        );
        substituted
    }

    /// Relay a prompt from a substituted room to the reply provider.
    ///
    /// Runs on a spawned task. A successful reply is pushed into the
    /// participant's sink as an `AI` frame; provider failures are logged
    /// and swallowed, so the participant simply receives no reply.
    pub fn spawn_reply(&self, participant: Arc<Participant>, prompt: String) -> JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        let stats = Arc::clone(&self.stats);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            let started = Instant::now();
            match provider.generate_reply(&prompt).await {
                Ok(reply) => {
                    let elapsed = started.elapsed();
                    if let Ok(mut stats) = stats.write() {
                        stats.replies_generated += 1;
                    }
                    metrics.record_responder_reply(elapsed);
                    debug!(
                        "Responder replied to {} in {:?} ({})",
                        participant.id,
                        elapsed,
                        truncate_for_log(&reply, 48)
                    );
                    if let Err(e) = participant.try_send(ai_reply(&reply)) {
                        warn!("Dropping responder reply for {}: {}", participant.id, e);
                    }
                }
                Err(e) => {
                    if let Ok(mut stats) = stats.write() {
                        stats.replies_failed += 1;
                    }
                    metrics.record_responder_failure();
                    warn!("Responder failed for {}: {}", participant.id, e);
                }
            }
        })
    }

    /// Snapshot of substitution counters.
    pub fn stats(&self) -> SubstitutionStats {
        self.stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::MockReplyProvider;
    use tokio::sync::mpsc;

    fn wired_participant() -> (Arc<Participant>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (Participant::new(tx), rx)
    }

    #[test]
    fn test_rate_zero_never_substitutes() {
        let policy = SubstitutionPolicy::new(0, Arc::new(MockReplyProvider::new()));
        for _ in 0..100 {
            assert!(!policy.should_substitute());
        }
        let stats = policy.stats();
        assert_eq!(stats.draws, 100);
        assert_eq!(stats.substitutions, 0);
    }

    #[test]
    fn test_rate_hundred_always_substitutes() {
        let policy = SubstitutionPolicy::new(100, Arc::new(MockReplyProvider::new()));
        for _ in 0..100 {
            assert!(policy.should_substitute());
        }
        let stats = policy.stats();
        assert_eq!(stats.draws, 100);
        assert_eq!(stats.substitutions, 100);
        assert!(stats.last_substitution.is_some());
    }

    #[test]
    fn test_draws_stay_in_range() {
        for _ in 0..1000 {
            assert!(SubstitutionPolicy::draw_percent() < 100);
        }
    }

    #[tokio::test]
    async fn test_reply_delivered_as_ai_frame() {
        let provider = Arc::new(MockReplyProvider::with_reply("certainly human"));
        let policy = SubstitutionPolicy::new(100, provider.clone());
        let (participant, mut rx) = wired_participant();

        policy
            .spawn_reply(participant, "are you a robot".to_string())
            .await
            .unwrap();

        assert_eq!(rx.try_recv().unwrap(), "AI|certainly human");
        assert_eq!(
            provider.seen_prompts(),
            vec!["are you a robot".to_string()]
        );
        assert_eq!(policy.stats().replies_generated, 1);
    }

    #[tokio::test]
    async fn test_provider_failure_is_swallowed() {
        let policy = SubstitutionPolicy::new(100, Arc::new(MockReplyProvider::failing()));
        let (participant, mut rx) = wired_participant();

        policy
            .spawn_reply(participant, "hello".to_string())
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(policy.stats().replies_failed, 1);
    }

    #[tokio::test]
    async fn test_saturated_sink_drops_reply() {
        let provider = Arc::new(MockReplyProvider::with_reply("overflow"));
        let policy = SubstitutionPolicy::new(100, provider);
        let (tx, _rx) = mpsc::channel(1);
        let participant = Participant::new(tx);
        participant.try_send("occupied".to_string()).unwrap();

        policy
            .spawn_reply(participant, "prompt".to_string())
            .await
            .unwrap();

        // The reply was generated but could not be delivered.
        assert_eq!(policy.stats().replies_generated, 1);
    }
}
