//! Relay Testing Tool and Test Suite
//!
//! This module provides utilities to exercise the matchmaking relay
//! end to end without a network: simulated clients drive the session
//! dispatch path directly, the real matching loop runs in the background
//! and every frame a client would receive is captured on its sink.
//!
//! Run with: `cargo test ws_tester`
//! Or use the CLI tool: `cargo run --bin ws-tester`

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use mimic_room::matchmaker::{MatchmakingEngine, QueuePair, SubstitutionPolicy};
use mimic_room::metrics::MetricsCollector;
use mimic_room::responder::MockReplyProvider;
use mimic_room::room::RoomRegistry;
use mimic_room::session::pump::{SessionPump, SessionState};
use mimic_room::types::Participant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::info;

/// A simulated client: its participant handle plus the receiving end of
/// the sink the service writes to.
pub struct TestClient {
    pub name: String,
    pub participant: Arc<Participant>,
    outbound_rx: mpsc::Receiver<String>,
}

impl TestClient {
    /// Wait for the next frame the service sent this client.
    pub async fn recv(&mut self, wait: Duration) -> anyhow::Result<String> {
        timeout(wait, self.outbound_rx.recv())
            .await
            .with_context(|| format!("'{}' received no frame within {:?}", self.name, wait))?
            .with_context(|| format!("'{}' sink closed", self.name))
    }

    /// Wait for a frame starting with the given command name, discarding
    /// anything else that arrives first.
    pub async fn recv_expect(&mut self, prefix: &str, wait: Duration) -> anyhow::Result<String> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let frame = self.recv(remaining).await.with_context(|| {
                format!("'{}' never received a '{}' frame", self.name, prefix)
            })?;
            if frame == prefix || frame.starts_with(&format!("{}|", prefix)) {
                return Ok(frame);
            }
        }
    }

    /// Drain every frame currently buffered on the sink.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound_rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Relay tester that runs the full matchmaking stack in-process and
/// simulates clients against the session dispatch path.
pub struct RelayTester {
    pump: SessionPump,
    engine: Arc<MatchmakingEngine>,
    provider: Arc<MockReplyProvider>,
    queues: Arc<QueuePair>,
    registry: Arc<RoomRegistry>,
    loop_task: Option<JoinHandle<()>>,
}

/// Tuning for a tester instance
#[derive(Debug, Clone)]
pub struct TesterConfig {
    /// Synthetic-peer substitution rate in percent
    pub substitution_rate: u8,
    /// How long the loop holds a lone participant before timing out
    pub peer_wait: Duration,
    /// Role queue capacity
    pub queue_capacity: usize,
    /// Fixed line the mock responder answers with
    pub mock_reply: String,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            substitution_rate: 0,
            peer_wait: Duration::from_secs(30),
            queue_capacity: 64,
            mock_reply: "the mimic speaks".to_string(),
        }
    }
}

impl RelayTester {
    /// Build the full stack with the given tuning. The matching loop is
    /// not running until [`start_matching`](Self::start_matching).
    pub fn new(config: TesterConfig) -> anyhow::Result<Self> {
        let metrics = Arc::new(
            MetricsCollector::new().context("Failed to create metrics collector")?,
        );
        let queues = Arc::new(QueuePair::new(config.queue_capacity));
        let registry = Arc::new(RoomRegistry::with_metrics(metrics.clone()));
        let provider = Arc::new(MockReplyProvider::with_reply(&config.mock_reply));
        let substitution = Arc::new(SubstitutionPolicy::with_metrics(
            config.substitution_rate,
            provider.clone(),
            metrics.clone(),
        ));
        let engine = Arc::new(MatchmakingEngine::with_metrics(
            queues.clone(),
            registry.clone(),
            substitution.clone(),
            config.peer_wait,
            metrics.clone(),
        ));

        let state = SessionState {
            queues: queues.clone(),
            registry: registry.clone(),
            substitution,
            metrics,
            sink_capacity: 64,
            heartbeat_interval: Duration::from_secs(50),
            read_deadline: Duration::from_secs(60),
        };

        info!("✅ Relay tester initialized");
        Ok(Self {
            pump: SessionPump::new(state),
            engine,
            provider,
            queues,
            registry,
            loop_task: None,
        })
    }

    /// Spawn the matching loop in the background.
    pub fn start_matching(&mut self) {
        let engine = self.engine.clone();
        self.loop_task = Some(tokio::spawn(async move {
            engine.run().await;
        }));
    }

    /// Stop the matching loop.
    pub fn stop_matching(&mut self) {
        self.engine.stop();
        if let Some(task) = self.loop_task.take() {
            task.abort();
        }
    }

    /// Simulate a new connection.
    pub fn connect(&self, name: &str) -> TestClient {
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let participant = Participant::new(outbound_tx);
        info!("Client '{}' connected as session {}", name, participant.id);
        TestClient {
            name: name.to_string(),
            participant,
            outbound_rx,
        }
    }

    /// Deliver one inbound frame from a client.
    pub fn send(&self, client: &TestClient, frame: &str) {
        self.pump.dispatch(&client.participant, frame);
    }

    /// Simulate the client's socket going away.
    pub fn disconnect(&self, client: &TestClient) {
        self.pump.disconnect(&client.participant);
    }

    /// Current queue depths (guessers, mimics).
    pub fn queue_depths(&self) -> (usize, usize) {
        self.queues.depths()
    }

    /// Number of rooms currently registered.
    pub fn active_rooms(&self) -> usize {
        self.registry.active_rooms()
    }

    /// Prompts the mock responder has been asked to answer.
    pub fn responder_prompts(&self) -> Vec<String> {
        self.provider.seen_prompts()
    }
}

impl Drop for RelayTester {
    fn drop(&mut self) {
        self.stop_matching();
    }
}

/// Pre-defined end-to-end scenarios for the CLI tool and the test suite.
pub struct TestScenarios;

/// How long scenarios wait for an expected frame
const RECV_WAIT: Duration = Duration::from_secs(2);

impl TestScenarios {
    /// Two humans pair up, exchange frames through the relay, and one of
    /// them disconnecting notifies the other exactly once.
    pub async fn human_pair() -> anyhow::Result<bool> {
        let mut tester = RelayTester::new(TesterConfig::default())?;
        tester.start_matching();

        let mut alice = tester.connect("alice");
        let mut bob = tester.connect("bob");

        tester.send(&alice, "SET_USERNAME|Alice");
        tester.send(&bob, "SET_USERNAME|Bob");
        tester.send(&alice, "REQUEST_MATCH|GUESSER");
        tester.send(&bob, "REQUEST_MATCH|MIMIC");

        let queued = alice.recv_expect("MATCH_QUEUED", RECV_WAIT).await?;
        println!("✅ alice <- {}", queued);

        let success_a = alice.recv_expect("MATCH_SUCCESS", RECV_WAIT).await?;
        let success_b = bob.recv_expect("MATCH_SUCCESS", RECV_WAIT).await?;
        println!("✅ alice <- {}", success_a);
        println!("✅ bob   <- {}", success_b);

        let fields_a: Vec<&str> = success_a.split('|').collect();
        let fields_b: Vec<&str> = success_b.split('|').collect();
        if fields_a[1] != fields_b[1] {
            println!("❌ Room ids differ: {} vs {}", fields_a[1], fields_b[1]);
            return Ok(false);
        }
        if fields_a[2] != "1" {
            println!("❌ Expected a human pair (kind 1), got kind {}", fields_a[2]);
            return Ok(false);
        }

        // Frames relay verbatim, including unrecognized ones.
        tester.send(&alice, "hello there|extra|fields");
        let relayed = bob.recv(RECV_WAIT).await?;
        println!("✅ bob   <- {}", relayed);
        if relayed != "hello there|extra|fields" {
            println!("❌ Relay altered the frame: {}", relayed);
            return Ok(false);
        }

        tester.send(&bob, "GUESS|Alice");
        let reply = alice.recv(RECV_WAIT).await?;
        println!("✅ alice <- {}", reply);

        tester.disconnect(&bob);
        let notice = alice.recv_expect("PLAYER_DISCONNECTED", RECV_WAIT).await?;
        println!("✅ alice <- {}", notice);

        if tester.active_rooms() != 0 {
            println!("❌ Room survived teardown");
            return Ok(false);
        }
        Ok(true)
    }

    /// With the substitution draw forced, a lone participant is paired
    /// with a synthetic peer and its prompts reach the mock responder.
    pub async fn forced_substitution() -> anyhow::Result<bool> {
        let mut tester = RelayTester::new(TesterConfig {
            substitution_rate: 100,
            ..Default::default()
        })?;
        tester.start_matching();

        let mut alice = tester.connect("alice");
        let mut bob = tester.connect("bob");

        tester.send(&alice, "REQUEST_MATCH|GUESSER");
        tester.send(&bob, "REQUEST_MATCH|MIMIC");

        let success = alice.recv_expect("MATCH_SUCCESS", RECV_WAIT).await?;
        println!("✅ alice <- {}", success);
        if !success.ends_with("|0") {
            println!("❌ Expected a substituted room (kind 0): {}", success);
            return Ok(false);
        }

        // The displaced participant is back at the queue front, unaware.
        let _ = bob.recv_expect("MATCH_QUEUED", RECV_WAIT).await?;
        if bob.participant.room_id().is_some() {
            println!("❌ Displaced participant kept a room binding");
            return Ok(false);
        }

        tester.send(&alice, "Alice|what's your favorite color?");
        let reply = alice.recv_expect("AI", Duration::from_secs(5)).await?;
        println!("✅ alice <- {}", reply);

        let prompts = tester.responder_prompts();
        if prompts != vec!["what's your favorite color?".to_string()] {
            println!("❌ Responder prompt was not the message field: {:?}", prompts);
            return Ok(false);
        }
        println!("✅ responder saw the message field only");
        Ok(true)
    }

    /// A participant whose peer never arrives is timed out exactly once
    /// and leaves the queue.
    pub async fn peer_wait_timeout() -> anyhow::Result<bool> {
        let mut tester = RelayTester::new(TesterConfig {
            peer_wait: Duration::from_millis(300),
            ..Default::default()
        })?;
        tester.start_matching();

        let mut alice = tester.connect("alice");
        tester.send(&alice, "REQUEST_MATCH|GUESSER");

        let queued = alice.recv_expect("MATCH_QUEUED", RECV_WAIT).await?;
        println!("✅ alice <- {}", queued);

        let notice = alice.recv_expect("MATCH_TIMEOUT", RECV_WAIT).await?;
        println!("✅ alice <- {}", notice);

        // No auto-requeue and no room.
        tokio::time::sleep(Duration::from_millis(100)).await;
        if tester.queue_depths() != (0, 0) {
            println!("❌ Timed-out participant still queued");
            return Ok(false);
        }
        if tester.active_rooms() != 0 {
            println!("❌ A room appeared out of a timeout");
            return Ok(false);
        }
        if !alice.drain().is_empty() {
            println!("❌ More than one frame followed the timeout");
            return Ok(false);
        }
        Ok(true)
    }

    /// Disconnecting while queued removes the entry; a second disconnect
    /// of the same session is a no-op.
    pub async fn queued_disconnect() -> anyhow::Result<bool> {
        let tester = RelayTester::new(TesterConfig::default())?;

        let mut alice = tester.connect("alice");
        tester.send(&alice, "REQUEST_MATCH|MIMIC");
        let _ = alice.recv_expect("MATCH_QUEUED", RECV_WAIT).await?;

        if tester.queue_depths() != (0, 1) {
            println!("❌ Enqueue did not land in the mimic queue");
            return Ok(false);
        }

        tester.disconnect(&alice);
        tester.disconnect(&alice);

        if tester.queue_depths() != (0, 0) {
            println!("❌ Disconnect left the queue entry behind");
            return Ok(false);
        }
        println!("✅ queue drained after disconnect");
        Ok(true)
    }
}

// ============================================================================
// AUTOMATED TEST SUITE
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scenario_human_pair() {
        let passed = TestScenarios::human_pair()
            .await
            .expect("Scenario errored");
        assert!(passed, "Human pair scenario should succeed");
    }

    #[tokio::test]
    async fn test_scenario_forced_substitution() {
        let passed = TestScenarios::forced_substitution()
            .await
            .expect("Scenario errored");
        assert!(passed, "Forced substitution scenario should succeed");
    }

    #[tokio::test]
    async fn test_scenario_peer_wait_timeout() {
        let passed = TestScenarios::peer_wait_timeout()
            .await
            .expect("Scenario errored");
        assert!(passed, "Timeout scenario should succeed");
    }

    #[tokio::test]
    async fn test_scenario_queued_disconnect() {
        let passed = TestScenarios::queued_disconnect()
            .await
            .expect("Scenario errored");
        assert!(passed, "Queued disconnect scenario should succeed");
    }

    #[tokio::test]
    async fn test_tester_client_lifecycle() {
        let tester = RelayTester::new(TesterConfig::default()).expect("tester");
        let mut client = tester.connect("probe");

        tester.send(&client, "PING");
        let pong = client.recv(Duration::from_secs(1)).await.expect("pong");
        assert_eq!(pong, "PONG");

        tester.disconnect(&client);
        assert_eq!(tester.queue_depths(), (0, 0));
    }
}
