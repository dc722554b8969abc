//! Test fixtures and simulated clients for integration testing

use mimic_room::matchmaker::{MatchmakingEngine, QueuePair, SubstitutionPolicy};
use mimic_room::metrics::MetricsCollector;
use mimic_room::responder::MockReplyProvider;
use mimic_room::room::RoomRegistry;
use mimic_room::session::pump::{SessionPump, SessionState};
use mimic_room::types::Participant;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// A complete in-process system: real queues, registry, substitution
/// policy and matching loop, with a mock responder standing in for the
/// HTTP provider.
pub struct TestSystem {
    pub pump: SessionPump,
    pub engine: Arc<MatchmakingEngine>,
    pub queues: Arc<QueuePair>,
    pub registry: Arc<RoomRegistry>,
    pub provider: Arc<MockReplyProvider>,
    loop_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// A simulated connection: the participant handle plus the receiving
/// end of its outbound sink.
pub struct TestClient {
    pub participant: Arc<Participant>,
    rx: mpsc::Receiver<String>,
}

impl TestClient {
    /// Wait for the next outbound frame.
    pub async fn next_frame(&mut self, wait: Duration) -> Option<String> {
        timeout(wait, self.rx.recv()).await.ok().flatten()
    }

    /// Wait for a frame whose command field matches, discarding others.
    pub async fn expect_frame(&mut self, prefix: &str) -> String {
        let wait = Duration::from_secs(2);
        loop {
            match self.next_frame(wait).await {
                Some(frame)
                    if frame == prefix || frame.starts_with(&format!("{}|", prefix)) =>
                {
                    return frame;
                }
                Some(_) => continue,
                None => panic!("No '{}' frame arrived within {:?}", prefix, wait),
            }
        }
    }

    /// Everything currently buffered on the sink.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

impl TestSystem {
    /// Build a system with the given substitution rate and peer wait.
    pub fn new(substitution_rate: u8, peer_wait: Duration) -> Self {
        Self::with_capacity(substitution_rate, peer_wait, 64)
    }

    /// Build a system with an explicit queue capacity.
    pub fn with_capacity(
        substitution_rate: u8,
        peer_wait: Duration,
        queue_capacity: usize,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new().expect("metrics collector"));
        let queues = Arc::new(QueuePair::new(queue_capacity));
        let registry = Arc::new(RoomRegistry::with_metrics(metrics.clone()));
        let provider = Arc::new(MockReplyProvider::with_reply("synthetic line"));
        let substitution = Arc::new(SubstitutionPolicy::with_metrics(
            substitution_rate,
            provider.clone(),
            metrics.clone(),
        ));
        let engine = Arc::new(MatchmakingEngine::with_metrics(
            queues.clone(),
            registry.clone(),
            substitution.clone(),
            peer_wait,
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

        Self {
            pump: SessionPump::new(state),
            engine,
            queues,
            registry,
            provider,
            loop_task: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the matching loop.
    pub fn start_matching(&self) {
        let engine = self.engine.clone();
        let task = tokio::spawn(async move {
            engine.run().await;
        });
        if let Ok(mut slot) = self.loop_task.lock() {
            *slot = Some(task);
        }
    }

    /// Simulate a new connection.
    pub fn connect(&self) -> TestClient {
        let (tx, rx) = mpsc::channel(64);
        TestClient {
            participant: Participant::new(tx),
            rx,
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
}

impl Drop for TestSystem {
    fn drop(&mut self) {
        self.engine.stop();
        if let Ok(mut slot) = self.loop_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}
