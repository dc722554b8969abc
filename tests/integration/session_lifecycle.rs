//! Session lifecycle tests: dispatch, queueing rules and teardown
//!
//! These tests exercise the frame dispatch path of a session from first
//! PING through disconnect, against the real queues and registry.

use std::time::Duration;

use crate::fixtures::TestSystem;

#[tokio::test]
async fn test_ping_pong_before_and_after_queueing() {
    let system = TestSystem::new(0, Duration::from_secs(30));
    let mut client = system.connect();

    system.send(&client, "PING");
    assert_eq!(
        client.next_frame(Duration::from_millis(100)).await.as_deref(),
        Some("PONG")
    );

    system.send(&client, "REQUEST_MATCH|GUESSER");
    let _ = client.expect_frame("MATCH_QUEUED").await;

    // Still answered while waiting in the queue.
    system.send(&client, "PING");
    assert_eq!(
        client.next_frame(Duration::from_millis(100)).await.as_deref(),
        Some("PONG")
    );
}

#[tokio::test]
async fn test_username_updates_are_silent() {
    let system = TestSystem::new(0, Duration::from_secs(30));
    let mut client = system.connect();

    system.send(&client, "SET_USERNAME|Alice");
    assert_eq!(client.participant.display_name(), "Alice");
    assert!(client.drain().is_empty(), "SET_USERNAME is not acknowledged");

    // Empty names are ignored, later names win.
    system.send(&client, "SET_USERNAME|");
    assert_eq!(client.participant.display_name(), "Alice");
    system.send(&client, "SET_USERNAME|Bob the | Builder");
    assert_eq!(client.participant.display_name(), "Bob the | Builder");
}

#[tokio::test]
async fn test_repeat_match_request_keeps_single_queue_entry() {
    let system = TestSystem::new(0, Duration::from_secs(30));
    let mut client = system.connect();

    system.send(&client, "REQUEST_MATCH|GUESSER");
    assert_eq!(
        client.next_frame(Duration::from_millis(100)).await.as_deref(),
        Some("MATCH_QUEUED|GUESSER")
    );

    // Re-requesting, even for the other role, re-acks without a second entry.
    system.send(&client, "REQUEST_MATCH|GUESSER");
    system.send(&client, "REQUEST_MATCH|MIMIC");
    assert_eq!(
        client.next_frame(Duration::from_millis(100)).await.as_deref(),
        Some("MATCH_QUEUED|GUESSER")
    );
    assert_eq!(
        client.next_frame(Duration::from_millis(100)).await.as_deref(),
        Some("MATCH_QUEUED|GUESSER")
    );
    assert_eq!(system.queues.depths(), (1, 0));
}

#[tokio::test]
async fn test_invalid_and_missing_role_tokens() {
    let system = TestSystem::new(0, Duration::from_secs(30));
    let mut client = system.connect();

    system.send(&client, "REQUEST_MATCH|WIZARD");
    assert_eq!(
        client.next_frame(Duration::from_millis(100)).await.as_deref(),
        Some("INVALID_ROLE")
    );

    // Role tokens are case-sensitive.
    system.send(&client, "REQUEST_MATCH|guesser");
    assert_eq!(
        client.next_frame(Duration::from_millis(100)).await.as_deref(),
        Some("INVALID_ROLE")
    );

    // A bare REQUEST_MATCH is not the command at all; unbound, it drops.
    system.send(&client, "REQUEST_MATCH");
    assert!(client.next_frame(Duration::from_millis(50)).await.is_none());
    assert_eq!(system.queues.depths(), (0, 0));
}

#[tokio::test]
async fn test_queue_full_rejection() {
    let system = TestSystem::with_capacity(0, Duration::from_secs(30), 1);

    let mut first = system.connect();
    let mut second = system.connect();

    system.send(&first, "REQUEST_MATCH|MIMIC");
    let _ = first.expect_frame("MATCH_QUEUED").await;

    system.send(&second, "REQUEST_MATCH|MIMIC");
    assert_eq!(
        second.next_frame(Duration::from_millis(100)).await.as_deref(),
        Some("MATCH_QUEUE_FULL")
    );
    assert_eq!(system.queues.depths(), (0, 1));

    // The rejected client may retry the other queue.
    system.send(&second, "REQUEST_MATCH|GUESSER");
    assert_eq!(
        second.next_frame(Duration::from_millis(100)).await.as_deref(),
        Some("MATCH_QUEUED|GUESSER")
    );
}

#[tokio::test]
async fn test_unbound_frames_drop_silently() {
    let system = TestSystem::new(0, Duration::from_secs(30));
    let mut client = system.connect();

    system.send(&client, "GUESS|somebody");
    system.send(&client, "random chatter");
    system.send(&client, "");

    assert!(client.next_frame(Duration::from_millis(50)).await.is_none());
}

#[tokio::test]
async fn test_match_request_inside_room_is_ignored() {
    let system = TestSystem::new(0, Duration::from_secs(30));
    system.start_matching();

    let mut alice = system.connect();
    let mut bob = system.connect();
    system.send(&alice, "REQUEST_MATCH|GUESSER");
    system.send(&bob, "REQUEST_MATCH|MIMIC");
    let _ = alice.expect_frame("MATCH_SUCCESS").await;
    let _ = bob.expect_frame("MATCH_SUCCESS").await;

    // A paired participant cannot wander back into a queue.
    system.send(&alice, "REQUEST_MATCH|GUESSER");
    assert!(alice.next_frame(Duration::from_millis(50)).await.is_none());
    assert!(bob.next_frame(Duration::from_millis(50)).await.is_none());
    assert_eq!(system.queues.depths(), (0, 0));
}

#[tokio::test]
async fn test_disconnect_while_queued_then_reconnect_flow() {
    let system = TestSystem::new(0, Duration::from_secs(30));
    system.start_matching();

    let mut ghost = system.connect();
    system.send(&ghost, "REQUEST_MATCH|GUESSER");
    let _ = ghost.expect_frame("MATCH_QUEUED").await;
    system.disconnect(&ghost);

    // A fresh pair still matches; the dead entry never surfaces.
    let mut alice = system.connect();
    let mut bob = system.connect();
    system.send(&alice, "REQUEST_MATCH|GUESSER");
    system.send(&bob, "REQUEST_MATCH|MIMIC");
    let _ = alice.expect_frame("MATCH_SUCCESS").await;
    let _ = bob.expect_frame("MATCH_SUCCESS").await;

    assert!(ghost.drain().iter().all(|f| !f.starts_with("MATCH_SUCCESS")));
    assert_eq!(system.registry.active_rooms(), 1);
}

#[tokio::test]
async fn test_survivor_relay_after_peer_left_is_dropped() {
    let system = TestSystem::new(0, Duration::from_secs(30));
    system.start_matching();

    let mut alice = system.connect();
    let mut bob = system.connect();
    system.send(&alice, "REQUEST_MATCH|GUESSER");
    system.send(&bob, "REQUEST_MATCH|MIMIC");
    let _ = alice.expect_frame("MATCH_SUCCESS").await;
    let _ = bob.expect_frame("MATCH_SUCCESS").await;

    system.disconnect(&alice);
    let _ = bob.expect_frame("PLAYER_DISCONNECTED").await;

    // The survivor's room binding is gone along with the room.
    assert!(bob.participant.room_id().is_none());
    system.send(&bob, "are you still there?");
    assert!(bob.next_frame(Duration::from_millis(50)).await.is_none());
}
