//! High concurrency stress tests for the matchmaking relay
//!
//! These tests validate thread safety of the queues, the matching loop and
//! the registry under many simultaneous sessions.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

// Import test fixtures
use crate::fixtures::{TestClient, TestSystem};

/// Wait until every client in the slice has seen a MATCH_SUCCESS frame,
/// returning the room id each one landed in.
async fn collect_rooms(clients: &mut [TestClient]) -> Vec<String> {
    let mut rooms = Vec::new();
    for client in clients.iter_mut() {
        let frame = client.expect_frame("MATCH_SUCCESS").await;
        let room_id = frame.split('|').nth(1).expect("room id field").to_string();
        rooms.push(room_id);
    }
    rooms
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_all_pair_up() {
    let system = Arc::new(TestSystem::new(0, Duration::from_secs(30)));
    system.start_matching();

    let pair_count = 50;
    let start_time = Instant::now();

    // Every session enqueues from its own task, guessers and mimics mixed.
    let mut handles = Vec::new();
    for i in 0..pair_count * 2 {
        let system = system.clone();
        handles.push(tokio::spawn(async move {
            let client = system.connect();
            let role = if i % 2 == 0 { "GUESSER" } else { "MIMIC" };
            system.send(&client, &format!("REQUEST_MATCH|{}", role));
            client
        }));
    }

    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await.expect("session task"));
    }

    let rooms = timeout(Duration::from_secs(10), collect_rooms(&mut clients))
        .await
        .expect("All sessions should pair up in time");

    let duration = start_time.elapsed();
    println!(
        "✅ {} sessions paired into {} rooms in {:?}",
        pair_count * 2,
        pair_count,
        duration
    );

    // Exactly two occupants per room, every participant in exactly one room.
    let distinct: HashSet<&String> = rooms.iter().collect();
    assert_eq!(distinct.len(), pair_count, "Two occupants per room");
    for room_id in &distinct {
        assert_eq!(
            rooms.iter().filter(|r| r == room_id).count(),
            2,
            "Room {} should hold exactly two participants",
            room_id
        );
    }

    assert_eq!(system.queues.depths(), (0, 0));
    assert_eq!(system.registry.active_rooms(), pair_count);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_disconnects_tear_down_cleanly() {
    let system = Arc::new(TestSystem::new(0, Duration::from_secs(30)));
    system.start_matching();

    let pair_count = 25;
    let mut clients = Vec::new();
    for i in 0..pair_count * 2 {
        let client = system.connect();
        let role = if i % 2 == 0 { "GUESSER" } else { "MIMIC" };
        system.send(&client, &format!("REQUEST_MATCH|{}", role));
        clients.push(client);
    }

    timeout(Duration::from_secs(10), collect_rooms(&mut clients))
        .await
        .expect("All sessions should pair up in time");

    // Hammer every session with racing disconnects.
    let clients: Vec<Arc<TestClient>> = clients.into_iter().map(Arc::new).collect();
    let mut handles = Vec::new();
    for client in &clients {
        for _ in 0..3 {
            let system = system.clone();
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                system.disconnect(&client);
            }));
        }
    }
    for handle in handles {
        handle.await.expect("disconnect task");
    }

    assert_eq!(system.registry.active_rooms(), 0, "Every room torn down");
    assert_eq!(system.queues.depths(), (0, 0));

    // Idempotent teardown: no participant still holds a room binding.
    for client in &clients {
        assert!(client.participant.room_id().is_none());
    }
    println!("✅ {} rooms torn down under racing disconnects", pair_count);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queuing_respects_capacity() {
    let capacity = 10;
    let system = Arc::new(TestSystem::with_capacity(
        0,
        Duration::from_secs(30),
        capacity,
    ));
    // No matching loop: entries must accumulate and overflow.

    let mut handles = Vec::new();
    for _ in 0..capacity * 3 {
        let system = system.clone();
        handles.push(tokio::spawn(async move {
            let client = system.connect();
            system.send(&client, "REQUEST_MATCH|MIMIC");
            client
        }));
    }

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        let mut client = handle.await.expect("session task");
        match client.next_frame(Duration::from_secs(1)).await.as_deref() {
            Some(frame) if frame.starts_with("MATCH_QUEUED") => accepted += 1,
            Some("MATCH_QUEUE_FULL") => rejected += 1,
            other => panic!("Unexpected enqueue response: {:?}", other),
        }
    }

    assert_eq!(accepted, capacity, "Exactly capacity entries admitted");
    assert_eq!(rejected, capacity * 2, "The rest bounced");
    assert_eq!(system.queues.depths(), (0, capacity));
    println!(
        "✅ Capacity held under contention: {} admitted, {} bounced",
        accepted, rejected
    );
}
