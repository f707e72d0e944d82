// Socket-layer unit tests that need no server: backoff schedule, event
// dispatcher semantics and room membership bookkeeping.

mod common;
use common::{server_message, seller, setup_logging};

use haggle::socket::connection::{
    reconnect_delay, MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY,
};
use haggle::socket::dispatcher::{ChatEvent, EventDispatcher, EventKind};
use haggle::socket::rooms::RoomMembership;
use haggle::socket::TypingTracker;
use haggle::{ChatError, ChatSocket, ClientState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_backoff_is_monotone_and_capped() {
    setup_logging();

    let mut previous = Duration::ZERO;
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        let delay = reconnect_delay(attempt);
        assert!(
            delay >= previous,
            "delay for attempt {} regressed: {:?} < {:?}",
            attempt,
            delay,
            previous
        );
        assert!(delay <= RECONNECT_MAX_DELAY);
        previous = delay;
    }

    assert_eq!(reconnect_delay(1), RECONNECT_BASE_DELAY);
    assert_eq!(reconnect_delay(2), RECONNECT_BASE_DELAY * 2);
    // Far past the doubling range the cap holds, including for inputs that
    // would overflow a naive shift.
    assert_eq!(reconnect_delay(40), RECONNECT_MAX_DELAY);
}

#[test]
fn test_dispatcher_replaces_registrations_with_same_key() {
    let dispatcher = EventDispatcher::new();
    let delivered = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        // A consumer re-registering on every remount.
        let counter = delivered.clone();
        dispatcher.subscribe(EventKind::NewMessage, Some("chat-screen"), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(dispatcher.handler_count(EventKind::NewMessage), 1);

    dispatcher.emit(&ChatEvent::NewMessage(server_message(
        "m1",
        "c1",
        &seller(),
        "hi",
        0,
    )));
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dispatcher_unsubscribe_removes_exactly_one() {
    let dispatcher = EventDispatcher::new();
    let delivered = Arc::new(AtomicUsize::new(0));

    let keep = delivered.clone();
    dispatcher.subscribe(EventKind::Connected, None, move |_| {
        keep.fetch_add(1, Ordering::SeqCst);
    });
    let drop_me = delivered.clone();
    let subscription = dispatcher.subscribe(EventKind::Connected, None, move |_| {
        drop_me.fetch_add(10, Ordering::SeqCst);
    });

    subscription.unsubscribe();
    dispatcher.emit(&ChatEvent::Connected);

    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.handler_count(EventKind::Connected), 1);
}

#[test]
fn test_dispatcher_survives_panicking_callback() {
    let dispatcher = EventDispatcher::new();
    let delivered = Arc::new(AtomicUsize::new(0));

    dispatcher.subscribe(EventKind::Connected, Some("bad"), |_| {
        panic!("listener bug");
    });
    let counter = delivered.clone();
    dispatcher.subscribe(EventKind::Connected, Some("good"), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    dispatcher.emit(&ChatEvent::Connected);
    assert_eq!(
        delivered.load(Ordering::SeqCst),
        1,
        "a throwing callback must not block later ones"
    );
}

#[test]
fn test_room_membership_union_is_idempotent() {
    let mut rooms = RoomMembership::new();

    assert!(rooms.request(&["c1".to_string(), "c2".to_string()]));
    assert!(!rooms.request(&["c2".to_string(), "c1".to_string()]));
    assert!(rooms.request(&["c3".to_string()]));

    assert_eq!(rooms.pending(), vec!["c1", "c2", "c3"]);

    rooms.confirm(vec!["c1".to_string()]);
    assert_eq!(rooms.joined(), vec!["c1"]);
    rooms.reset_joined();
    assert!(rooms.joined().is_empty());
    // The pending set survives a transport reset.
    assert_eq!(rooms.pending(), vec!["c1", "c2", "c3"]);
}

#[test]
fn test_typing_tracker_follows_start_and_stop() {
    let mut tracker = TypingTracker::new();

    tracker.apply(&ChatEvent::TypingStart {
        user_id: "u2".to_string(),
        conversation_id: "c1".to_string(),
    });
    assert!(tracker.is_typing("c1", "u2"));
    assert_eq!(tracker.typists("c1"), vec!["u2"]);
    assert!(!tracker.is_typing("c2", "u2"));

    // Stop events are idempotent.
    for _ in 0..2 {
        tracker.apply(&ChatEvent::TypingStop {
            user_id: "u2".to_string(),
            conversation_id: "c1".to_string(),
        });
    }
    assert!(!tracker.is_typing("c1", "u2"));
    assert!(tracker.typists("c1").is_empty());
}

#[tokio::test]
async fn test_connect_requires_a_token() {
    let socket = ChatSocket::new("http://127.0.0.1:1/api");
    match socket.connect("").await {
        Err(ChatError::SessionExpired) => {}
        other => panic!("expected SessionExpired, got {:?}", other),
    }
    assert_eq!(socket.state(), ClientState::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ensure_connected_rejects_after_bounded_wait() {
    let socket = ChatSocket::new("http://127.0.0.1:1/api");

    // No token at all: a hard precondition failure, not a timeout.
    match socket.ensure_connected(Duration::from_millis(50)).await {
        Err(ChatError::SessionExpired) => {}
        other => panic!("expected SessionExpired, got {:?}", other),
    }

    // With a token but nothing listening the wait is bounded.
    let _ = socket.connect("token").await;
    match socket.ensure_connected(Duration::from_millis(150)).await {
        Err(ChatError::Timeout(_)) => {}
        other => panic!("expected Timeout, got {:?}", other),
    }

    socket.disconnect().await;
}
