mod common;

use std::time::Duration;

use campus_messaging::events::{TypingTarget, UserConnected, UserDisconnected, UserStoppedTyping};
use uuid::Uuid;

use common::{capture, TestApp};

#[tokio::test]
async fn every_connection_publishes_even_when_already_online() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let connected = capture::<UserConnected>(&app.bus).await;

    app.presence.add_connection(alice, Uuid::new_v4()).await;
    app.presence.add_connection(alice, Uuid::new_v4()).await;

    let events = connected.lock().await;
    assert_eq!(events.len(), 2);
    assert_eq!(app.presence.connection_count(alice), 2);
}

#[tokio::test]
async fn last_connection_removal_is_the_offline_signal() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let disconnected = capture::<UserDisconnected>(&app.bus).await;

    let laptop = Uuid::new_v4();
    let phone = Uuid::new_v4();
    app.presence.add_connection(alice, laptop).await;
    app.presence.add_connection(alice, phone).await;

    // Another connection remains: no spurious offline signal
    assert!(!app.presence.remove_connection(alice, laptop).await);
    assert!(app.presence.is_online(alice));

    assert!(app.presence.remove_connection(alice, phone).await);
    assert!(!app.presence.is_online(alice));

    let events = disconnected.lock().await;
    assert_eq!(events.len(), 2);
    assert!(!events[0].is_last_connection);
    assert!(events[1].is_last_connection);
}

#[tokio::test]
async fn online_users_reflects_open_connections() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");

    let conn = Uuid::new_v4();
    app.presence.add_connection(alice, conn).await;
    app.presence.add_connection(bob, Uuid::new_v4()).await;

    let mut online = app.presence.online_users();
    online.sort();
    let mut expected = vec![alice, bob];
    expected.sort();
    assert_eq!(online, expected);

    app.presence.remove_connection(alice, conn).await;
    assert_eq!(app.presence.online_users(), vec![bob]);
}

#[tokio::test]
async fn concurrent_disconnects_elect_exactly_one_last_connection() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let connections: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
    for connection_id in &connections {
        app.presence.add_connection(alice, *connection_id).await;
    }

    let presence = app.presence.clone();
    let handles: Vec<_> = connections
        .into_iter()
        .map(|connection_id| {
            let presence = presence.clone();
            tokio::spawn(async move { presence.remove_connection(alice, connection_id).await })
        })
        .collect();

    let mut last_count = 0;
    for handle in handles {
        if handle.await.unwrap() {
            last_count += 1;
        }
    }
    assert_eq!(last_count, 1);
    assert!(!app.presence.is_online(alice));
}

#[tokio::test]
async fn typing_timeout_debounces_to_a_single_event() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");
    let stopped = capture::<UserStoppedTyping>(&app.bus).await;
    let target = TypingTarget::User(bob);

    // Two signals inside the 100ms window: the timer re-arms
    app.presence.set_typing_timeout(alice, target);
    tokio::time::sleep(Duration::from_millis(50)).await;
    app.presence.set_typing_timeout(alice, target);

    // 70ms past the re-arm the first timer would already have fired
    tokio::time::sleep(Duration::from_millis(70)).await;
    assert!(stopped.lock().await.is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let events = stopped.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, alice);
    assert_eq!(events[0].target, target);
}

#[tokio::test]
async fn typing_timers_are_keyed_per_target() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");
    let class = Uuid::new_v4();
    let stopped = capture::<UserStoppedTyping>(&app.bus).await;

    app.presence.set_typing_timeout(alice, TypingTarget::User(bob));
    app.presence.set_typing_timeout(alice, TypingTarget::Group(class));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let events = stopped.lock().await;
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn clearing_typing_timeouts_cancels_all_pending_timers() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");
    let stopped = capture::<UserStoppedTyping>(&app.bus).await;

    app.presence.set_typing_timeout(alice, TypingTarget::User(bob));
    app.presence
        .set_typing_timeout(alice, TypingTarget::Group(Uuid::new_v4()));
    // Disconnect cleanup path
    app.presence.clear_typing_timeouts(alice);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(stopped.lock().await.is_empty());
}
