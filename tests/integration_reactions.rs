mod common;

use campus_messaging::error::AppError;
use campus_messaging::events::{MessageReactionAdded, MessageReactionRemoved};
use uuid::Uuid;

use common::{capture, TestApp};

#[tokio::test]
async fn add_reaction_returns_counts_and_own_reactions() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");
    let added = capture::<MessageReactionAdded>(&app.bus).await;

    let message = app
        .messages
        .send_direct(alice, bob, "good news".into(), None)
        .await
        .unwrap();

    let view = app.reactions.add(bob, message.id, "👍").await.unwrap();
    assert_eq!(view.counts.len(), 1);
    assert_eq!(view.counts[0].emoji, "👍");
    assert_eq!(view.counts[0].count, 1);
    assert_eq!(view.user_reactions, vec!["👍".to_string()]);
    assert_eq!(view.reactions.len(), 1);
    assert_eq!(view.reactions[0].user_id, bob);

    let events = added.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].display_name, "Bob");
    assert_eq!(events[0].counts.get("👍"), Some(&1));
}

#[tokio::test]
async fn repeating_the_same_emoji_is_rejected() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");

    let message = app
        .messages
        .send_direct(alice, bob, "hi".into(), None)
        .await
        .unwrap();
    app.reactions.add(bob, message.id, "👍").await.unwrap();

    let err = app.reactions.add(bob, message.id, "👍").await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateReaction { .. }));
}

#[tokio::test]
async fn a_different_emoji_supersedes_the_previous_reaction() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");
    let carol = app.directory.add_user("Carol");

    let message = app
        .messages
        .send_direct(alice, bob, "big announcement".into(), None)
        .await
        .unwrap();

    app.reactions.add(bob, message.id, "👍").await.unwrap();
    app.reactions.add(carol, message.id, "👍").await.unwrap();
    let view = app.reactions.add(bob, message.id, "🎉").await.unwrap();

    // Bob's thumbs-up is gone; at most one reaction per user holds
    assert_eq!(view.user_reactions, vec!["🎉".to_string()]);
    let thumbs = view.counts.iter().find(|c| c.emoji == "👍").unwrap();
    assert_eq!(thumbs.count, 1);
    let party = view.counts.iter().find(|c| c.emoji == "🎉").unwrap();
    assert_eq!(party.count, 1);
    assert_eq!(view.reactions.len(), 2);
}

#[tokio::test]
async fn reactions_on_missing_or_deleted_messages_are_rejected() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");

    let err = app
        .reactions
        .add(bob, Uuid::new_v4(), "👍")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let message = app
        .messages
        .send_direct(alice, bob, "short-lived".into(), None)
        .await
        .unwrap();
    app.messages.soft_delete(alice, message.id).await.unwrap();

    let err = app.reactions.add(bob, message.id, "👍").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyDeleted));
}

#[tokio::test]
async fn invalid_emoji_is_a_bad_request() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");

    let message = app
        .messages
        .send_direct(alice, bob, "hm".into(), None)
        .await
        .unwrap();

    let err = app.reactions.add(bob, message.id, "").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn removing_a_reaction_updates_counts_and_publishes() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");
    let removed = capture::<MessageReactionRemoved>(&app.bus).await;

    let message = app
        .messages
        .send_direct(alice, bob, "bye".into(), None)
        .await
        .unwrap();
    app.reactions.add(bob, message.id, "👍").await.unwrap();

    let view = app.reactions.remove(bob, message.id, "👍").await.unwrap();
    assert!(view.counts.is_empty());
    assert!(view.user_reactions.is_empty());

    let events = removed.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].emoji, "👍");
    assert!(events[0].counts.is_empty());

    // The row is gone; removing again is NotFound
    let err = app
        .reactions
        .remove(bob, message.id, "👍")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn reaction_queries_expose_identity_and_aggregates() {
    let app = TestApp::new();
    let alice = app.directory.add_user("Alice");
    let bob = app.directory.add_user("Bob");
    let carol = app.directory.add_user("Carol");

    let message = app
        .messages
        .send_direct(alice, bob, "poll".into(), None)
        .await
        .unwrap();
    app.reactions.add(bob, message.id, "👍").await.unwrap();
    app.reactions.add(carol, message.id, "👍").await.unwrap();
    app.reactions.add(alice, message.id, "❤️").await.unwrap();

    let view = app.reactions.reactions(message.id, bob).await.unwrap();
    assert_eq!(view.reactions.len(), 3);
    // Highest count first
    assert_eq!(view.counts[0].emoji, "👍");
    assert_eq!(view.counts[0].count, 2);
    assert_eq!(view.user_reactions, vec!["👍".to_string()]);

    let counts = app.reactions.counts(message.id).await.unwrap();
    assert_eq!(counts.len(), 2);
    assert_eq!(counts[0].count, 2);
}
