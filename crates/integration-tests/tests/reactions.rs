//! Per-user punchline reactions: sign-in sync, toggling and sign-out.

use std::sync::Arc;

use integration_tests::Harness;
use jb_core::documents::USER_REACTIONS;
use jb_core::{AppError, LocalCache, MockDocumentStore, ReactionKind, ReactionMap};
use jb_memory::MemoryBlobStore;
use jb_sync::{ReactionService, ReactionSession, ReactionSource, RemoteGateway};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

fn map(entries: &[(&str, ReactionKind)]) -> ReactionMap {
    entries.iter().map(|(id, kind)| (id.to_string(), *kind)).collect()
}

#[tokio::test]
async fn remote_map_replaces_the_cached_one() {
    let harness = Harness::new();
    harness
        .cache
        .store_reactions("u1", &map(&[("p1", ReactionKind::Like)]))
        .await
        .unwrap();
    harness.docs.put(USER_REACTIONS, "u1", json!({ "p2": "dislike", "p3": "meh" }));
    let reactions = harness.reactions();

    assert_eq!(reactions.sign_in("u1").await, ReactionSource::Remote);

    let expected = map(&[("p2", ReactionKind::Dislike)]);
    assert_eq!(reactions.snapshot().reactions, expected);
    assert_eq!(reactions.snapshot().user_id.as_deref(), Some("u1"));
    assert_eq!(reactions.reaction("p1"), None);
    assert_eq!(harness.reopened_cache().load_reactions("u1"), expected);
}

#[tokio::test]
async fn unreachable_remote_keeps_the_cached_map() {
    let harness = Harness::new();
    let cached = map(&[("p1", ReactionKind::Like)]);
    harness.cache.store_reactions("u1", &cached).await.unwrap();

    let mut docs = MockDocumentStore::new();
    docs.expect_get().returning(|_, _| Err(anyhow::anyhow!("offline")));
    let gateway = Arc::new(RemoteGateway::new(Arc::new(docs), Arc::new(MemoryBlobStore::new())));
    let reactions = ReactionService::new(gateway, harness.cache());

    assert_eq!(reactions.sign_in("u1").await, ReactionSource::Cache);
    assert_eq!(reactions.snapshot().reactions, cached);
    assert_eq!(reactions.reaction("p1"), Some(ReactionKind::Like));
}

#[tokio::test]
async fn toggling_sets_clears_and_overwrites() {
    let harness = Harness::new();
    let reactions = harness.reactions();
    reactions.sign_in("u1").await;
    assert!(reactions.snapshot().reactions.is_empty());

    let set = assert_ok!(reactions.toggle("p1", ReactionKind::Like).await);
    assert_eq!(set.value, Some(ReactionKind::Like));
    set.remote.await.unwrap();
    assert_eq!(harness.docs.field(USER_REACTIONS, "u1", "p1"), Some(json!("like")));

    let cleared = assert_ok!(reactions.toggle("p1", ReactionKind::Like).await);
    assert_eq!(cleared.value, None);
    cleared.remote.await.unwrap();
    assert_eq!(harness.docs.field(USER_REACTIONS, "u1", "p1"), None);
    assert_eq!(reactions.reaction("p1"), None);

    reactions.toggle("p1", ReactionKind::Like).await.unwrap().remote.await.unwrap();
    let flipped = assert_ok!(reactions.toggle("p1", ReactionKind::Dislike).await);
    assert_eq!(flipped.value, Some(ReactionKind::Dislike));
    flipped.remote.await.unwrap();
    assert_eq!(harness.docs.field(USER_REACTIONS, "u1", "p1"), Some(json!("dislike")));

    assert_eq!(
        harness.reopened_cache().load_reactions("u1"),
        map(&[("p1", ReactionKind::Dislike)])
    );
}

#[tokio::test]
async fn toggling_requires_a_signed_in_user() {
    let harness = Harness::new();
    let reactions = harness.reactions();

    let err = assert_err!(reactions.toggle("p1", ReactionKind::Like).await);
    assert!(matches!(err, AppError::Unauthorized(_)));
    assert!(harness.docs.is_empty(USER_REACTIONS));
}

#[tokio::test]
async fn sign_out_clears_the_session_but_not_the_cache() {
    let harness = Harness::new();
    let reactions = harness.reactions();
    reactions.sign_in("u1").await;
    reactions.toggle("p1", ReactionKind::Like).await.unwrap().remote.await.unwrap();

    let mut rx = reactions.subscribe();
    reactions.sign_out();
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), ReactionSession::default());
    assert!(matches!(
        reactions.toggle("p1", ReactionKind::Like).await,
        Err(AppError::Unauthorized(_))
    ));

    reactions.sign_in("u2").await;
    assert!(reactions.snapshot().reactions.is_empty());
    assert_eq!(
        harness.reopened_cache().load_reactions("u1"),
        map(&[("p1", ReactionKind::Like)])
    );
}
