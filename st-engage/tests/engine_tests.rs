//! Reconciliation engine behavior tests
//!
//! Drives the engine against a scripted remote to verify optimistic
//! mutation, rollback exactness, single-flight, cancellation, and resync
//! behavior.

mod helpers;

use std::sync::atomic::Ordering;
use std::time::Duration;

use uuid::Uuid;

use helpers::{server_comment, test_config, test_engine, MockApi, Step};
use st_common::model::{ErrorKind, MutationPhase};
use st_engage::client::LikeSummary;
use st_engage::error::Error;
use st_engage::{EngineConfig, InteractionEngine};

// ----------------------------------------------------------------------
// Like toggling
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_transient_failure_rolls_back_exactly() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.set_count(subject, 3);
    engine.refresh(subject, Some(viewer)).await.unwrap();
    let before = engine.get_state(subject, Some(viewer));
    assert_eq!(before.likes_count, 3);
    assert!(!before.is_liked);

    mock.plan_toggle(Step::fail(Error::Transient("connection reset".to_string())));
    let accepted = engine.toggle_like(subject, Some(viewer)).await.unwrap();
    assert!(!accepted);

    let after = engine.get_state(subject, Some(viewer));
    assert_eq!(after.is_liked, before.is_liked);
    assert_eq!(after.likes_count, before.likes_count);
    assert_eq!(after.phase, MutationPhase::RolledBack);
    assert_eq!(after.error, Some(ErrorKind::Transient));
    assert!(!after.is_updating());
}

#[tokio::test]
async fn test_rapid_double_toggle_is_single_flight() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.plan_toggle(
        Step::respond(LikeSummary {
            count: 4,
            has_liked: true,
        })
        .after(Duration::from_millis(80)),
    );

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.toggle_like(subject, Some(viewer)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second call while the first is in flight: dropped, not queued
    let second = engine.toggle_like(subject, Some(viewer)).await.unwrap();
    assert!(!second);

    let first = first.await.unwrap().unwrap();
    assert!(first);

    assert_eq!(mock.toggle_calls.load(Ordering::SeqCst), 1);
    let state = engine.get_state(subject, Some(viewer));
    assert!(state.is_liked);
    assert_eq!(state.likes_count, 4);
    assert_eq!(state.phase, MutationPhase::Idle);
}

#[tokio::test]
async fn test_likes_count_never_negative() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    // Liked, but the aggregate is already zero (drifted counter)
    mock.set_count(subject, 0);
    mock.set_liked(subject, viewer, true);
    engine.refresh(subject, Some(viewer)).await.unwrap();

    mock.plan_toggle(
        Step::respond(LikeSummary {
            count: 0,
            has_liked: false,
        })
        .after(Duration::from_millis(50)),
    );

    let handle = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.toggle_like(subject, Some(viewer)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The optimistic decrement clamps at zero
    let optimistic = engine.get_state(subject, Some(viewer));
    assert_eq!(optimistic.likes_count, 0);
    assert!(!optimistic.is_liked);

    assert!(handle.await.unwrap().unwrap());
    assert_eq!(engine.get_state(subject, Some(viewer)).likes_count, 0);
}

#[tokio::test]
async fn test_toggle_reconciles_to_server_count() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.set_count(subject, 3);
    engine.refresh(subject, Some(viewer)).await.unwrap();

    // Another viewer liked concurrently: the server reports 5, not the
    // optimistic 4
    mock.plan_toggle(
        Step::respond(LikeSummary {
            count: 5,
            has_liked: true,
        })
        .after(Duration::from_millis(50)),
    );

    let handle = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.toggle_like(subject, Some(viewer)).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let optimistic = engine.get_state(subject, Some(viewer));
    assert!(optimistic.is_liked);
    assert_eq!(optimistic.likes_count, 4);
    assert!(optimistic.is_updating());

    assert!(handle.await.unwrap().unwrap());

    let reconciled = engine.get_state(subject, Some(viewer));
    assert!(reconciled.is_liked);
    assert_eq!(reconciled.likes_count, 5);
    assert!(!reconciled.is_updating());
}

#[tokio::test]
async fn test_unauthenticated_toggle_refused() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();

    let result = engine.toggle_like(subject, None).await;
    assert_eq!(result, Err(Error::Unauthenticated));
    assert_eq!(mock.toggle_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_timeout_rolls_back_and_frees_slot() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    // Far beyond the 15 s mutation timeout
    mock.plan_toggle(
        Step::respond(LikeSummary {
            count: 1,
            has_liked: true,
        })
        .after(Duration::from_secs(3600)),
    );

    let accepted = engine.toggle_like(subject, Some(viewer)).await.unwrap();
    assert!(!accepted);

    let state = engine.get_state(subject, Some(viewer));
    assert!(!state.is_liked);
    assert_eq!(state.likes_count, 0);
    assert_eq!(state.phase, MutationPhase::RolledBack);
    assert_eq!(state.error, Some(ErrorKind::Transient));

    // The subject's write slot is free again
    let accepted = engine.toggle_like(subject, Some(viewer)).await.unwrap();
    assert!(accepted);
    assert!(engine.get_state(subject, Some(viewer)).is_liked);
}

// ----------------------------------------------------------------------
// Refresh
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_refresh_does_not_clobber_inflight_write() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.plan_toggle(
        Step::respond(LikeSummary {
            count: 5,
            has_liked: true,
        })
        .after(Duration::from_millis(100)),
    );

    let handle = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.toggle_like(subject, Some(viewer)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let before = engine.get_state(subject, Some(viewer));
    assert!(before.is_updating());

    // Refresh while the write is in flight: resolves without touching state
    engine.refresh(subject, Some(viewer)).await.unwrap();
    let after = engine.get_state(subject, Some(viewer));
    assert_eq!(after.is_liked, before.is_liked);
    assert_eq!(after.likes_count, before.likes_count);
    assert_eq!(mock.fetch_calls.load(Ordering::SeqCst), 0);

    assert!(handle.await.unwrap().unwrap());
    assert_eq!(engine.get_state(subject, Some(viewer)).likes_count, 5);
}

#[tokio::test]
async fn test_concurrent_refresh_shares_one_fetch() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.plan_fetch(
        Step::respond(LikeSummary {
            count: 7,
            has_liked: false,
        })
        .after(Duration::from_millis(50)),
    );

    let (first, second) = tokio::join!(
        engine.refresh(subject, Some(viewer)),
        engine.refresh(subject, Some(viewer)),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(mock.fetch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.get_state(subject, Some(viewer)).likes_count, 7);
}

#[tokio::test]
async fn test_fetch_retries_transient_then_succeeds() {
    let mock = MockApi::new();
    let config = EngineConfig {
        fetch_retries: 2,
        ..test_config()
    };
    let engine = InteractionEngine::new(mock.clone(), None, config);
    let subject = Uuid::new_v4();

    mock.set_count(subject, 7);
    mock.plan_fetch(Step::fail(Error::Transient("connection reset".to_string())));

    engine.refresh(subject, None).await.unwrap();

    assert_eq!(mock.fetch_calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.get_state(subject, None).likes_count, 7);
}

#[tokio::test]
async fn test_optimistic_write_publishes_event() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();
    let mut rx = engine.subscribe();

    engine.toggle_like(subject, Some(viewer)).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type(), "LikeStateChanged");
    assert_eq!(event.subject_id(), subject);
}

// ----------------------------------------------------------------------
// Comments
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_failed_comment_create_removes_optimistic_entry() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.plan_create(Step::fail(Error::Transient("gateway timeout".to_string())));

    let result = engine.add_comment(subject, Some(viewer), "hello").await;
    assert_eq!(
        result,
        Err(Error::Transient("gateway timeout".to_string()))
    );
    assert!(engine.comments(subject).is_empty());
}

#[tokio::test]
async fn test_comment_create_confirms_in_place() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    let saved = engine
        .add_comment(subject, Some(viewer), "  great track  ")
        .await
        .unwrap();
    assert!(saved.id.starts_with("srv-"));
    assert_eq!(saved.text, "great track");

    let comments = engine.comments(subject);
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].id, saved.id);
    assert!(!comments[0].is_optimistic);
}

#[tokio::test]
async fn test_empty_comment_rejected_before_network() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    let result = engine.add_comment(subject, Some(viewer), "   ").await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(mock.create_calls.load(Ordering::SeqCst), 0);
    assert!(engine.comments(subject).is_empty());
}

#[tokio::test]
async fn test_oversized_comment_rejected() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    let oversized = "x".repeat(501);
    let result = engine.add_comment(subject, Some(viewer), &oversized).await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(mock.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_delete_foreign_comment_rejected() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();
    let other_viewer = Uuid::new_v4();

    mock.seed_comment(server_comment(subject, other_viewer, "c123", "mine!"));
    engine.refresh_comments(subject).await.unwrap();

    let result = engine.delete_comment(subject, Some(viewer), "c123").await;
    assert!(matches!(result, Err(Error::Permission(_))));
    assert_eq!(mock.delete_calls.load(Ordering::SeqCst), 0);

    let comments = engine.comments(subject);
    assert!(comments.iter().any(|c| c.id == "c123"));
}

#[tokio::test]
async fn test_delete_own_comment() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.seed_comment(server_comment(subject, viewer, "c9", "bye"));
    engine.refresh_comments(subject).await.unwrap();

    engine.delete_comment(subject, Some(viewer), "c9").await.unwrap();
    assert!(engine.comments(subject).is_empty());
    assert_eq!(mock.delete_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_delete_failure_restores_thread_by_refetch() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.seed_comment(server_comment(subject, viewer, "c1", "keep me"));
    engine.refresh_comments(subject).await.unwrap();

    mock.plan_delete(Step::fail(Error::Transient("bad gateway".to_string())));
    let result = engine.delete_comment(subject, Some(viewer), "c1").await;
    assert!(matches!(result, Err(Error::Transient(_))));

    // The server still has the comment; the refetch restored it
    let comments = engine.comments(subject);
    assert!(comments.iter().any(|c| c.id == "c1"));
}

#[tokio::test]
async fn test_delete_already_gone_remotely_is_success() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.seed_comment(server_comment(subject, viewer, "c2", "ghost"));
    engine.refresh_comments(subject).await.unwrap();

    mock.plan_delete(Step::fail(Error::NotFound("comment c2".to_string())));
    engine.delete_comment(subject, Some(viewer), "c2").await.unwrap();
    assert!(engine.comments(subject).is_empty());
}

#[tokio::test]
async fn test_counter_patch_retries_with_minimal_shape() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    // First patch attempt fails; the minimal retry succeeds. The comment
    // itself must survive either way.
    mock.plan_counts(Step::fail(Error::Transient("schema mismatch".to_string())));

    let saved = engine
        .add_comment(subject, Some(viewer), "counted")
        .await
        .unwrap();
    assert_eq!(mock.counts_calls.load(Ordering::SeqCst), 2);
    assert!(engine.comments(subject).iter().any(|c| c.id == saved.id));
}

// ----------------------------------------------------------------------
// Persistent cache
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_cold_start_hydrates_from_cache() {
    let mock = MockApi::new();
    let pool = st_engage::db::open_memory_cache().await.unwrap();
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    st_engage::db::interactions::save(&pool, subject, Some(viewer), true, 9)
        .await
        .unwrap();

    // Remote unreachable: the cached value is all we have
    mock.plan_fetch(Step::fail(Error::Transient("offline".to_string())));
    let engine = InteractionEngine::new(mock.clone(), Some(pool), test_config());

    let initial = engine.get_state(subject, Some(viewer));
    assert_eq!(initial.likes_count, 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let hydrated = engine.get_state(subject, Some(viewer));
    assert!(hydrated.is_liked);
    assert_eq!(hydrated.likes_count, 9);
}

#[tokio::test]
async fn test_live_server_wins_over_cached_value() {
    let mock = MockApi::new();
    let pool = st_engage::db::open_memory_cache().await.unwrap();
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    st_engage::db::interactions::save(&pool, subject, Some(viewer), true, 9)
        .await
        .unwrap();
    mock.set_count(subject, 2);

    let engine = InteractionEngine::new(mock.clone(), Some(pool), test_config());
    engine.get_state(subject, Some(viewer));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let state = engine.get_state(subject, Some(viewer));
    assert_eq!(state.likes_count, 2);
    assert!(!state.is_liked);
}

#[tokio::test]
async fn test_final_state_written_through_to_cache() {
    let mock = MockApi::new();
    let pool = st_engage::db::open_memory_cache().await.unwrap();
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    let engine = InteractionEngine::new(mock.clone(), Some(pool.clone()), test_config());
    assert!(engine.toggle_like(subject, Some(viewer)).await.unwrap());

    let row = st_engage::db::interactions::load(&pool, subject, Some(viewer))
        .await
        .unwrap()
        .unwrap();
    assert!(row.is_liked);
    assert_eq!(row.likes_count, 1);
}

// ----------------------------------------------------------------------
// Background resync
// ----------------------------------------------------------------------

#[tokio::test]
async fn test_resync_refreshes_observed_keys() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.set_count(subject, 3);
    engine.observe(subject, Some(viewer));
    engine.start_resync();

    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.stop_resync();

    assert!(mock.fetch_calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(engine.get_state(subject, Some(viewer)).likes_count, 3);
}

#[tokio::test]
async fn test_resync_ignores_unobserved_keys() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    engine.observe(subject, Some(viewer));
    engine.release(subject, Some(viewer));
    engine.start_resync();

    tokio::time::sleep(Duration::from_millis(150)).await;
    engine.stop_resync();

    assert_eq!(mock.fetch_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_request_resync_is_debounced() {
    let mock = MockApi::new();
    let engine = test_engine(mock.clone());
    let subject = Uuid::new_v4();
    let viewer = Uuid::new_v4();

    mock.set_count(subject, 6);
    engine.start_resync();

    // A burst of triggers collapses into one refresh for the key
    for _ in 0..5 {
        engine.request_resync(subject, Some(viewer));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.stop_resync();

    assert_eq!(mock.fetch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.get_state(subject, Some(viewer)).likes_count, 6);
}
