//! Integration tests for the editing session
//!
//! This tests:
//! - Featured-widget exclusivity reflected from the backend
//! - Fetch coalescing under mutation bursts
//! - Per-entity FIFO with mixed keys
//! - Selection independence across a refresh

use linkpage_editor::{
    Backend, BackendFailure, ChangeSet, EditSession, EntityRef, ErrorKind, MemoryBackend, PageSnapshot,
    SessionConfig, SnapshotEvent, SnapshotStatus, SubmitEvent,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn page() -> PageSnapshot {
    serde_json::from_value(json!({
        "settings": { "title": "My links", "published": false },
        "widgets": [
            { "id": "A", "type": "link", "position": 0, "is_featured": false },
            { "id": "B", "type": "podcast", "position": 1, "is_featured": true }
        ],
        "social_icons": [
            { "id": "ig", "platform": "instagram", "url": "https://instagram.com/me" }
        ],
        "integrations": { "google": { "tracking_id": "G-1" } }
    }))
    .unwrap()
}

async fn open_session() -> (Arc<MemoryBackend>, EditSession) {
    let backend = Arc::new(MemoryBackend::new(page()));
    let session = EditSession::new("client-1", Backend::single(backend.clone()), SessionConfig::default());
    session.open().await.unwrap();
    (backend, session)
}

#[tokio::test]
async fn test_featured_widget_reflects_backend() {
    let (backend, session) = open_session().await;
    backend.hold_fetches();

    session
        .apply(EntityRef::widget("A"), ChangeSet::new().set("is_featured", true))
        .await
        .unwrap();

    // Before the refetch lands the old snapshot is still what everyone sees
    let before = session.snapshot().unwrap();
    assert_eq!(before.version, 1);
    assert_eq!(before.page.featured_widgets().count(), 1);

    backend.open_fetches();
    session.settled().await;
    let after = session.snapshot().unwrap();
    assert_eq!(after.version, 2);

    let featured: Vec<_> = after.page.featured_widgets().map(|w| w.id.as_str()).collect();
    assert_eq!(featured, vec!["A"]);
}

#[tokio::test]
async fn test_featured_widget_is_not_enforced_locally() {
    let (backend, session) = open_session().await;
    backend.hold_fetches();

    // Optimistic view shows only what was patched; the backend decides B
    session
        .apply_optimistic(EntityRef::widget("A"), ChangeSet::new().set("is_featured", true))
        .await
        .unwrap();
    assert_eq!(session.snapshot().unwrap().version, 1);
    assert_eq!(session.view().unwrap().featured_widgets().count(), 2);

    backend.open_fetches();
    session.settled().await;
    assert_eq!(session.view().unwrap().featured_widgets().count(), 1);
}

#[tokio::test]
async fn test_every_panel_sees_the_same_version() {
    let (_backend, session) = open_session().await;
    let seen: Arc<Mutex<Vec<(usize, u64)>>> = Arc::new(Mutex::new(Vec::new()));

    let subs: Vec<_> = (0..3)
        .map(|panel| {
            let seen = seen.clone();
            session.store().subscribe(move |event| {
                if let SnapshotEvent::Updated(snapshot) = event {
                    seen.lock().unwrap().push((panel, snapshot.version));
                }
            })
        })
        .collect();

    session
        .apply(EntityRef::page_settings("page"), ChangeSet::new().set("title", "New title"))
        .await
        .unwrap();
    session.settled().await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(0, 2), (1, 2), (2, 2)]);
    assert_eq!(session.snapshot().unwrap().page.settings["title"], json!("New title"));
    drop(subs);
}

#[tokio::test]
async fn test_mutation_burst_coalesces_fetches() {
    let (backend, session) = open_session().await;
    assert_eq!(backend.fetch_count(), 1);
    backend.hold_fetches();

    // First success starts a fetch that stays parked on the gate
    session
        .apply(EntityRef::widget("A"), ChangeSet::new().set("position", 3))
        .await
        .unwrap();
    tokio::task::yield_now().await;
    assert!(session.store().is_fetching());

    for title in ["one", "two", "three"] {
        session
            .apply(EntityRef::page_settings("page"), ChangeSet::new().set("title", title))
            .await
            .unwrap();
    }

    backend.open_fetches();
    session.settled().await;

    // Initial load, the parked fetch, and exactly one follow-up
    assert_eq!(backend.fetch_count(), 3);
    assert_eq!(session.snapshot().unwrap().page.settings["title"], json!("three"));
}

#[tokio::test]
async fn test_same_entity_fifo_across_mixed_keys() {
    let (backend, session) = open_session().await;
    backend.set_submit_delay(Some(Duration::from_millis(5)));

    let a = EntityRef::widget("A");
    let b = EntityRef::widget("B");
    let (r1, r2, r3) = tokio::join!(
        session.apply(a.clone(), ChangeSet::new().set("effect", "first")),
        session.apply(b.clone(), ChangeSet::new().set("effect", "other")),
        session.apply(a.clone(), ChangeSet::new().set("effect", "second")),
    );
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();

    let events = backend.submit_events();
    let a_events: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SubmitEvent::Started(t) | SubmitEvent::Finished(t) if *t == a))
        .cloned()
        .collect();
    assert_eq!(
        a_events,
        vec![
            SubmitEvent::Started(a.clone()),
            SubmitEvent::Finished(a.clone()),
            SubmitEvent::Started(a.clone()),
            SubmitEvent::Finished(a.clone()),
        ]
    );

    session.settled().await;
    let page = &session.snapshot().unwrap().page;
    assert_eq!(page.widget(&"A".into()).unwrap().effect.as_deref(), Some("second"));
}

#[tokio::test]
async fn test_failed_mutation_leaves_snapshot_alone() {
    let (backend, session) = open_session().await;
    backend.fail_next_submit(BackendFailure::new(422, "invalid").with_field("url", "not a url"));

    let err = session
        .apply(EntityRef::social_icon("ig"), ChangeSet::new().set("url", "nope"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationRejected);
    assert_eq!(session.store().generation(), 1);
    assert_eq!(backend.fetch_count(), 1);
    assert_eq!(session.snapshot().unwrap().version, 1);
}

#[tokio::test]
async fn test_stale_snapshot_after_failed_refresh() {
    let (backend, session) = open_session().await;
    backend.fail_next_fetch(BackendFailure::new(503, "maintenance"));

    session.invalidate();
    session.settled().await;

    assert!(matches!(session.status(), SnapshotStatus::Stale(_)));
    assert_eq!(session.snapshot().unwrap().page.settings["title"], json!("My links"));
}

#[tokio::test]
async fn test_selection_survives_refresh_and_is_independent() {
    let (_backend, session) = open_session().await;
    let widget_changes = Arc::new(AtomicUsize::new(0));
    let w = widget_changes.clone();
    let _sub = session.widgets().subscribe(move |_| {
        w.fetch_add(1, Ordering::SeqCst);
    });

    session.widgets().select(Some("7".into()));
    session.integrations().select(Some("google".into()));
    assert_eq!(session.widgets().current(), Some("7".into()));

    // Widget 7 does not exist; nothing clears it implicitly
    session.invalidate();
    session.settled().await;
    assert_eq!(session.widgets().current(), Some("7".into()));
    assert_eq!(widget_changes.load(Ordering::SeqCst), 1);

    assert_eq!(session.prune_selections(), 1);
    assert_eq!(session.integrations().current(), Some("google".into()));
}
