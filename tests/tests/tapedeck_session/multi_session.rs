//! Several sessions sharing one bus.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use rstest::rstest;
use tapedeck::{
    events::{EventKind, Notification, SessionEvent},
    play::mock::ScriptedRenderer,
};
use tapedeck_test_utils::payload;

use crate::common::HttpRig;

#[rstest]
#[case(2)]
#[case(4)]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn notifications_are_tagged_per_session(#[case] count: usize) {
    let mut rig = HttpRig::new(payload(400_000, 12), |s| s.with_chunk_size(40_000)).await;
    let mut sessions = Vec::new();
    for i in 0..count {
        let name = format!("copy-{i}.mp3");
        sessions.push(rig.open(rig.config(&name), ScriptedRenderer::new()).await);
    }

    let mut persisted: HashMap<_, usize> = HashMap::new();
    while persisted.len() < count {
        let n = rig
            .events
            .next(|n| matches!(n.event, SessionEvent::AssetPersisted { .. }))
            .await;
        *persisted.entry(n.session).or_default() += 1;
    }

    for (i, session) in sessions.iter().enumerate() {
        assert_eq!(persisted.get(&session.session_id()), Some(&1));
        let copy = std::fs::read(rig.destination(&format!("copy-{i}.mp3"))).unwrap();
        assert!(copy == *rig.data);
    }
}

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_listener_is_not_called() {
    let mut rig = HttpRig::new(payload(300_000, 13), |s| {
        s.with_chunk_size(30_000)
            .with_chunk_delay(Duration::from_millis(10))
    })
    .await;
    let session = rig.open(rig.config("weak.mp3"), ScriptedRenderer::new()).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let kept_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let dropped = Arc::new(move |_: &Notification| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&kept_calls);
    let kept = Arc::new(move |_: &Notification| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    session.add_listener(&[EventKind::AssetPersisted], &dropped);
    session.add_listener(&[EventKind::AssetPersisted], &kept);
    drop(dropped);

    rig.events
        .next_event(|e| matches!(e, SessionEvent::AssetPersisted { .. }))
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(kept_calls.load(Ordering::SeqCst), 1);
}
