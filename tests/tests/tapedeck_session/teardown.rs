//! Teardown while ingestion or playback is suspended.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use rstest::rstest;
use tapedeck::{
    events::SessionEvent,
    play::{PlaybackState, mock::ScriptedRenderer},
    stream::PersistenceState,
};
use tapedeck_test_utils::payload;

use crate::common::HttpRig;

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn destroy_from_another_thread_unblocks_suspended_body() {
    let mut rig = HttpRig::new(payload(500_000, 9), |s| {
        s.with_chunk_delay(Duration::from_secs(30))
    })
    .await;
    let renderer = ScriptedRenderer::new();
    let session = Arc::new(rig.open(rig.config("stuck.mp3"), renderer.clone()).await);
    assert_eq!(session.write_cursor(), 0);

    let started = Instant::now();
    let remote = Arc::clone(&session);
    std::thread::spawn(move || remote.destroy()).join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rig.events.pending().is_empty());
    assert!(session.is_destroyed());
    assert_eq!(session.persistence_state(), PersistenceState::Failed);
    assert_eq!(session.playback_state(), PlaybackState::Stopped);
    assert!(!rig.destination("stuck.mp3").exists());
    assert!(session.temp_path().exists());
    assert!(!renderer.is_playing());
}

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_session_stops_everything() {
    let mut rig = HttpRig::new(payload(1_000_000, 10), |s| {
        s.with_chunk_size(20_000)
            .with_chunk_delay(Duration::from_millis(20))
    })
    .await;
    let session = rig.open(rig.config("dropped.mp3"), ScriptedRenderer::new()).await;
    rig.events
        .next_event(|e| matches!(e, SessionEvent::AssetLoaded { .. }))
        .await;
    session.play();
    let temp = session.temp_path();

    drop(session);
    tokio::time::sleep(Duration::from_millis(50)).await;
    rig.events.pending();
    let len = std::fs::metadata(&temp).unwrap().len();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(rig.events.pending().is_empty());
    assert_eq!(std::fs::metadata(&temp).unwrap().len(), len);
    assert!(!rig.destination("dropped.mp3").exists());
}

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn destroy_after_persisting_keeps_the_file() {
    let mut rig = HttpRig::new(payload(150_000, 11), |s| s).await;
    let session = rig.open(rig.config("kept.mp3"), ScriptedRenderer::new()).await;
    rig.events
        .next_event(|e| matches!(e, SessionEvent::AssetPersisted { .. }))
        .await;

    session.destroy();
    assert_eq!(session.persistence_state(), PersistenceState::Persisted);
    assert!(std::fs::read(rig.destination("kept.mp3")).unwrap() == *rig.data);
}
