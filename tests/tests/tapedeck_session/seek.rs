//! Seek policies against a paced HTTP body.

use std::time::Duration;

use rstest::rstest;
use tapedeck::{
    SeekPolicy,
    events::SessionEvent,
    play::{PlaybackState, mock::ScriptedRenderer},
};
use tapedeck_test_utils::payload;

use crate::common::{HttpRig, eventually};

const TOTAL: usize = 1_000_000;

async fn paced() -> HttpRig {
    HttpRig::new(payload(TOTAL, 8), |s| {
        s.with_chunk_size(50_000)
            .with_chunk_delay(Duration::from_millis(20))
    })
    .await
}

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn conservative_seek_never_requests_ranges() {
    let mut rig = paced().await;
    let log = rig.log.clone();
    let session = rig.open(rig.config("clamped.mp3"), ScriptedRenderer::new()).await;
    rig.events
        .next_event(|e| matches!(e, SessionEvent::AssetLoaded { .. }))
        .await;

    let cursor = session.write_cursor();
    let landed = session.seek_bytes(900_000).unwrap();
    assert!(landed >= cursor && landed < 900_000);
    assert_eq!(session.playback_state(), PlaybackState::Stalled);

    session.shift_back(Duration::from_secs(60)).unwrap();
    assert_eq!(session.playback_cursor(), 0);
    assert_ne!(session.playback_state(), PlaybackState::Stalled);

    rig.events
        .next_event(|e| matches!(e, SessionEvent::AssetPersisted { .. }))
        .await;
    assert_eq!(log.range_headers(), vec![None]);
}

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn relaxed_seek_fills_the_hole() {
    let mut rig = paced().await;
    let log = rig.log.clone();
    let config = rig
        .config("relaxed.mp3")
        .with_seek_policy(SeekPolicy::Relaxed { fill_gaps: true });
    let session = rig.open(config, ScriptedRenderer::new()).await;
    rig.events
        .next_event(|e| matches!(e, SessionEvent::AssetLoaded { .. }))
        .await;

    assert!(session.write_cursor() < 800_000);
    assert_eq!(session.seek_bytes(800_000).unwrap(), 800_000);
    eventually(|| log.count() >= 2).await;

    rig.events
        .next_event(|e| matches!(e, SessionEvent::AssetPersisted { .. }))
        .await;
    assert!(std::fs::read(rig.destination("relaxed.mp3")).unwrap() == *rig.data);

    let ranges = log.range_headers();
    assert_eq!(ranges[0], None);
    assert_eq!(ranges[1].as_deref(), Some("bytes=800000-"));
    assert!(
        ranges[2..]
            .iter()
            .flatten()
            .any(|r| r.ends_with("-799999"))
    );
}

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn relaxed_seek_without_filling_fails_persistence() {
    let mut rig = paced().await;
    let config = rig
        .config("holes.mp3")
        .with_seek_policy(SeekPolicy::Relaxed { fill_gaps: false });
    let session = rig.open(config, ScriptedRenderer::new()).await;
    rig.events
        .next_event(|e| matches!(e, SessionEvent::AssetLoaded { .. }))
        .await;

    session.seek_bytes(800_000).unwrap();
    rig.events
        .next_event(|e| matches!(e, SessionEvent::PersistenceFailed { .. }))
        .await;
    assert!(!rig.destination("holes.mp3").exists());
}
