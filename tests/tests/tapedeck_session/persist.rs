//! Full download while playing, over HTTP.

use std::time::Duration;

use rstest::rstest;
use tapedeck::{
    events::SessionEvent,
    play::{PlaybackState, mock::ScriptedRenderer},
    stream::PersistenceState,
};
use tapedeck_test_utils::payload;

use crate::common::HttpRig;

const TOTAL: usize = 1_000_000;
const CHUNK: usize = 100_000;

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plays_and_persists_exact_copy() {
    let mut rig = HttpRig::new(payload(TOTAL, 1), |s| {
        s.with_chunk_size(CHUNK)
            .with_chunk_delay(Duration::from_millis(20))
    })
    .await;
    let renderer = ScriptedRenderer::new().with_read_size(8_192);
    let session = rig.open(rig.config("copy.mp3"), renderer.clone()).await;
    let id = session.session_id();

    rig.events
        .next_event(|e| matches!(e, SessionEvent::AssetLoaded { .. }))
        .await;
    session.play();

    let (mut persisted, mut finished) = (false, false);
    while !(persisted && finished) {
        let n = rig
            .events
            .next(|n| {
                matches!(
                    n.event,
                    SessionEvent::AssetPersisted { .. } | SessionEvent::PlaybackFinished
                )
            })
            .await;
        assert_eq!(n.session, id);
        match n.event {
            SessionEvent::AssetPersisted { .. } => {
                assert!(!persisted);
                persisted = true;
            }
            _ => finished = true,
        }
    }
    assert_eq!(session.write_cursor(), TOTAL as u64);
    assert_eq!(session.total_length(), Some(TOTAL as u64));
    assert_eq!(session.persistence_state(), PersistenceState::Persisted);

    let on_disk = std::fs::read(rig.destination("copy.mp3")).unwrap();
    assert_eq!(on_disk.len(), TOTAL);
    assert!(on_disk == *rig.data);

    assert_eq!(renderer.rendered_bytes(), TOTAL as u64);
    assert_eq!(session.playback_state(), PlaybackState::Stopped);

    session.destroy();
    let again = rig
        .events
        .pending()
        .into_iter()
        .filter(|n| matches!(n.event, SessionEvent::AssetPersisted { .. }))
        .count();
    assert_eq!(again, 0);
}

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_is_ordered_and_reaches_total() {
    let mut rig = HttpRig::new(payload(300_000, 2), |s| s.with_chunk_size(30_000)).await;
    let session = rig
        .open(rig.config("progress.mp3"), ScriptedRenderer::new())
        .await;

    let mut last = 0;
    loop {
        let event = rig
            .events
            .next_event(|e| {
                matches!(
                    e,
                    SessionEvent::DownloadProgress { .. } | SessionEvent::AssetPersisted { .. }
                )
            })
            .await;
        match event {
            SessionEvent::DownloadProgress { offset, total } => {
                assert!(offset > last);
                assert_eq!(total, Some(300_000));
                last = offset;
            }
            _ => break,
        }
    }
    assert_eq!(last, 300_000);
    assert_eq!(session.write_cursor(), 300_000);
}
