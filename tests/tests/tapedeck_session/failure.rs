//! Network and destination failures over HTTP.

use std::time::Duration;

use rstest::rstest;
use tapedeck::{
    Session, SessionConfig, SessionError,
    events::SessionEvent,
    play::{AssetLoadState, mock::ScriptedRenderer},
    stream::PersistenceState,
};
use tapedeck_test_utils::payload;

use crate::common::HttpRig;

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn aborted_body_leaves_only_the_temp_file() {
    let mut rig = HttpRig::new(payload(1_000_000, 4), |s| {
        s.with_chunk_size(100_000).with_fail_after_chunks(3)
    })
    .await;
    let session = rig.open(rig.config("partial.mp3"), ScriptedRenderer::new()).await;

    rig.events
        .next_event(|e| {
            matches!(
                e,
                SessionEvent::PersistenceFailed { .. } | SessionEvent::AssetFailedToLoad { .. }
            )
        })
        .await;

    assert_eq!(session.persistence_state(), PersistenceState::Failed);
    assert!(!rig.destination("partial.mp3").exists());

    let temp = session.temp_path();
    let cursor = session.write_cursor();
    assert!(cursor <= 300_000);
    assert_eq!(std::fs::metadata(&temp).unwrap().len(), cursor);
    let kept = std::fs::read(&temp).unwrap();
    assert!(kept[..] == rig.data[..kept.len()]);

    session.destroy();
    assert!(temp.exists());
}

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_asset_fails_to_load() {
    let mut rig = HttpRig::new(payload(1_000, 5), |s| s).await;
    let url = rig.server.url("/nothing-here.mp3");
    let config = SessionConfig::new(url, rig.destination("missing.mp3"))
        .with_temp_dir(rig.dir.path())
        .with_bus(rig.events.bus.clone());
    let session = Session::open(config, ScriptedRenderer::new()).await.unwrap();

    let event = rig
        .events
        .next_event(|e| matches!(e, SessionEvent::AssetFailedToLoad { .. }))
        .await;
    assert!(matches!(event, SessionEvent::AssetFailedToLoad { reason } if reason.contains("404")));
    assert_eq!(session.asset_load_state(), AssetLoadState::Failed);
    assert_eq!(session.persistence_state(), PersistenceState::Failed);
    assert!(!rig.destination("missing.mp3").exists());
}

#[rstest]
#[timeout(Duration::from_secs(30))]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_asset_still_persists() {
    let mut rig = HttpRig::new(payload(200_000, 6), |s| s).await;
    let session = rig
        .open(
            rig.config("rejected.mp3"),
            ScriptedRenderer::new().rejecting("unsupported container"),
        )
        .await;

    rig.events
        .next_event(|e| matches!(e, SessionEvent::AssetPersisted { .. }))
        .await;
    assert_eq!(session.asset_load_state(), AssetLoadState::Failed);
    assert!(std::fs::read(rig.destination("rejected.mp3")).unwrap() == *rig.data);
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn unwritable_destination_is_refused() {
    let rig = HttpRig::new(payload(1_000, 7), |s| s).await;
    let config = SessionConfig::new(rig.url(), rig.dir.path().join("no/such/dir/a.mp3"));

    let err = Session::open(config, ScriptedRenderer::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::DestinationNotWritable { .. }));
}
