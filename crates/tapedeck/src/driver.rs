#![forbid(unsafe_code)]

//! Feeds adapter signals and writer events into the coordinator.

use std::sync::Arc;

use futures::StreamExt;
use tapedeck_play::AdapterSignal;
use tapedeck_stream::WriterEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::coordinator::Coordinator;

/// Runs until the session is cancelled or both producers are gone.
///
/// Writer events take priority so a chunk that lands together with a
/// starvation signal is already counted when the signal is judged. Signals
/// are read through one long-lived stream: a kanal receive future that loses
/// a select race drops the value it was handed.
pub(crate) async fn drive(
    coordinator: Arc<Coordinator>,
    signals: kanal::AsyncReceiver<AdapterSignal>,
    mut writer_events: mpsc::UnboundedReceiver<WriterEvent>,
    cancel: CancellationToken,
) {
    let mut signal_stream = signals.stream();
    let mut writer_open = true;
    let mut signals_open = true;

    while writer_open || signals_open {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            event = writer_events.recv(), if writer_open => match event {
                Some(event) => coordinator.on_writer_event(event),
                None => {
                    trace!("writer event channel closed");
                    writer_open = false;
                }
            },

            signal = signal_stream.next(), if signals_open => match signal {
                Some(signal) => coordinator.on_adapter_signal(signal),
                None => {
                    trace!("adapter signal channel closed");
                    signals_open = false;
                }
            },
        }
    }
    debug!("session driver stopped");
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use rstest::rstest;
    use tapedeck_events::{Notifier, SessionEvent, SessionId};
    use tapedeck_play::{
        AssetLoadState, ByteTimeline, PlaybackAdapter, mock::ScriptedRenderer, signal_channel,
    };
    use tapedeck_storage::{TempAllocator, TempFile, TempFileOptions};
    use tempfile::TempDir;

    use super::*;
    use crate::{SeekPolicy, coordinator::CoordinatorParts};

    const WRITER_EVENTS: u64 = 20_000;
    const ADVANCES: u64 = 500;

    #[rstest]
    #[timeout(Duration::from_secs(20))]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn signals_survive_a_flood_of_writer_events() {
        let dir = TempDir::new().unwrap();
        let alloc = TempAllocator::new(dir.path());
        let file = TempFile::create(
            &alloc,
            TempFileOptions::new(alloc.allocate_temp_location(), CancellationToken::new())
                .with_sync_writes(false),
        )
        .unwrap();
        let (notifier, mut queue) = Notifier::channel(SessionId::next());
        let coordinator = Arc::new(Coordinator::new(CoordinatorParts {
            file,
            destination: dir.path().join("asset.mp3"),
            adapter: PlaybackAdapter::new(ScriptedRenderer::new()),
            notifier,
            policy: SeekPolicy::Conservative,
            timeline: ByteTimeline::new(16_000),
            emit_progress: true,
            volume: 1.0,
            looping: false,
        }));
        coordinator.begin_loading();

        let (signals_tx, signals_rx) = signal_channel();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(
            Arc::clone(&coordinator),
            signals_rx.to_async(),
            writer_rx,
            CancellationToken::new(),
        ));

        let renderer = thread::spawn(move || {
            signals_tx
                .send(AdapterSignal::Ready { duration: None })
                .unwrap();
            for step in 1..=ADVANCES {
                signals_tx
                    .send(AdapterSignal::Advanced { position: step })
                    .unwrap();
                if step % 50 == 0 {
                    thread::yield_now();
                }
            }
        });
        for offset in 0..WRITER_EVENTS {
            writer_tx
                .send(WriterEvent::Progress {
                    offset,
                    len: 1,
                    cursor: offset + 1,
                })
                .unwrap();
            if offset % 1_000 == 0 {
                tokio::task::yield_now().await;
            }
        }
        renderer.join().unwrap();
        drop(writer_tx);
        driver.await.unwrap();

        assert_eq!(coordinator.load_state(), AssetLoadState::Loaded);
        let events = queue.drain();
        let loaded = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::AssetLoaded { .. }))
            .count();
        let played = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::PlaybackProgress { .. }))
            .count();
        let downloaded = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::DownloadProgress { .. }))
            .count();
        assert_eq!(loaded, 1);
        assert_eq!(played as u64, ADVANCES);
        assert_eq!(downloaded as u64, WRITER_EVENTS);
    }
}
