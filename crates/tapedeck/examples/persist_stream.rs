//! Example: stream a remote file to disk while "playing" it.
//!
//! Uses the scripted renderer from `tapedeck-play`, which consumes bytes at a
//! fixed pace instead of producing sound. Every notification is logged until
//! the file is persisted and playback has finished.
//!
//! Run with:
//! ```
//! cargo run -p tapedeck --example persist_stream --features test-utils [URL] [DEST]
//! ```

use std::{env::args, error::Error, path::PathBuf, time::Duration};

use tapedeck::{play::mock::ScriptedRenderer, prelude::*};
use tracing::{info, metadata::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::default()
                .add_directive("tapedeck=info".parse()?)
                .add_directive("tapedeck_stream=info".parse()?)
                .add_directive("tapedeck_net=warn".parse()?)
                .add_directive(LevelFilter::INFO.into()),
        )
        .with_line_number(false)
        .with_file(false)
        .init();

    let url = args()
        .nth(1)
        .unwrap_or_else(|| "https://download.samplelib.com/mp3/sample-15s.mp3".to_string());
    let destination = args()
        .nth(2)
        .map_or_else(|| std::env::temp_dir().join("tapedeck-sample.mp3"), PathBuf::from);

    info!(%url, destination = %destination.display(), "opening");

    let bus = EventBus::new(256);
    let mut events = bus.subscribe();
    let config = SessionConfig::new(Url::parse(&url)?, destination)
        .with_bus(bus)
        .with_progress_step(256 * 1024);
    let renderer = ScriptedRenderer::new()
        .with_read_size(4 * 1024)
        .with_tick(Duration::from_millis(2));
    let session = Session::open(config, renderer).await?;

    let mut persisted = false;
    let mut finished = false;
    while !(persisted && finished) {
        let notification = match events.recv().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "event stream interrupted");
                continue;
            }
        };
        match notification.event {
            SessionEvent::AssetLoaded { .. } => {
                info!(duration = ?session.duration(), "loaded, starting playback");
                session.play();
            }
            SessionEvent::AssetPersisted { path } => {
                info!(path = %path.display(), "persisted");
                persisted = true;
            }
            SessionEvent::PlaybackFinished => {
                info!(position = ?session.current_time(), "playback finished");
                finished = true;
            }
            SessionEvent::AssetFailedToLoad { reason }
            | SessionEvent::PersistenceFailed { reason } => {
                warn!(%reason, "session failed");
                break;
            }
            SessionEvent::DownloadProgress { offset, total } => {
                info!(offset, ?total, buffered = ?session.time_buffered(), "downloading");
            }
            event => info!(?event),
        }
    }

    session.destroy();
    Ok(())
}
