use std::{path::PathBuf, sync::Arc, time::Duration};

use rstest::*;
use tapedeck::{
    Session, SessionConfig,
    events::{EventBus, Notification, SessionEvent},
    play::mock::ScriptedRenderer,
};
use tapedeck_test_utils::{
    AssetServer, AssetServerLog, TestHttpServer, asset_server::ASSET_PATH, init_tracing,
};
use tempfile::TempDir;
use tokio::sync::broadcast;
use url::Url;

/// Common fixture for temporary directory
#[fixture]
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Collects notifications from a bus shared by one or more sessions.
pub struct Events {
    pub bus: EventBus,
    rx: broadcast::Receiver<Notification>,
}

impl Events {
    pub fn new() -> Self {
        let bus = EventBus::new(8192);
        let rx = bus.subscribe();
        Self { bus, rx }
    }

    /// Next notification matching `wanted`, skipping everything else.
    pub async fn next(&mut self, wanted: impl Fn(&Notification) -> bool) -> Notification {
        loop {
            match self.rx.recv().await {
                Ok(n) if wanted(&n) => return n,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    }

    pub async fn next_event(&mut self, wanted: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        self.next(|n| wanted(&n.event)).await.event
    }

    /// Everything already published.
    pub fn pending(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(n) => out.push(n),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return out,
            }
        }
    }
}

/// One HTTP asset, a destination directory and a pre-subscribed bus.
pub struct HttpRig {
    pub dir: TempDir,
    pub server: TestHttpServer,
    /// `Range` headers of every request the server saw.
    pub log: AssetServerLog,
    pub data: Arc<Vec<u8>>,
    pub events: Events,
}

impl HttpRig {
    pub async fn new(data: Vec<u8>, server: impl FnOnce(AssetServer) -> AssetServer) -> Self {
        init_tracing();
        let data = Arc::new(data);
        let server = server(AssetServer::new(data.as_ref().clone()));
        let log = server.log();
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
            server: TestHttpServer::new(server.router()).await,
            log,
            data,
            events: Events::new(),
        }
    }

    pub fn url(&self) -> Url {
        self.server.url(ASSET_PATH)
    }

    pub fn destination(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn config(&self, name: &str) -> SessionConfig {
        SessionConfig::new(self.url(), self.destination(name))
            .with_temp_dir(self.dir.path())
            .with_sync_writes(false)
            .with_bus(self.events.bus.clone())
    }

    pub async fn open(&self, config: SessionConfig, renderer: ScriptedRenderer) -> Session {
        Session::open(config, renderer).await.unwrap()
    }
}

/// Polls `done` until it holds.
pub async fn eventually(mut done: impl FnMut() -> bool) {
    while !done() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
