//! Shared fakes for coordinator tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use board_sync::errors::SyncError;
use board_sync::sync::{Channel, ChannelConnector, Clock, QueryCache, QueryKey};
use board_sync::{ProjectId, ReconnectPolicy, SyncOptions, SyncSnapshot};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

pub const BASE: Duration = Duration::from_millis(1000);
pub const MAX: Duration = Duration::from_millis(8000);
pub const POLL: Duration = Duration::from_millis(5000);
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

pub fn options() -> SyncOptions {
    SyncOptions {
        poll_interval: POLL,
        connect_timeout: CONNECT_TIMEOUT,
        reconnect: ReconnectPolicy::new(BASE, MAX),
        ..SyncOptions::default()
    }
}

pub fn pid(raw: &str) -> ProjectId {
    ProjectId::new(raw).unwrap()
}

/// What the next `connect` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Open,
    Refuse,
    /// Never resolves; only the connect timeout ends it.
    Hang,
}

/// Server side of a channel handed out by `ScriptedConnector`.
pub struct ChannelHandle {
    pub project_id: ProjectId,
    frames: Mutex<Option<mpsc::UnboundedSender<Result<String, SyncError>>>>,
    closed: Arc<AtomicBool>,
}

impl ChannelHandle {
    pub fn send(&self, frame: &str) {
        if let Some(tx) = self.frames.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(frame.to_string()));
        }
    }

    pub fn fail(&self, message: &str) {
        if let Some(tx) = self.frames.lock().unwrap().take() {
            let _ = tx.send(Err(SyncError::Transport(message.to_string())));
        }
    }

    /// Peer closes the channel.
    pub fn hang_up(&self) {
        self.frames.lock().unwrap().take();
    }

    /// Whether the client called `close`.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeChannel {
    frames: mpsc::UnboundedReceiver<Result<String, SyncError>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Channel for FakeChannel {
    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        self.frames.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector that follows a script of steps, then repeats `otherwise`.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Step>>,
    otherwise: Step,
    calls: Mutex<Vec<(ProjectId, Instant)>>,
    channels: Mutex<Vec<Arc<ChannelHandle>>>,
}

impl ScriptedConnector {
    pub fn new(script: impl IntoIterator<Item = Step>, otherwise: Step) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            otherwise,
            calls: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
        })
    }

    pub fn always(step: Step) -> Arc<Self> {
        Self::new([], step)
    }

    pub fn calls(&self) -> Vec<(ProjectId, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn channel(&self, index: usize) -> Arc<ChannelHandle> {
        Arc::clone(&self.channels.lock().unwrap()[index])
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    /// Channels handed out and not yet closed by the client.
    pub fn open_channels(&self) -> usize {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }
}

#[async_trait]
impl ChannelConnector for ScriptedConnector {
    async fn connect(&self, project_id: &ProjectId) -> Result<Box<dyn Channel>, SyncError> {
        self.calls
            .lock()
            .unwrap()
            .push((project_id.clone(), Instant::now()));
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.otherwise);

        match step {
            Step::Open => {
                let (tx, rx) = mpsc::unbounded_channel();
                let closed = Arc::new(AtomicBool::new(false));
                self.channels.lock().unwrap().push(Arc::new(ChannelHandle {
                    project_id: project_id.clone(),
                    frames: Mutex::new(Some(tx)),
                    closed: Arc::clone(&closed),
                }));
                Ok(Box::new(FakeChannel { frames: rx, closed }))
            }
            Step::Refuse => Err(SyncError::Connect {
                url: format!("fake://{}", project_id),
                message: "connection refused".to_string(),
            }),
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Cache that records every invalidation in order.
#[derive(Default)]
pub struct RecordingCache {
    calls: Mutex<Vec<QueryKey>>,
}

impl RecordingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn count_for(&self, project_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|key| key.project_id.as_str() == project_id)
            .count()
    }
}

impl QueryCache for RecordingCache {
    fn invalidate(&self, key: &QueryKey) {
        self.calls.lock().unwrap().push(key.clone());
    }
}

/// Wall clock that follows tokio's (possibly paused) time.
pub struct TokioClock {
    origin: DateTime<Utc>,
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            start: Instant::now(),
        })
    }

    pub fn origin(&self) -> DateTime<Utc> {
        self.origin
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().duration_since(self.start);
        self.origin + chrono::Duration::from_std(elapsed).unwrap()
    }
}

/// Wait for the published snapshot to satisfy `check`.
pub async fn wait_for(
    rx: &mut watch::Receiver<SyncSnapshot>,
    what: &str,
    check: impl FnMut(&SyncSnapshot) -> bool,
) -> SyncSnapshot {
    match tokio::time::timeout(Duration::from_secs(300), rx.wait_for(check)).await {
        Ok(Ok(snapshot)) => snapshot.clone(),
        Ok(Err(_)) => panic!("coordinator stopped while waiting for {}", what),
        Err(_) => panic!("timed out waiting for {}", what),
    }
}

/// Let the driver run, one virtual millisecond at a time, until `check` holds.
pub async fn until(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..60_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never held: {}", what);
}
