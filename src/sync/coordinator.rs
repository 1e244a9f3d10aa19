//! `SyncCoordinator`: public handle plus the driver task that owns the
//! current session.
//!
//! The driver is a single tokio task. Commands (`set_target`, shutdown) and
//! session events (channel frames, timer firings) are processed one at a
//! time, commands first, so a retarget always wins over pending events of
//! the session it replaces. Dropping a session drops its attempt future,
//! channel and timers, which is what keeps stale events from ever reaching
//! the new session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::backoff::ReconnectPolicy;
use super::cache::QueryCache;
use super::channel::{ChannelConnector, ProjectId};
use super::clock::{Clock, SystemClock};
use super::session::{Session, SessionEvent, SyncContext};
use super::status::{SyncSnapshot, SyncStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// When the poll timer starts for a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStart {
    /// Poll from activation until the channel opens (default).
    #[default]
    Immediate,
    /// Poll only after the first attempt fails.
    OnFailure,
}

impl std::fmt::Display for PollStart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollStart::Immediate => write!(f, "immediate"),
            PollStart::OnFailure => write!(f, "on_failure"),
        }
    }
}

impl std::str::FromStr for PollStart {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "immediate" => Ok(PollStart::Immediate),
            "on_failure" | "on-failure" => Ok(PollStart::OnFailure),
            _ => anyhow::bail!(
                "Invalid poll start '{}'. Valid values: immediate, on_failure",
                s
            ),
        }
    }
}

/// Timing knobs of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub poll_interval: Duration,
    /// An attempt that is not open after this long counts as failed.
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub poll_start: PollStart,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            poll_start: PollStart::default(),
        }
    }
}

/// Shortest poll period and connect timeout a coordinator runs with.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

impl SyncOptions {
    /// Copy with zero durations raised to `MIN_PERIOD`.
    ///
    /// A zero poll period would panic the timer inside the driver task.
    pub fn sanitized(self) -> Self {
        let mut options = self;
        if options.poll_interval < MIN_PERIOD {
            warn!(requested = ?options.poll_interval, minimum = ?MIN_PERIOD, "Poll interval raised");
            options.poll_interval = MIN_PERIOD;
        }
        if options.connect_timeout < MIN_PERIOD {
            warn!(requested = ?options.connect_timeout, minimum = ?MIN_PERIOD, "Connect timeout raised");
            options.connect_timeout = MIN_PERIOD;
        }
        options
    }
}

enum Command {
    SetTarget(Option<ProjectId>),
    Shutdown,
}

/// Keeps the cached views of one project fresh, preferring a push channel
/// and degrading to polling.
///
/// Must be created inside a tokio runtime. Dropping the handle tears the
/// session down in the background; `shutdown` does the same and waits.
pub struct SyncCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SyncSnapshot>,
    driver: JoinHandle<()>,
}

impl SyncCoordinator {
    pub fn spawn(
        connector: Arc<dyn ChannelConnector>,
        cache: Arc<dyn QueryCache>,
        options: SyncOptions,
    ) -> Self {
        Self::spawn_with_clock(connector, cache, Arc::new(SystemClock), options)
    }

    pub fn spawn_with_clock(
        connector: Arc<dyn ChannelConnector>,
        cache: Arc<dyn QueryCache>,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SyncSnapshot::default());
        let driver = Driver {
            ctx: Arc::new(SyncContext {
                connector,
                cache,
                clock,
                options: options.sanitized(),
            }),
            commands: commands_rx,
            publisher: snapshot_tx,
            session: None,
            last_update: None,
        };
        Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
            driver: tokio::spawn(driver.run()),
        }
    }

    /// Activate (`Some`), retarget (different `Some`) or deactivate (`None`).
    /// Setting the current target again is a no-op.
    pub fn set_target(&self, target: Option<ProjectId>) {
        if self.commands.send(Command::SetTarget(target)).is_err() {
            warn!("Sync driver is gone, ignoring target change");
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.snapshot.borrow().status
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.snapshot.borrow().last_update
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified after every visible change.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshot.clone()
    }

    /// Deactivate and stop the driver task.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.driver.await {
            warn!(error = %e, "Sync driver ended abnormally");
        }
    }
}

enum Input {
    Command(Option<Command>),
    Event(SessionEvent),
}

struct Driver {
    ctx: Arc<SyncContext>,
    commands: mpsc::UnboundedReceiver<Command>,
    publisher: watch::Sender<SyncSnapshot>,
    session: Option<Session>,
    /// Freshness of the last torn-down session, shown while disconnected.
    last_update: Option<DateTime<Utc>>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            let input = match self.session.as_mut() {
                Some(session) => tokio::select! {
                    biased;
                    command = self.commands.recv() => Input::Command(command),
                    event = session.next_event() => Input::Event(event),
                },
                None => Input::Command(self.commands.recv().await),
            };

            match input {
                Input::Command(Some(Command::SetTarget(target))) => self.retarget(target).await,
                Input::Command(Some(Command::Shutdown)) | Input::Command(None) => {
                    self.retarget(None).await;
                    self.publish();
                    break;
                }
                Input::Event(event) => {
                    if let Some(session) = self.session.as_mut() {
                        session.handle(event).await;
                    }
                }
            }
            self.publish();
        }
        debug!("Sync driver stopped");
    }

    async fn retarget(&mut self, target: Option<ProjectId>) {
        if self.session.as_ref().map(Session::target) == target.as_ref() {
            return;
        }
        if let Some(old) = self.session.take() {
            self.last_update = old.teardown().await;
        }
        if let Some(target) = target {
            self.session = Some(Session::start(
                Arc::clone(&self.ctx),
                target,
                self.last_update,
            ));
        }
    }

    fn publish(&self) {
        let snapshot = match &self.session {
            Some(session) => session.snapshot(),
            None => SyncSnapshot {
                last_update: self.last_update,
                ..SyncSnapshot::default()
            },
        };
        self.publisher.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
