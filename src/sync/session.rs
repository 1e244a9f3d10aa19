//! One sync session per target project.
//!
//! The session's state is an explicit tagged value (`Phase`) that owns the
//! channel side of the connection; the poll timer and pending reconnect live
//! in a side table next to it. Every transition is a method that matches on
//! the phase, so a missing cleanup shows up as a failed invariant check
//! rather than a timer quietly left running.
//!
//! ```text
//!            start                   open ok
//!   ──────────────────> Connecting ─────────────> Connected ──┐ frame
//!                        ^     │                   │    ^─────┘
//!          reconnect due │     │ open failed /     │ closed / error
//!                        │     v timeout           v
//!                        └──── Polling <───────────┘
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use super::cache::{QueryCache, QueryKey};
use super::channel::{Channel, ChannelConnector, ProjectId};
use super::clock::Clock;
use super::coordinator::{PollStart, SyncOptions};
use super::signal::InvalidationSignal;
use super::status::{SyncSnapshot, SyncStatus};
use crate::errors::SyncError;

/// Upper bound on waiting for a channel to acknowledge `close`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Collaborators shared by every session of one coordinator.
pub(crate) struct SyncContext {
    pub connector: Arc<dyn ChannelConnector>,
    pub cache: Arc<dyn QueryCache>,
    pub clock: Arc<dyn Clock>,
    pub options: SyncOptions,
}

type ConnectAttempt = BoxFuture<'static, Result<Box<dyn Channel>, SyncError>>;

enum Phase {
    /// A connection attempt is in flight; dropping it aborts the attempt.
    Connecting(ConnectAttempt),
    Connected(Box<dyn Channel>),
    /// No channel; a reconnect is scheduled.
    Polling,
}

/// Something the session has to react to.
pub(crate) enum SessionEvent {
    Opened(Box<dyn Channel>),
    OpenFailed(SyncError),
    Frame(String),
    /// The open channel ended, with the transport error if there was one.
    ChannelLost(Option<SyncError>),
    PollTick,
    ReconnectDue,
}

struct PendingReconnect {
    sleep: Pin<Box<Sleep>>,
    delay: Duration,
}

pub(crate) struct Session {
    ctx: Arc<SyncContext>,
    target: ProjectId,
    phase: Phase,
    poll: Option<Interval>,
    reconnect: Option<PendingReconnect>,
    reconnect_attempt: u32,
    last_update: Option<DateTime<Utc>>,
}

impl Session {
    /// Enter `connecting` for `target`: start the first attempt and, under
    /// the default policy, the poll timer.
    pub(crate) fn start(
        ctx: Arc<SyncContext>,
        target: ProjectId,
        last_update: Option<DateTime<Utc>>,
    ) -> Self {
        info!(project_id = %target, "Starting sync session");
        let poll_start = ctx.options.poll_start;
        let attempt = connect_attempt(&ctx, &target);
        let mut session = Self {
            ctx,
            target,
            phase: Phase::Connecting(attempt),
            poll: None,
            reconnect: None,
            reconnect_attempt: 0,
            last_update,
        };
        if poll_start == PollStart::Immediate {
            session.start_polling();
        }
        session
    }

    pub(crate) fn target(&self) -> &ProjectId {
        &self.target
    }

    pub(crate) fn status(&self) -> SyncStatus {
        match self.phase {
            Phase::Connecting(_) => SyncStatus::Connecting,
            Phase::Connected(_) => SyncStatus::Connected,
            Phase::Polling => SyncStatus::Polling,
        }
    }

    pub(crate) fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            target: Some(self.target.clone()),
            status: self.status(),
            last_update: self.last_update,
            reconnect_attempt: self.reconnect_attempt,
            polling: self.poll.is_some(),
            next_reconnect: self.reconnect.as_ref().map(|r| r.delay),
        }
    }

    /// Wait for the next channel, poll or reconnect event.
    ///
    /// Cancel safe: dropping the future loses no event.
    pub(crate) async fn next_event(&mut self) -> SessionEvent {
        let Self {
            phase,
            poll,
            reconnect,
            ..
        } = self;
        tokio::select! {
            biased;
            event = phase_event(phase) => event,
            _ = reconnect_due(reconnect) => SessionEvent::ReconnectDue,
            _ = poll_tick(poll) => SessionEvent::PollTick,
        }
    }

    pub(crate) async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened(channel) => self.on_open(channel),
            SessionEvent::OpenFailed(err) => self.on_open_failed(err),
            SessionEvent::Frame(frame) => self.on_frame(&frame),
            SessionEvent::ChannelLost(err) => self.on_channel_lost(err),
            SessionEvent::PollTick => self.apply(InvalidationSignal::poll_tick()),
            SessionEvent::ReconnectDue => self.on_reconnect_due(),
        }
        debug_assert_eq!(self.check_invariants(), Ok(()));
    }

    /// Close the channel, clear the poll timer, clear the pending reconnect.
    ///
    /// Returns the last freshness timestamp so it survives the session.
    pub(crate) async fn teardown(mut self) -> Option<DateTime<Utc>> {
        match std::mem::replace(&mut self.phase, Phase::Polling) {
            Phase::Connected(mut channel) => close_channel(&self.target, channel.as_mut()).await,
            Phase::Connecting(_) => debug!(project_id = %self.target, "Aborting connection attempt"),
            Phase::Polling => {}
        }
        self.poll = None;
        self.reconnect = None;
        info!(project_id = %self.target, "Sync session torn down");
        self.last_update
    }

    fn on_open(&mut self, channel: Box<dyn Channel>) {
        match self.phase {
            Phase::Connecting(_) => {
                self.phase = Phase::Connected(channel);
                self.stop_polling();
                self.reconnect = None;
                self.reconnect_attempt = 0;
                self.touch();
                info!(project_id = %self.target, "Channel open, live updates active");
            }
            Phase::Connected(_) | Phase::Polling => {
                warn!(project_id = %self.target, "Discarding channel opened outside an attempt");
            }
        }
    }

    fn on_open_failed(&mut self, err: SyncError) {
        match self.phase {
            Phase::Connecting(_) => {
                warn!(
                    project_id = %self.target,
                    attempt = self.reconnect_attempt,
                    error = %err,
                    "Channel failed to open, falling back to polling"
                );
                self.fall_back();
            }
            Phase::Connected(_) | Phase::Polling => {
                debug!(project_id = %self.target, error = %err, "Ignoring stale open failure");
            }
        }
    }

    fn on_frame(&mut self, frame: &str) {
        match InvalidationSignal::decode(frame) {
            Ok(signal) => self.apply(signal),
            Err(err) => {
                warn!(project_id = %self.target, error = %err, "Skipping malformed frame");
            }
        }
    }

    fn on_channel_lost(&mut self, err: Option<SyncError>) {
        match std::mem::replace(&mut self.phase, Phase::Polling) {
            Phase::Connected(mut channel) => {
                match &err {
                    Some(err) => warn!(project_id = %self.target, error = %err, "Channel failed"),
                    None => info!(project_id = %self.target, "Channel closed"),
                }
                self.fall_back();
                // The dead channel is closed off the driver so polling starts now.
                let target = self.target.clone();
                tokio::spawn(async move { close_channel(&target, channel.as_mut()).await });
            }
            other => {
                self.phase = other;
                debug!(project_id = %self.target, "Ignoring loss of a channel that is not open");
            }
        }
    }

    fn on_reconnect_due(&mut self) {
        self.reconnect = None;
        match self.phase {
            Phase::Polling => {
                info!(
                    project_id = %self.target,
                    attempt = self.reconnect_attempt,
                    "Reconnecting"
                );
                self.phase = Phase::Connecting(connect_attempt(&self.ctx, &self.target));
            }
            Phase::Connecting(_) | Phase::Connected(_) => {
                debug!(project_id = %self.target, "Dropping reconnect that is no longer needed");
            }
        }
    }

    /// Enter `polling` after a failure to reach or stay `connected`.
    fn fall_back(&mut self) {
        self.phase = Phase::Polling;
        self.start_polling();
        self.schedule_reconnect();
    }

    fn apply(&mut self, signal: InvalidationSignal) {
        if !signal.kind.invalidates() {
            debug!(project_id = %self.target, kind = %signal.kind, "Ignoring unrecognized signal");
            return;
        }
        for key in QueryKey::scoped_to(&self.target) {
            self.ctx.cache.invalidate(&key);
        }
        self.touch();
        debug!(
            project_id = %self.target,
            kind = %signal.kind,
            source = ?signal.source,
            "Invalidated project queries"
        );
    }

    fn start_polling(&mut self) {
        if self.poll.is_some() {
            return;
        }
        let period = self.ctx.options.poll_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll = Some(interval);
        // Polling is a working data path, so it counts as fresh.
        self.touch();
        debug!(project_id = %self.target, period = ?period, "Polling started");
    }

    fn stop_polling(&mut self) {
        if self.poll.take().is_some() {
            debug!(project_id = %self.target, "Polling stopped");
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.ctx.options.reconnect.next_delay(self.reconnect_attempt);
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        self.reconnect = Some(PendingReconnect {
            sleep: Box::pin(tokio::time::sleep(delay)),
            delay,
        });
        debug!(
            project_id = %self.target,
            attempt = self.reconnect_attempt,
            delay = ?delay,
            "Reconnect scheduled"
        );
    }

    fn touch(&mut self) {
        self.last_update = Some(self.ctx.clock.now());
    }

    fn check_invariants(&self) -> Result<(), &'static str> {
        match &self.phase {
            Phase::Connected(_) if self.poll.is_some() => Err("poll timer running while connected"),
            Phase::Connected(_) if self.reconnect.is_some() => {
                Err("reconnect pending while connected")
            }
            Phase::Connected(_) if self.reconnect_attempt != 0 => {
                Err("reconnect attempt not reset after open")
            }
            Phase::Connecting(_) if self.reconnect.is_some() => {
                Err("reconnect pending during an attempt")
            }
            Phase::Connecting(_)
                if self.ctx.options.poll_start == PollStart::Immediate && self.poll.is_none() =>
            {
                Err("no poll timer while connecting")
            }
            Phase::Polling if self.poll.is_none() => Err("polling without a poll timer"),
            Phase::Polling if self.reconnect.is_none() => Err("polling without a pending reconnect"),
            _ => Ok(()),
        }
    }
}

fn connect_attempt(ctx: &SyncContext, target: &ProjectId) -> ConnectAttempt {
    let connector = Arc::clone(&ctx.connector);
    let timeout = ctx.options.connect_timeout;
    let target = target.clone();
    Box::pin(async move {
        match tokio::time::timeout(timeout, connector.connect(&target)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::ConnectTimeout {
                project_id: target.to_string(),
                timeout,
            }),
        }
    })
}

async fn close_channel(target: &ProjectId, channel: &mut dyn Channel) {
    if tokio::time::timeout(CLOSE_TIMEOUT, channel.close()).await.is_err() {
        warn!(project_id = %target, "Channel did not close in time, dropping it");
    }
}

async fn phase_event(phase: &mut Phase) -> SessionEvent {
    match phase {
        Phase::Connecting(attempt) => match attempt.as_mut().await {
            Ok(channel) => SessionEvent::Opened(channel),
            Err(err) => SessionEvent::OpenFailed(err),
        },
        Phase::Connected(channel) => match channel.recv().await {
            Some(Ok(frame)) => SessionEvent::Frame(frame),
            Some(Err(err)) => SessionEvent::ChannelLost(Some(err)),
            None => SessionEvent::ChannelLost(None),
        },
        Phase::Polling => std::future::pending().await,
    }
}

async fn reconnect_due(reconnect: &mut Option<PendingReconnect>) {
    match reconnect {
        Some(pending) => pending.sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn poll_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
