//! Observable connectivity state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::channel::ProjectId;

/// Connectivity state of a sync coordinator.
///
/// | Status         | Channel    | Poll timer | Meaning for the UI            |
/// |----------------|------------|------------|-------------------------------|
/// | `Disconnected` | none       | off        | no project selected           |
/// | `Connecting`   | attempting | on*        | syncing, upgrade in flight    |
/// | `Connected`    | open       | off        | live updates                  |
/// | `Polling`      | none       | on         | syncing, reconnect scheduled  |
///
/// *unless the poll start policy is `on_failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Polling,
}

impl SyncStatus {
    /// True when updates arrive over the push channel.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// True when a target is set but the push channel is not open.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Connecting | Self::Polling)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Disconnected => write!(f, "disconnected"),
            SyncStatus::Connecting => write!(f, "connecting"),
            SyncStatus::Connected => write!(f, "connected"),
            SyncStatus::Polling => write!(f, "polling"),
        }
    }
}

/// Point-in-time view of a coordinator, published after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub target: Option<ProjectId>,
    pub status: SyncStatus,
    /// Most recent freshness event. Kept after deactivation for display.
    pub last_update: Option<DateTime<Utc>>,
    pub reconnect_attempt: u32,
    /// Whether the poll timer is running.
    pub polling: bool,
    /// Delay of the pending reconnect, if one is scheduled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_reconnect: Option<Duration>,
}
