//! Subscription channel abstraction.
//!
//! A `ChannelConnector` opens one push channel per project; the coordinator
//! owns the resulting `Channel` exclusively and closes it on teardown.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// Identifier of the project a sync session is bound to.
///
/// The id is embedded in the channel address, so it must be non-empty and
/// free of path separators and whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(value: impl Into<String>) -> Result<Self, SyncError> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("must not be empty")
        } else if value.contains('/') {
            Some("must not contain '/'")
        } else if value.chars().any(char::is_whitespace) {
            Some("must not contain whitespace")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(SyncError::InvalidProjectId { value, reason }),
            None => Ok(Self(value)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProjectId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ProjectId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

/// An open push channel.
#[async_trait]
pub trait Channel: Send {
    /// Wait for the next text frame.
    ///
    /// Returns `None` once the peer has closed the channel and
    /// `Some(Err(_))` on a transport failure; both end the channel.
    /// Implementations must be cancel safe: the coordinator drops an
    /// in-flight `recv` whenever another event wins the race.
    async fn recv(&mut self) -> Option<Result<String, SyncError>>;

    /// Close the channel. Best effort; errors are swallowed.
    async fn close(&mut self);
}

/// Opens push channels for projects.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a channel for `project_id`. Resolves once the channel is open.
    async fn connect(&self, project_id: &ProjectId) -> Result<Box<dyn Channel>, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_accepts_plain_ids() {
        let id = ProjectId::new("PVT_kwDOABC123").unwrap();
        assert_eq!(id.as_str(), "PVT_kwDOABC123");
        assert_eq!(id.to_string(), "PVT_kwDOABC123");
    }

    #[test]
    fn test_project_id_rejects_empty() {
        let err = ProjectId::new("").unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidProjectId { reason: "must not be empty", .. }
        ));
    }

    #[test]
    fn test_project_id_rejects_path_separator() {
        assert!(ProjectId::new("a/b").is_err());
        assert!(ProjectId::new("a b").is_err());
    }

    #[test]
    fn test_project_id_from_str_trims() {
        let id: ProjectId = "  P1 ".parse().unwrap();
        assert_eq!(id.as_str(), "P1");
    }

    #[test]
    fn test_project_id_serializes_as_string() {
        let id = ProjectId::new("P2").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"P2\"");
        assert!(serde_json::from_str::<ProjectId>("\"\"").is_err());
    }
}
