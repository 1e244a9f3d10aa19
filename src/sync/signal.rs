//! Invalidation signals and channel frame decoding.
//!
//! The server pushes JSON frames whose `type` field (or `kind`) names the
//! event, for example `{"type": "task_created", "data": {...}}`. Only the
//! discriminator matters here; payloads are refetched through the cache.

use serde::Deserialize;

use crate::errors::SyncError;

/// Event kind carried by a channel frame or synthesized by a poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    InitialData,
    Refresh,
    TaskUpdate,
    TaskCreated,
    StatusChanged,
    /// Kinds this client does not know yet. Ignored.
    Unrecognized(String),
}

impl SignalKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "initial_data" => Self::InitialData,
            "refresh" => Self::Refresh,
            "task_update" => Self::TaskUpdate,
            "task_created" => Self::TaskCreated,
            "status_changed" => Self::StatusChanged,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Whether this kind marks the project's cached views stale.
    ///
    /// All recognized kinds currently trigger the same invalidation.
    pub fn invalidates(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InitialData => "initial_data",
            Self::Refresh => "refresh",
            Self::TaskUpdate => "task_update",
            Self::TaskCreated => "task_created",
            Self::StatusChanged => "status_changed",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    Channel,
    Poll,
}

/// A transient request to mark cached data stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationSignal {
    pub kind: SignalKind,
    pub source: SignalSource,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: Option<String>,
    kind: Option<String>,
}

impl InvalidationSignal {
    /// Decode a channel frame. `type` wins over `kind` when both are present.
    pub fn decode(text: &str) -> Result<Self, SyncError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(SyncError::Decode)?;
        let raw = envelope
            .event_type
            .or(envelope.kind)
            .ok_or_else(|| SyncError::Decode(serde::de::Error::missing_field("type")))?;
        Ok(Self {
            kind: SignalKind::parse(&raw),
            source: SignalSource::Channel,
        })
    }

    /// The signal a poll tick stands for.
    pub fn poll_tick() -> Self {
        Self {
            kind: SignalKind::Refresh,
            source: SignalSource::Poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_recognized_kinds() {
        let cases = [
            ("initial_data", SignalKind::InitialData),
            ("refresh", SignalKind::Refresh),
            ("task_update", SignalKind::TaskUpdate),
            ("task_created", SignalKind::TaskCreated),
            ("status_changed", SignalKind::StatusChanged),
        ];
        for (raw, expected) in cases {
            let frame = format!(r#"{{"type":"{}","data":{{"id":7}}}}"#, raw);
            let signal = InvalidationSignal::decode(&frame).unwrap();
            assert_eq!(signal.kind, expected);
            assert_eq!(signal.source, SignalSource::Channel);
            assert!(signal.kind.invalidates());
        }
    }

    #[test]
    fn test_decode_accepts_kind_alias() {
        let signal = InvalidationSignal::decode(r#"{"kind":"refresh"}"#).unwrap();
        assert_eq!(signal.kind, SignalKind::Refresh);
    }

    #[test]
    fn test_decode_prefers_type_when_both_keys_present() {
        let signal = InvalidationSignal::decode(r#"{"type":"refresh","kind":"full"}"#).unwrap();
        assert_eq!(signal.kind, SignalKind::Refresh);

        let signal =
            InvalidationSignal::decode(r#"{"kind":"task_created","type":"status_changed"}"#)
                .unwrap();
        assert_eq!(signal.kind, SignalKind::StatusChanged);
    }

    #[test]
    fn test_decode_missing_discriminator_names_the_field() {
        let err = InvalidationSignal::decode(r#"{"data":{"id":1}}"#).unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
        assert!(err.to_string().contains("missing field `type`"));
    }

    #[test]
    fn test_unrecognized_kind_is_not_an_error() {
        let signal = InvalidationSignal::decode(r#"{"type":"weather_report"}"#).unwrap();
        assert_eq!(
            signal.kind,
            SignalKind::Unrecognized("weather_report".to_string())
        );
        assert!(!signal.kind.invalidates());
        assert_eq!(signal.kind.to_string(), "weather_report");
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        for frame in ["not json", "[1,2,3]", r#"{"data":{}}"#, r#"{"type":42}"#, ""] {
            let err = InvalidationSignal::decode(frame).unwrap_err();
            assert!(matches!(err, SyncError::Decode(_)), "frame {:?}", frame);
        }
    }

    #[test]
    fn test_poll_tick_is_a_refresh() {
        let signal = InvalidationSignal::poll_tick();
        assert_eq!(signal.kind, SignalKind::Refresh);
        assert_eq!(signal.source, SignalSource::Poll);
        assert!(signal.kind.invalidates());
    }
}
