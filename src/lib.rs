pub mod errors;
pub mod logging;
pub mod sync;
pub mod sync_config;

pub use errors::{ConfigError, SyncError};
pub use sync::{
    InMemoryQueryCache, PollStart, ProjectId, QueryCache, QueryKey, ReconnectPolicy,
    SyncCoordinator, SyncOptions, SyncSnapshot, SyncStatus, WsConnector,
};
