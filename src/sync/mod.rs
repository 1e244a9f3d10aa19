//! Real-time board synchronization.
//!
//! ## Overview
//!
//! A `SyncCoordinator` keeps the cached views of one project fresh. It
//! prefers a server-push channel and falls back to polling whenever the
//! channel is connecting, closed or broken, so there is never a gap where
//! neither data path is active while a project is selected.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐ set_target ┌─────────────────────────────────────────────────┐
//! │    UI    │ ─────────> │  coordinator.rs  (SyncCoordinator, driver task) │
//! │          │ <───────── │         │ owns one                              │
//! └──────────┘  watch     │         v                                       │
//!             SyncSnapshot│  session.rs  (Phase + poll/reconnect side table)│
//!                         │    │ connect()          │ invalidate()          │
//!                         │    v                    v                       │
//!                         │  channel.rs / ws.rs   cache.rs                  │
//!                         │  (ChannelConnector)   (QueryCache)              │
//!                         └─────────────────────────────────────────────────┘
//! ```
//!
//! | Module        | Responsibility                                           |
//! |---------------|----------------------------------------------------------|
//! | `status`      | `SyncStatus`, `SyncSnapshot`                             |
//! | `signal`      | frame decoding, `SignalKind`                             |
//! | `backoff`     | `ReconnectPolicy`                                        |
//! | `cache`       | `QueryKey`, `QueryCache`, `InMemoryQueryCache`           |
//! | `channel`     | `ProjectId`, `Channel`, `ChannelConnector`               |
//! | `ws`          | WebSocket `ChannelConnector`                             |
//! | `clock`       | `Clock` for freshness timestamps                         |

pub mod backoff;
pub mod cache;
pub mod channel;
pub mod clock;
pub mod coordinator;
mod session;
pub mod signal;
pub mod status;
pub mod ws;

pub use backoff::ReconnectPolicy;
pub use cache::{InMemoryQueryCache, QueryCache, QueryKey, QueryScope};
pub use channel::{Channel, ChannelConnector, ProjectId};
pub use clock::{Clock, SystemClock};
pub use coordinator::{PollStart, SyncCoordinator, SyncOptions};
pub use signal::{InvalidationSignal, SignalKind, SignalSource};
pub use status::{SyncSnapshot, SyncStatus};
pub use ws::WsConnector;
