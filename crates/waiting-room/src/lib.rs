//! Virtual waiting room for a single-tenant backend.
//!
//! One [`QueueManager`] guards one exclusive resource: a single client holds
//! the active slot for at most `max_active_time` while everyone else waits in
//! a FIFO queue with an estimated access time. The reverse proxy asks
//! [`QueueManager::can_access`] before forwarding, hands live upgrades to
//! [`QueueManager::track_connection`], and the waiting page polls
//! [`QueueManager::heartbeat`].

pub mod config;
pub mod core;
pub mod error;
pub mod recycle;
pub mod snapshot;
pub mod types;

pub use config::QueueConfig;
pub use crate::core::conn::ConnectionMeta;
pub use crate::core::manager::{Admission, LeaveOutcome, QueueManager};
pub use crate::core::progress::{Progress, QueueStatus};
pub use crate::core::queue::WaitEntry;
pub use crate::core::slot::ReleaseReason;
pub use error::{QueueError, RecycleError};
pub use recycle::ResourceRecycler;
pub use snapshot::{ActiveSnapshot, AdminSnapshot, ConnectionInfo, EntrySnapshot};
pub use types::{ClientId, ConnectionId, GrantId};
