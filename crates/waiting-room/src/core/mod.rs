pub mod bridge;
pub mod conn;
pub mod manager;
pub mod progress;
pub mod queue;
pub mod slot;

pub use conn::{ActiveConnection, ConnectionMeta};
pub use manager::{Admission, LeaveOutcome, QueueManager};
pub use progress::{Progress, QueueStatus, VirtualTotal};
pub use queue::{WaitEntry, WaitQueue};
pub use slot::{ActiveSlot, Occupant, ReleaseReason};
