use thiserror::Error;

/// Errors surfaced by the queue manager.
///
/// Runtime timeouts and unknown clients are ordinary state transitions and are
/// reported through return values, so only construction can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
	#[error("invalid queue configuration: {0}")]
	InvalidConfig(String),

	#[error("recycler supplied but no recycle target configured for queue {queue}")]
	MissingRecycleTarget { queue: String },
}

/// Failure reported by a [`ResourceRecycler`](crate::ResourceRecycler).
///
/// Never propagated past the spawned notification task; it is only logged.
#[derive(Error, Debug)]
pub enum RecycleError {
	#[error("recycle request for {target} failed: {reason}")]
	RequestFailed { target: String, reason: String },

	#[error("recycle request for {target} rejected with status {status}")]
	Rejected { target: String, status: u16 },
}
