use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::slot::ReleaseReason;
use crate::error::RecycleError;
use crate::types::ClientId;

/// Restarts (or otherwise resets) the backend resource after a grant ends.
///
/// Implementations typically call a deployment API. They run on their own
/// task, so a slow or failing recycle never delays the next promotion.
#[async_trait]
pub trait ResourceRecycler: Send + Sync + 'static {
	async fn recycle(&self, target: &str) -> Result<(), RecycleError>;
}

#[async_trait]
impl<F> ResourceRecycler for F
where
	F: Fn(&str) -> Result<(), RecycleError> + Send + Sync + 'static,
{
	async fn recycle(&self, target: &str) -> Result<(), RecycleError> {
		self(target)
	}
}

/// Fires the recycle request in the background and logs the outcome.
pub(crate) fn dispatch(recycler: Arc<dyn ResourceRecycler>, queue: &str, target: &str, client_id: ClientId, reason: ReleaseReason) {
	let queue = queue.to_string();
	let target = target.to_string();

	tokio::spawn(async move {
		match recycler.recycle(&target).await {
			Ok(()) => debug!(queue = %queue, resource = %target, client = %client_id, reason = %reason, "Backend resource recycled"),
			Err(e) => warn!(queue = %queue, resource = %target, client = %client_id, reason = %reason, error = %e, "Failed to recycle backend resource"),
		}
	});
}
