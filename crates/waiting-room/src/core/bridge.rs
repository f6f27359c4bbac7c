use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::conn::{ActiveConnection, ConnectionMeta};
use super::manager::QueueManager;
use crate::types::{ClientId, ConnectionId};

impl QueueManager {
	/// Registers a live proxied connection for the active occupant.
	///
	/// Returns `None` when `client_id` does not hold the slot. A connection
	/// already attached for the same occupant is cancelled and replaced.
	pub async fn attach_connection(&self, client_id: &ClientId, meta: ConnectionMeta, cancel: CancellationToken) -> Option<ConnectionId> {
		let mut state = self.inner.state.write().await;
		let now = Instant::now();
		self.inner.maintain(&mut state, now);

		let occupant = state.slot.occupant_mut().filter(|o| &o.entry.client_id == client_id)?;
		occupant.entry.last_connected_at = Some(now);

		let connection = ActiveConnection::new(client_id.clone(), meta, cancel, now);
		let id = connection.id;
		if let Some(previous) = state.slot.set_connection(connection) {
			previous.cancel();
			debug!(queue = %self.inner.config.name, client = %client_id, previous = %previous.id, "Superseded connection cancelled");
		}

		info!(queue = %self.inner.config.name, client = %client_id, connection_id = %id, "Connection attached");
		Some(id)
	}

	/// Forgets the connection `id` while keeping the grant.
	///
	/// The reconnect grace window restarts now. Returns `false` if `id` is no
	/// longer the attached connection.
	pub async fn detach_connection(&self, id: &ConnectionId) -> bool {
		let mut state = self.inner.state.write().await;
		if !state.slot.connection().is_some_and(|conn| &conn.id == id) {
			return false;
		}

		let now = Instant::now();
		let connection = state.slot.take_connection();
		if let Some(occupant) = state.slot.occupant_mut() {
			occupant.entry.last_connected_at = Some(now);
		}

		if let Some(conn) = connection {
			info!(
				queue = %self.inner.config.name,
				client = %conn.client_id,
				connection_id = %conn.id,
				duration_secs = conn.get_duration(now).as_secs(),
				"Connection detached"
			);
		}
		true
	}

	/// Attaches the connection and detaches it again once `cancel` fires.
	///
	/// The watcher only detaches; release and promotion stay with the
	/// admission path and the expiration timer.
	pub async fn track_connection(&self, client_id: &ClientId, meta: ConnectionMeta, cancel: CancellationToken) -> Option<ConnectionId> {
		let id = self.attach_connection(client_id, meta, cancel.clone()).await?;

		let weak = Arc::downgrade(&self.inner);
		tokio::spawn(async move {
			cancel.cancelled().await;
			if let Some(inner) = weak.upgrade() {
				QueueManager { inner }.detach_connection(&id).await;
			}
		});

		Some(id)
	}
}
