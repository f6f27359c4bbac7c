use std::fmt;
use tokio::{task::AbortHandle, time::Instant};

use super::conn::ActiveConnection;
use super::queue::WaitEntry;
use crate::types::{ClientId, GrantId};

/// Why an occupant lost the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
	/// `max_active_time` elapsed.
	Expired,
	/// Connected once, then stayed disconnected past the grace period.
	Disconnected,
	/// Never attached a connection within the grace period after promotion.
	NeverConnected,
	/// The occupant asked to leave.
	Left,
	/// An operator evicted the occupant.
	Forced,
}

impl ReleaseReason {
	pub fn as_label(&self) -> &'static str {
		match self {
			ReleaseReason::Expired => "expired",
			ReleaseReason::Disconnected => "disconnected",
			ReleaseReason::NeverConnected => "never_connected",
			ReleaseReason::Left => "left",
			ReleaseReason::Forced => "forced",
		}
	}
}

impl fmt::Display for ReleaseReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_label())
	}
}

/// The promoted client
#[derive(Debug, Clone)]
pub struct Occupant {
	pub entry: WaitEntry,
	pub active_since: Instant,
	pub grant: GrantId,
}

/// Holds at most one occupant, its live connection and its expiration timer.
#[derive(Debug, Default)]
pub struct ActiveSlot {
	occupant: Option<Occupant>,
	connection: Option<ActiveConnection>,
	timer: Option<AbortHandle>,
}

impl ActiveSlot {
	pub fn occupant(&self) -> Option<&Occupant> {
		self.occupant.as_ref()
	}

	pub fn occupant_mut(&mut self) -> Option<&mut Occupant> {
		self.occupant.as_mut()
	}

	pub fn connection(&self) -> Option<&ActiveConnection> {
		self.connection.as_ref()
	}

	pub fn is_free(&self) -> bool {
		self.occupant.is_none()
	}

	pub fn is_held_by(&self, client_id: &ClientId) -> bool {
		self.occupant.as_ref().is_some_and(|o| &o.entry.client_id == client_id)
	}

	pub fn holds_grant(&self, grant: GrantId) -> bool {
		self.occupant.as_ref().is_some_and(|o| o.grant == grant)
	}

	/// Installs a new occupant. The slot must be free.
	pub fn occupy(&mut self, occupant: Occupant) {
		debug_assert!(self.occupant.is_none(), "slot already occupied");
		self.occupant = Some(occupant);
	}

	/// Replaces the expiration timer, aborting the previous one.
	pub fn arm_timer(&mut self, handle: AbortHandle) {
		self.stop_timer();
		self.timer = Some(handle);
	}

	pub fn stop_timer(&mut self) {
		if let Some(timer) = self.timer.take() {
			timer.abort();
		}
	}

	/// Stores `connection`, returning the one it supersedes.
	pub fn set_connection(&mut self, connection: ActiveConnection) -> Option<ActiveConnection> {
		self.connection.replace(connection)
	}

	pub fn take_connection(&mut self) -> Option<ActiveConnection> {
		self.connection.take()
	}

	/// Cancels the connection, stops the timer and empties the slot.
	pub fn vacate(&mut self) -> Option<(Occupant, Option<ActiveConnection>)> {
		let occupant = self.occupant.take()?;
		let connection = self.connection.take();
		if let Some(conn) = &connection {
			conn.cancel();
		}
		self.stop_timer();
		Some((occupant, connection))
	}
}
