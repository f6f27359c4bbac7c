use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::time::Instant;

use crate::core::conn::ActiveConnection;
use crate::core::queue::WaitEntry;
use crate::types::{ClientId, ConnectionId, GrantId};

/// Read-only dump of one queue for operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSnapshot {
	pub name: String,
	pub taken_at: DateTime<Utc>,
	pub active: Option<ActiveSnapshot>,
	pub queue_length: usize,
	pub entries: Vec<EntrySnapshot>,
}

impl AdminSnapshot {
	pub fn active_client(&self) -> Option<&ClientId> {
		self.active.as_ref().map(|a| &a.entry.client_id)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSnapshot {
	pub grant: GrantId,
	pub active_since: DateTime<Utc>,
	pub entry: EntrySnapshot,
	pub connection: Option<ConnectionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySnapshot {
	pub client_id: ClientId,
	pub position: usize,
	pub redirect_path: String,
	pub last_heartbeat_at: DateTime<Utc>,
	pub last_connected_at: Option<DateTime<Utc>>,
	pub max_wait_secs: u64,
	pub can_access_by: DateTime<Utc>,
	pub expiration_at: Option<DateTime<Utc>>,
	pub promotion_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
	pub client_id: ClientId,
	pub connection_id: ConnectionId,
	pub started_at: DateTime<Utc>,
	pub duration_secs: u64,
	pub request_url: Option<String>,
	pub user_agent: Option<String>,
	pub remote_addr: Option<String>,
	pub forwarded: BTreeMap<String, String>,
}

/// Maps monotonic instants onto wall-clock time relative to one reference pair.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WallClock {
	now: Instant,
	wall: DateTime<Utc>,
}

impl WallClock {
	pub(crate) fn new(now: Instant) -> Self {
		Self { now, wall: Utc::now() }
	}

	pub(crate) fn wall(&self) -> DateTime<Utc> {
		self.wall
	}

	pub(crate) fn at(&self, instant: Instant) -> DateTime<Utc> {
		let delta = if instant >= self.now {
			chrono::Duration::from_std(instant - self.now).map(|d| self.wall + d)
		} else {
			chrono::Duration::from_std(self.now - instant).map(|d| self.wall - d)
		};
		delta.unwrap_or(self.wall)
	}

	pub(crate) fn entry(&self, entry: &WaitEntry) -> EntrySnapshot {
		EntrySnapshot {
			client_id: entry.client_id.clone(),
			position: entry.position,
			redirect_path: entry.redirect_path.clone(),
			last_heartbeat_at: self.at(entry.last_heartbeat_at),
			last_connected_at: entry.last_connected_at.map(|at| self.at(at)),
			max_wait_secs: entry.max_wait_time.as_secs(),
			can_access_by: self.at(entry.can_access_by),
			expiration_at: entry.expiration_at.map(|at| self.at(at)),
			promotion_at: entry.promotion_at.map(|at| self.at(at)),
		}
	}

	pub(crate) fn connection(&self, conn: &ActiveConnection) -> ConnectionInfo {
		ConnectionInfo {
			client_id: conn.client_id.clone(),
			connection_id: conn.id,
			started_at: conn.started_wall,
			duration_secs: conn.get_duration(self.now).as_secs(),
			request_url: conn.meta.request_url.clone(),
			user_agent: conn.meta.user_agent.clone(),
			remote_addr: conn.meta.remote_addr.clone(),
			forwarded: conn.meta.forwarded.clone(),
		}
	}
}
