use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::{ClientId, ConnectionId};

/// Transport metadata the proxy hands over when a connection is attached.
///
/// Only used for admin reporting; the engine never inspects it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMeta {
	pub request_url: Option<String>,
	pub user_agent: Option<String>,
	pub remote_addr: Option<String>,
	/// Forwarded headers worth showing to operators (e.g. CDN country / client ip).
	pub forwarded: BTreeMap<String, String>,
}

impl ConnectionMeta {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_request_url(mut self, url: impl Into<String>) -> Self {
		self.request_url = Some(url.into());
		self
	}

	#[must_use]
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());
		self
	}

	#[must_use]
	pub fn with_remote_addr(mut self, addr: impl ToString) -> Self {
		self.remote_addr = Some(addr.to_string());
		self
	}

	#[must_use]
	pub fn with_forwarded(mut self, header: impl Into<String>, value: impl Into<String>) -> Self {
		self.forwarded.insert(header.into().to_ascii_lowercase(), value.into());
		self
	}
}

/// Live proxied connection held by the active occupant
#[derive(Debug, Clone)]
pub struct ActiveConnection {
	pub id: ConnectionId,
	pub client_id: ClientId,
	pub started_at: Instant,
	pub started_wall: DateTime<Utc>,
	pub meta: ConnectionMeta,
	cancel: CancellationToken,
}

impl ActiveConnection {
	pub fn new(client_id: ClientId, meta: ConnectionMeta, cancel: CancellationToken, now: Instant) -> Self {
		Self {
			id: ConnectionId::new(),
			client_id,
			started_at: now,
			started_wall: Utc::now(),
			meta,
			cancel,
		}
	}

	/// Signals whoever holds the transport to tear it down.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn get_duration(&self, now: Instant) -> Duration {
		now.saturating_duration_since(self.started_at)
	}
}
