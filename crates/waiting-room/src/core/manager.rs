use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc, Weak,
};
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, info};

use super::progress::{Progress, QueueStatus, VirtualTotal};
use super::queue::{WaitEntry, WaitQueue};
use super::slot::{ActiveSlot, Occupant, ReleaseReason};
use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::recycle::{self, ResourceRecycler};
use crate::snapshot::{ActiveSnapshot, AdminSnapshot, WallClock};
use crate::types::{ClientId, GrantId};

/// Result of an admission query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
	/// The caller holds the active slot.
	Admitted(WaitEntry),
	/// The caller is waiting in the queue.
	Queued(WaitEntry),
	/// The caller is not tracked and was not enqueued.
	Absent,
}

impl Admission {
	pub fn can_access(&self) -> bool {
		matches!(self, Admission::Admitted(_))
	}

	pub fn entry(&self) -> Option<&WaitEntry> {
		match self {
			Admission::Admitted(entry) | Admission::Queued(entry) => Some(entry),
			Admission::Absent => None,
		}
	}

	pub fn into_entry(self) -> Option<WaitEntry> {
		match self {
			Admission::Admitted(entry) | Admission::Queued(entry) => Some(entry),
			Admission::Absent => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
	ReleasedGrant,
	LeftQueue,
	NotTracked,
}

impl LeaveOutcome {
	/// Acknowledgment sent back to the client whatever actually happened.
	#[allow(clippy::unused_self)]
	pub const fn ack(self) -> &'static str {
		"released"
	}
}

#[derive(Debug, Default)]
pub(crate) struct State {
	pub(crate) queue: WaitQueue,
	pub(crate) slot: ActiveSlot,
	pub(crate) virtual_total: VirtualTotal,
}

pub(crate) struct Inner {
	pub(crate) config: QueueConfig,
	pub(crate) state: RwLock<State>,
	recycler: Option<Arc<dyn ResourceRecycler>>,
	grant_seq: AtomicU64,
}

/// Admission control for one exclusive backend resource.
///
/// Cheap to clone; every clone drives the same queue. All mutation happens
/// under a single write lock and never awaits while holding it.
#[derive(Clone)]
pub struct QueueManager {
	pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for QueueManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("QueueManager")
			.field("name", &self.inner.config.name)
			.field("recycler", &self.inner.recycler.is_some())
			.finish_non_exhaustive()
	}
}

impl QueueManager {
	pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
		config.validate()?;
		Ok(Self::build(config, None))
	}

	/// Builds a manager that recycles `config.recycle_target` after every release.
	pub fn with_recycler(config: QueueConfig, recycler: Arc<dyn ResourceRecycler>) -> Result<Self, QueueError> {
		config.validate()?;
		if config.recycle_target.is_none() {
			return Err(QueueError::MissingRecycleTarget { queue: config.name });
		}
		Ok(Self::build(config, Some(recycler)))
	}

	fn build(config: QueueConfig, recycler: Option<Arc<dyn ResourceRecycler>>) -> Self {
		info!(
			queue = %config.name,
			min_wait_secs = config.min_wait_time.as_secs(),
			max_active_secs = config.max_active_time.as_secs(),
			heartbeat_timeout_secs = config.heartbeat_timeout.as_secs(),
			connection_timeout_secs = config.active_connection_timeout.as_secs(),
			recycle_target = ?config.recycle_target,
			"Queue manager created"
		);

		Self {
			inner: Arc::new(Inner {
				config,
				state: RwLock::new(State::default()),
				recycler,
				grant_seq: AtomicU64::new(0),
			}),
		}
	}

	pub fn name(&self) -> &str {
		&self.inner.config.name
	}

	pub fn config(&self) -> &QueueConfig {
		&self.inner.config
	}

	/// Runs expiry, cleanup and promotion, then resolves `client_id`.
	pub async fn admit(&self, client_id: &ClientId, redirect_path: &str, enqueue_if_absent: bool) -> Admission {
		let mut state = self.inner.state.write().await;
		let now = Instant::now();
		self.inner.maintain(&mut state, now);
		self.inner.resolve(&mut state, client_id, redirect_path, enqueue_if_absent, now)
	}

	/// Gate used by the proxy before forwarding a request; enqueues unseen clients.
	pub async fn can_access(&self, client_id: &ClientId, request_path: &str) -> bool {
		self.admit(client_id, request_path, true).await.can_access()
	}

	/// Status poll from the waiting page. `None` when the client is unknown.
	pub async fn heartbeat(&self, client_id: &ClientId) -> Option<QueueStatus> {
		let mut state = self.inner.state.write().await;
		let now = Instant::now();
		self.inner.maintain(&mut state, now);

		let admission = self.inner.resolve(&mut state, client_id, "", false, now);
		let can_access = admission.can_access();
		let entry = admission.into_entry()?;

		let queue_len = state.queue.len();
		let total = state.virtual_total.refresh(now, queue_len, &self.inner.config, false);
		Some(QueueStatus::new(Progress::for_entry(&entry, now, total), can_access, entry.redirect_path))
	}

	/// Drops the client from the slot or the queue.
	pub async fn leave(&self, client_id: &ClientId) -> LeaveOutcome {
		let mut state = self.inner.state.write().await;
		let now = Instant::now();

		if state.slot.is_held_by(client_id) {
			self.inner.release(&mut state, ReleaseReason::Left, now);
			return LeaveOutcome::ReleasedGrant;
		}

		if state.queue.remove(client_id, self.inner.config.max_active_time).is_some() {
			info!(queue = %self.inner.config.name, client = %client_id, remaining = state.queue.len(), "Client left queue");
			let queue_len = state.queue.len();
			state.virtual_total.refresh(now, queue_len, &self.inner.config, true);
			self.inner.try_promote(&mut state, now);
			return LeaveOutcome::LeftQueue;
		}

		debug!(queue = %self.inner.config.name, client = %client_id, "Leave for untracked client");
		LeaveOutcome::NotTracked
	}

	/// Evicts the active occupant as if its grant had expired.
	pub async fn force_release(&self) -> Option<ClientId> {
		let mut state = self.inner.state.write().await;
		let now = Instant::now();
		self.inner.release(&mut state, ReleaseReason::Forced, now).map(|occupant| occupant.entry.client_id)
	}

	pub async fn is_active(&self, client_id: &ClientId) -> bool {
		self.inner.state.read().await.slot.is_held_by(client_id)
	}

	pub async fn queue_length(&self) -> usize {
		self.inner.state.read().await.queue.len()
	}

	/// Point-in-time view for operators. Does not run cleanup.
	pub async fn snapshot(&self) -> AdminSnapshot {
		let state = self.inner.state.read().await;
		let clock = WallClock::new(Instant::now());

		let active = state.slot.occupant().map(|occupant| ActiveSnapshot {
			grant: occupant.grant,
			active_since: clock.at(occupant.active_since),
			entry: clock.entry(&occupant.entry),
			connection: state.slot.connection().map(|conn| clock.connection(conn)),
		});

		AdminSnapshot {
			name: self.inner.config.name.clone(),
			taken_at: clock.wall(),
			active,
			queue_length: state.queue.len(),
			entries: state.queue.iter().map(|entry| clock.entry(entry)).collect(),
		}
	}
}

impl Inner {
	/// Expiry, connection and heartbeat cleanup, then promotion.
	pub(crate) fn maintain(self: &Arc<Self>, state: &mut State, now: Instant) {
		let expired = state.slot.occupant().and_then(|o| o.entry.expiration_at).is_some_and(|at| now >= at);
		if expired {
			self.release(state, ReleaseReason::Expired, now);
		}

		let released = self.release_unconnected(state, now);
		let evicted = state.queue.evict_stale(now, self.config.heartbeat_timeout, self.config.max_active_time);
		for entry in &evicted {
			info!(queue = %self.config.name, client = %entry.client_id, position = entry.position, "Evicted queued client after heartbeat timeout");
		}

		// deadlines only move through evict_stale; a released occupant refunds nothing
		if released || !evicted.is_empty() {
			let queue_len = state.queue.len();
			state.virtual_total.refresh(now, queue_len, &self.config, true);
		}

		self.try_promote(state, now);
	}

	/// Releases an occupant that has no live connection and ran out of grace.
	fn release_unconnected(self: &Arc<Self>, state: &mut State, now: Instant) -> bool {
		if state.slot.connection().is_some() {
			return false;
		}
		let Some(occupant) = state.slot.occupant() else {
			return false;
		};

		let timeout = self.config.active_connection_timeout;
		let reason = match (occupant.entry.last_connected_at, occupant.entry.promotion_at) {
			(Some(connected), _) if now.saturating_duration_since(connected) >= timeout => ReleaseReason::Disconnected,
			(None, Some(promoted)) if now.saturating_duration_since(promoted) >= timeout => ReleaseReason::NeverConnected,
			_ => return false,
		};

		self.release(state, reason, now).is_some()
	}

	fn resolve(&self, state: &mut State, client_id: &ClientId, redirect_path: &str, enqueue_if_absent: bool, now: Instant) -> Admission {
		if let Some(occupant) = state.slot.occupant().filter(|o| &o.entry.client_id == client_id) {
			return Admission::Admitted(occupant.entry.clone());
		}

		if let Some(entry) = state.queue.get_mut(client_id) {
			entry.last_heartbeat_at = now;
			return Admission::Queued(entry.clone());
		}

		if !enqueue_if_absent {
			return Admission::Absent;
		}

		let entry = state.queue.enqueue(client_id.clone(), redirect_path, now, &self.config).clone();
		let queue_len = state.queue.len();
		state.virtual_total.refresh(now, queue_len, &self.config, true);
		info!(
			queue = %self.config.name,
			client = %client_id,
			position = entry.position,
			max_wait_secs = entry.max_wait_time.as_secs(),
			"Client enqueued"
		);

		Admission::Queued(entry)
	}

	/// Cancels the connection, stops the timer, frees the slot, recycles the
	/// resource and promotes the next client.
	pub(crate) fn release(self: &Arc<Self>, state: &mut State, reason: ReleaseReason, now: Instant) -> Option<Occupant> {
		let (occupant, connection) = state.slot.vacate()?;

		info!(
			queue = %self.config.name,
			client = %occupant.entry.client_id,
			grant = %occupant.grant,
			reason = %reason,
			held_secs = now.saturating_duration_since(occupant.active_since).as_secs(),
			had_connection = connection.is_some(),
			"Active slot released"
		);

		if let (Some(recycler), Some(target)) = (&self.recycler, &self.config.recycle_target) {
			recycle::dispatch(Arc::clone(recycler), &self.config.name, target, occupant.entry.client_id.clone(), reason);
		}

		self.try_promote(state, now);
		Some(occupant)
	}

	/// Moves the queue head into a free slot once its promised time has passed.
	pub(crate) fn try_promote(self: &Arc<Self>, state: &mut State, now: Instant) -> Option<GrantId> {
		if !state.slot.is_free() {
			return None;
		}
		if !state.queue.head().is_some_and(|head| now > head.can_access_by) {
			return None;
		}

		let mut entry = state.queue.pop_head()?;
		let expiration_at = now + self.config.max_active_time;
		entry.expiration_at = Some(expiration_at);
		entry.promotion_at = Some(now);

		let grant = GrantId(self.grant_seq.fetch_add(1, Ordering::Relaxed) + 1);
		info!(
			queue = %self.config.name,
			client = %entry.client_id,
			grant = %grant,
			waiting = state.queue.len(),
			"Client promoted to active slot"
		);

		state.slot.occupy(Occupant { entry, active_since: now, grant });
		self.arm_expiration(state, grant, expiration_at);
		Some(grant)
	}

	fn arm_expiration(self: &Arc<Self>, state: &mut State, grant: GrantId, deadline: Instant) {
		let weak: Weak<Self> = Arc::downgrade(self);
		let handle = tokio::spawn(async move {
			tokio::time::sleep_until(deadline).await;
			if let Some(inner) = weak.upgrade() {
				inner.expire_grant(grant).await;
			}
		});
		state.slot.arm_timer(handle.abort_handle());
	}

	async fn expire_grant(self: &Arc<Self>, grant: GrantId) {
		let mut state = self.state.write().await;
		if !state.slot.holds_grant(grant) {
			debug!(queue = %self.config.name, grant = %grant, "Stale expiration timer ignored");
			return;
		}
		let now = Instant::now();
		self.release(&mut state, ReleaseReason::Expired, now);
	}
}
