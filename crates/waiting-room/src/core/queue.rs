use std::{collections::HashMap, time::Duration};
use tokio::time::Instant;

use crate::config::QueueConfig;
use crate::types::ClientId;

/// Tracked state of one client, queued or promoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitEntry {
	pub client_id: ClientId,
	/// Index in the queue; frozen once the entry is promoted.
	pub position: usize,
	/// Where to send the client once admitted.
	pub redirect_path: String,
	pub last_heartbeat_at: Instant,
	/// `None` until the first live connection is attached.
	pub last_connected_at: Option<Instant>,
	/// Worst-case wait promised at enqueue time.
	pub max_wait_time: Duration,
	pub can_access_by: Instant,
	pub expiration_at: Option<Instant>,
	pub promotion_at: Option<Instant>,
}

impl WaitEntry {
	/// Whether the heartbeat is older than `timeout` at `now`.
	pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
		now.saturating_duration_since(self.last_heartbeat_at) > timeout
	}

	/// Seconds left until the promised access time, clamped at zero.
	pub fn remaining_wait(&self, now: Instant) -> Duration {
		self.can_access_by.saturating_duration_since(now)
	}
}

/// FIFO store of waiting clients with O(1) lookup by client id.
///
/// `position` of every entry always equals its index and the lookup map is
/// rebuilt from the first affected index on every removal.
#[derive(Debug, Default)]
pub struct WaitQueue {
	entries: Vec<WaitEntry>,
	index: HashMap<ClientId, usize>,
}

impl WaitQueue {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn position_of(&self, client_id: &ClientId) -> Option<usize> {
		self.index.get(client_id).copied()
	}

	pub fn contains(&self, client_id: &ClientId) -> bool {
		self.index.contains_key(client_id)
	}

	pub fn get(&self, client_id: &ClientId) -> Option<&WaitEntry> {
		self.position_of(client_id).and_then(|idx| self.entries.get(idx))
	}

	pub fn get_mut(&mut self, client_id: &ClientId) -> Option<&mut WaitEntry> {
		let idx = self.position_of(client_id)?;
		self.entries.get_mut(idx)
	}

	pub fn head(&self) -> Option<&WaitEntry> {
		self.entries.first()
	}

	pub fn iter(&self) -> impl Iterator<Item = &WaitEntry> {
		self.entries.iter()
	}

	/// Appends `client_id` at the back with a wait estimate derived from the
	/// number of clients already waiting. Returns the existing entry if the
	/// client is already queued.
	pub fn enqueue(&mut self, client_id: ClientId, redirect_path: impl Into<String>, now: Instant, config: &QueueConfig) -> &WaitEntry {
		if let Some(idx) = self.position_of(&client_id) {
			return &self.entries[idx];
		}

		let position = self.entries.len();
		let max_wait_time = config.max_wait_for(position);
		self.index.insert(client_id.clone(), position);
		self.entries.push(WaitEntry {
			client_id,
			position,
			redirect_path: redirect_path.into(),
			last_heartbeat_at: now,
			last_connected_at: None,
			max_wait_time,
			can_access_by: now + max_wait_time,
			expiration_at: None,
			promotion_at: None,
		});

		&self.entries[position]
	}

	/// Takes the head for promotion.
	///
	/// Entries behind keep their deadlines: the promoted client consumes the
	/// slot time they were already charged for.
	pub fn pop_head(&mut self) -> Option<WaitEntry> {
		if self.entries.is_empty() {
			return None;
		}
		let head = self.entries.remove(0);
		self.index.remove(&head.client_id);
		self.reindex_from(0);
		Some(head)
	}

	/// Removes the entry at `idx`. Everyone behind moves up one position and
	/// their deadline shrinks by one grant length.
	pub fn remove_at(&mut self, idx: usize, max_active_time: Duration) -> Option<WaitEntry> {
		if idx >= self.entries.len() {
			return None;
		}

		let removed = self.entries.remove(idx);
		self.index.remove(&removed.client_id);
		for entry in &mut self.entries[idx..] {
			entry.can_access_by = entry.can_access_by.checked_sub(max_active_time).unwrap_or(entry.can_access_by);
		}
		self.reindex_from(idx);

		Some(removed)
	}

	pub fn remove(&mut self, client_id: &ClientId, max_active_time: Duration) -> Option<WaitEntry> {
		let idx = self.position_of(client_id)?;
		self.remove_at(idx, max_active_time)
	}

	/// Evicts every entry whose heartbeat is older than `timeout`.
	pub fn evict_stale(&mut self, now: Instant, timeout: Duration, max_active_time: Duration) -> Vec<WaitEntry> {
		let stale: Vec<usize> = self.entries.iter().enumerate().filter(|(_, entry)| entry.is_stale(now, timeout)).map(|(idx, _)| idx).collect();

		// back to front so earlier indices stay valid
		let mut evicted: Vec<WaitEntry> = stale.into_iter().rev().filter_map(|idx| self.remove_at(idx, max_active_time)).collect();
		evicted.reverse();
		evicted
	}

	fn reindex_from(&mut self, start: usize) {
		for (idx, entry) in self.entries.iter_mut().enumerate().skip(start) {
			entry.position = idx;
			self.index.insert(entry.client_id.clone(), idx);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> QueueConfig {
		QueueConfig::new("test", Duration::from_secs(2), Duration::from_secs(5), Duration::from_secs(1), Duration::from_secs(2))
	}

	fn filled(ids: &[&str], now: Instant) -> WaitQueue {
		let config = config();
		let mut queue = WaitQueue::new();
		for id in ids {
			queue.enqueue(ClientId::new(*id), "/try/", now, &config);
		}
		queue
	}

	fn assert_consistent(queue: &WaitQueue) {
		for (idx, entry) in queue.iter().enumerate() {
			assert_eq!(entry.position, idx);
			assert_eq!(queue.position_of(&entry.client_id), Some(idx));
		}
		assert_eq!(queue.index.len(), queue.len());
	}

	#[test]
	fn test_enqueue_assigns_fifo_estimates() {
		let now = Instant::now();
		let queue = filled(&["a", "b", "c"], now);

		let waits: Vec<Duration> = queue.iter().map(|e| e.max_wait_time).collect();
		assert_eq!(waits, vec![Duration::from_secs(2), Duration::from_secs(7), Duration::from_secs(12)]);
		assert_eq!(queue.get(&"c".into()).map(|e| e.can_access_by), Some(now + Duration::from_secs(12)));
		assert!(queue.get(&"c".into()).is_some_and(|e| e.last_connected_at.is_none() && e.promotion_at.is_none()));
		assert_consistent(&queue);
	}

	#[test]
	fn test_enqueue_is_idempotent_per_client() {
		let now = Instant::now();
		let mut queue = filled(&["a", "b"], now);

		let again = queue.enqueue(ClientId::new("a"), "/other/", now + Duration::from_secs(1), &config());
		assert_eq!(again.position, 0);
		assert_eq!(again.redirect_path, "/try/");
		assert_eq!(queue.len(), 2);
	}

	#[test]
	fn test_remove_reflows_positions_and_deadlines() {
		let now = Instant::now();
		let mut queue = filled(&["a", "b", "c", "d"], now);
		let before: Vec<Instant> = queue.iter().map(|e| e.can_access_by).collect();

		let removed = queue.remove(&"b".into(), Duration::from_secs(5));
		assert_eq!(removed.map(|e| e.client_id), Some(ClientId::new("b")));

		assert_eq!(queue.get(&"a".into()).map(|e| e.can_access_by), Some(before[0]));
		assert_eq!(queue.get(&"c".into()).map(|e| (e.position, e.can_access_by)), Some((1, before[2] - Duration::from_secs(5))));
		assert_eq!(queue.get(&"d".into()).map(|e| (e.position, e.can_access_by)), Some((2, before[3] - Duration::from_secs(5))));
		// promise made at enqueue time stays as it was
		assert_eq!(queue.get(&"d".into()).map(|e| e.max_wait_time), Some(Duration::from_secs(17)));
		assert_consistent(&queue);
	}

	#[test]
	fn test_remove_unknown_client_is_noop() {
		let now = Instant::now();
		let mut queue = filled(&["a"], now);

		assert!(queue.remove(&"zzz".into(), Duration::from_secs(5)).is_none());
		assert!(queue.remove_at(7, Duration::from_secs(5)).is_none());
		assert_eq!(queue.len(), 1);
	}

	#[test]
	fn test_pop_head_keeps_deadlines() {
		let now = Instant::now();
		let mut queue = filled(&["a", "b", "c"], now);

		let head = queue.pop_head();
		assert_eq!(head.map(|e| e.client_id), Some(ClientId::new("a")));
		assert_eq!(queue.head().map(|e| (e.client_id.as_str(), e.position)), Some(("b", 0)));
		assert_eq!(queue.get(&"b".into()).map(|e| e.can_access_by), Some(now + Duration::from_secs(7)));
		assert!(!queue.contains(&"a".into()));
		assert_consistent(&queue);
	}

	#[test]
	fn test_evict_stale_removes_only_silent_entries() {
		let now = Instant::now();
		let mut queue = filled(&["a", "b", "c", "d"], now);
		let later = now + Duration::from_millis(1500);
		for id in ["b", "d"] {
			if let Some(entry) = queue.get_mut(&id.into()) {
				entry.last_heartbeat_at = later;
			}
		}

		let evicted = queue.evict_stale(later, Duration::from_secs(1), Duration::from_secs(5));
		let evicted: Vec<&str> = evicted.iter().map(|e| e.client_id.as_str()).collect();
		assert_eq!(evicted, vec!["a", "c"]);

		let remaining: Vec<(&str, usize)> = queue.iter().map(|e| (e.client_id.as_str(), e.position)).collect();
		assert_eq!(remaining, vec![("b", 0), ("d", 1)]);
		assert_consistent(&queue);
	}

	#[test]
	fn test_heartbeat_at_exact_timeout_is_not_stale() {
		let now = Instant::now();
		let mut queue = filled(&["a"], now);

		let evicted = queue.evict_stale(now + Duration::from_secs(1), Duration::from_secs(1), Duration::from_secs(5));
		assert!(evicted.is_empty());
		assert_eq!(queue.len(), 1);
	}

	#[test]
	fn test_evict_stale_shifts_only_entries_behind() {
		let now = Instant::now();
		let mut queue = filled(&["a", "b", "c", "d"], now);
		let later = now + Duration::from_millis(1500);
		for id in ["a", "c", "d"] {
			if let Some(entry) = queue.get_mut(&id.into()) {
				entry.last_heartbeat_at = later;
			}
		}

		queue.evict_stale(later, Duration::from_secs(1), Duration::from_secs(5));

		assert_eq!(queue.get(&"a".into()).map(|e| e.can_access_by), Some(now + Duration::from_secs(2)));
		assert_eq!(queue.get(&"c".into()).map(|e| e.can_access_by), Some(now + Duration::from_secs(7)));
		assert_eq!(queue.get(&"d".into()).map(|e| e.can_access_by), Some(now + Duration::from_secs(12)));
	}
}
