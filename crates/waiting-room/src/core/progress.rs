use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use super::queue::WaitEntry;
use crate::config::QueueConfig;

/// How long a computed virtual total stays valid without a structural change.
pub const VIRTUAL_TOTAL_TTL: Duration = Duration::from_secs(60);

/// The capacity estimate never reports fewer than this many waiting users.
const MIN_VIRTUAL_QUEUE: usize = 5;

const JITTER_RATIO: f64 = 0.1;

/// Grant lengths are normalised against five minute units.
const GRANT_UNIT_SECS: f64 = 300.0;

/// Progress numbers shown to a waiting client.
///
/// `position` mirrors `numerator` on purpose: the UI never learns the real
/// index in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
	pub numerator: u64,
	pub denominator: u64,
	pub position: u64,
	pub total: u64,
}

impl Progress {
	pub fn for_entry(entry: &WaitEntry, now: Instant, total: u64) -> Self {
		let numerator = entry.remaining_wait(now).as_secs();
		Self {
			numerator,
			denominator: entry.max_wait_time.as_secs(),
			position: numerator,
			total,
		}
	}
}

/// Body of the status endpoint polled by the waiting page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
	pub numerator: u64,
	pub denominator: u64,
	pub position: u64,
	pub total: u64,
	pub can_access: bool,
	pub redirect_path: String,
}

impl QueueStatus {
	pub fn new(progress: Progress, can_access: bool, redirect_path: impl Into<String>) -> Self {
		Self {
			numerator: progress.numerator,
			denominator: progress.denominator,
			position: progress.position,
			total: progress.total,
			can_access,
			redirect_path: redirect_path.into(),
		}
	}
}

/// Cached, intentionally fuzzy estimate of how many users the queue holds.
#[derive(Debug, Clone, Default)]
pub struct VirtualTotal {
	value: u64,
	updated_at: Option<Instant>,
}

impl VirtualTotal {
	pub fn updated_at(&self) -> Option<Instant> {
		self.updated_at
	}

	/// Recomputes the estimate when forced, when never computed, or when the
	/// cached value is older than [`VIRTUAL_TOTAL_TTL`].
	pub fn refresh(&mut self, now: Instant, queue_len: usize, config: &QueueConfig, force: bool) -> u64 {
		let fresh = self.updated_at.is_some_and(|at| now.saturating_duration_since(at) < VIRTUAL_TOTAL_TTL);
		if force || !fresh {
			self.value = estimate_total(queue_len, config);
			self.updated_at = Some(now);
		}
		self.value
	}
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn estimate_total(queue_len: usize, config: &QueueConfig) -> u64 {
	let base = config.max_wait_for(queue_len.max(MIN_VIRTUAL_QUEUE)).as_secs();
	let units = (config.max_active_time.as_secs_f64() / GRANT_UNIT_SECS).ceil().max(1.0);
	jitter(base, JITTER_RATIO) / units as u64
}

/// `ceil(value * U[1 - ratio, 1 + ratio])`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn jitter(value: u64, ratio: f64) -> u64 {
	let factor = rand::rng().random_range((1.0 - ratio)..=(1.0 + ratio));
	(value as f64 * factor).ceil() as u64
}
