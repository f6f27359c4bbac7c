use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::QueueError;

/// Upper bound for every configured duration; keeps deadline arithmetic on `Instant` from overflowing.
pub const MAX_CONFIG_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Settings for one queue manager (one manager per backend resource class).
#[derive(Parser, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct QueueConfig {
	#[arg(long, env = "QUEUE_NAME", default_value = "default", help = "Name of the backend resource class guarded by this queue")]
	pub name: String,

	#[arg(
        long,
        env = "QUEUE_MIN_WAIT_SECS",
        default_value = "300",
        value_parser = parse_duration,
        help = "Floor added to every wait estimate, in seconds"
    )]
	pub min_wait_time: Duration,

	#[arg(
        long,
        env = "QUEUE_MAX_ACTIVE_SECS",
        default_value = "600",
        value_parser = parse_duration,
        help = "Length of one grant and the per-user wait multiplier, in seconds"
    )]
	pub max_active_time: Duration,

	#[arg(
        long,
        env = "QUEUE_HEARTBEAT_TIMEOUT_SECS",
        default_value = "30",
        value_parser = parse_duration,
        help = "Queued clients silent for longer than this are evicted, in seconds"
    )]
	pub heartbeat_timeout: Duration,

	#[arg(
        long,
        env = "QUEUE_CONNECTION_TIMEOUT_SECS",
        default_value = "60",
        value_parser = parse_duration,
        help = "Grace period for the active client to (re)connect, in seconds"
    )]
	pub active_connection_timeout: Duration,

	#[arg(long, env = "QUEUE_RECYCLE_TARGET", help = "Backend resource to recycle after every release")]
	pub recycle_target: Option<String>,
}

impl QueueConfig {
	pub fn new(name: impl Into<String>, min_wait_time: Duration, max_active_time: Duration, heartbeat_timeout: Duration, active_connection_timeout: Duration) -> Self {
		Self {
			name: name.into(),
			min_wait_time,
			max_active_time,
			heartbeat_timeout,
			active_connection_timeout,
			recycle_target: None,
		}
	}

	#[must_use]
	pub fn with_recycle_target(mut self, target: impl Into<String>) -> Self {
		self.recycle_target = Some(target.into());
		self
	}

	#[must_use]
	pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
		self.heartbeat_timeout = timeout;
		self
	}

	#[must_use]
	pub fn with_active_connection_timeout(mut self, timeout: Duration) -> Self {
		self.active_connection_timeout = timeout;
		self
	}

	/// Worst-case wait for a client with `users_before` clients ahead of it.
	pub fn max_wait_for(&self, users_before: usize) -> Duration {
		let ahead = u32::try_from(users_before).unwrap_or(u32::MAX);
		self.max_active_time.checked_mul(ahead).unwrap_or(Duration::MAX).saturating_add(self.min_wait_time)
	}

	pub fn validate(&self) -> Result<(), QueueError> {
		if self.name.trim().is_empty() {
			return Err(QueueError::InvalidConfig("queue name must not be empty".to_string()));
		}
		if self.max_active_time.is_zero() {
			return Err(QueueError::InvalidConfig(format!("{}: max_active_time must be greater than zero", self.name)));
		}
		if self.heartbeat_timeout.is_zero() {
			return Err(QueueError::InvalidConfig(format!("{}: heartbeat_timeout must be greater than zero", self.name)));
		}
		if self.active_connection_timeout.is_zero() {
			return Err(QueueError::InvalidConfig(format!("{}: active_connection_timeout must be greater than zero", self.name)));
		}
		for (field, value) in [
			("min_wait_time", self.min_wait_time),
			("max_active_time", self.max_active_time),
			("heartbeat_timeout", self.heartbeat_timeout),
			("active_connection_timeout", self.active_connection_timeout),
		] {
			if value > MAX_CONFIG_DURATION {
				return Err(QueueError::InvalidConfig(format!("{}: {field} exceeds {} seconds", self.name, MAX_CONFIG_DURATION.as_secs())));
			}
		}
		if matches!(&self.recycle_target, Some(target) if target.trim().is_empty()) {
			return Err(QueueError::InvalidConfig(format!("{}: recycle_target must not be blank", self.name)));
		}
		Ok(())
	}
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self::new("default", Duration::from_secs(300), Duration::from_secs(600), Duration::from_secs(30), Duration::from_secs(60))
	}
}

fn parse_duration(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_secs)
}
