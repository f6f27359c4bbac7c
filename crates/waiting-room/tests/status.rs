#[cfg(test)]
mod tests {
	use std::time::Duration;
	use tokio::time::sleep;
	use tokio_util::sync::CancellationToken;
	use waiting_room::{ClientId, ConnectionMeta, QueueConfig, QueueManager};

	fn manager() -> QueueManager {
		QueueManager::new(QueueConfig::new("mbvnc", Duration::from_secs(2), Duration::from_secs(5), Duration::from_secs(30), Duration::from_secs(60))).unwrap()
	}

	#[tokio::test(start_paused = true)]
	async fn test_heartbeat_for_unknown_client_is_none() {
		let manager = manager();

		assert!(manager.heartbeat(&ClientId::new("ghost")).await.is_none());
		// heartbeat never enqueues
		assert_eq!(manager.queue_length().await, 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_heartbeat_reports_countdown_for_queued_client() {
		let manager = manager();
		let (a, b) = (ClientId::new("a"), ClientId::new("b"));
		manager.admit(&a, "/vnc/a/", true).await;
		manager.admit(&b, "/vnc/b/", true).await;

		let status = manager.heartbeat(&b).await.unwrap();
		assert!(!status.can_access);
		assert_eq!(status.redirect_path, "/vnc/b/");
		assert_eq!((status.numerator, status.denominator), (7, 7));
		assert_eq!(status.position, status.numerator);
		// floor of five users: 5 * 5 + 2 seconds, +/- 10%
		assert!((24..=30).contains(&status.total), "total {}", status.total);

		sleep(Duration::from_millis(1500)).await;
		let later = manager.heartbeat(&b).await.unwrap();
		assert_eq!((later.numerator, later.denominator), (5, 7));
		assert_eq!(later.total, status.total, "total is cached between refreshes");
	}

	#[tokio::test(start_paused = true)]
	async fn test_heartbeat_for_active_client() {
		let manager = manager();
		let a = ClientId::new("a");
		manager.admit(&a, "/vnc/a/", true).await;
		sleep(Duration::from_millis(2001)).await;

		let status = manager.heartbeat(&a).await.unwrap();
		assert!(status.can_access);
		assert_eq!(status.numerator, 0);
		assert_eq!(status.redirect_path, "/vnc/a/");
	}

	#[tokio::test(start_paused = true)]
	async fn test_status_json_shape() {
		let manager = manager();
		let a = ClientId::new("a");
		manager.admit(&a, "/vnc/a/", true).await;

		let json = serde_json::to_value(manager.heartbeat(&a).await.unwrap()).unwrap();
		for key in ["numerator", "denominator", "position", "total", "canAccess", "redirectPath"] {
			assert!(json.get(key).is_some(), "missing {key}");
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_snapshot_lists_occupant_connection_and_queue() {
		let manager = manager();
		let (a, b, c) = (ClientId::new("a"), ClientId::new("b"), ClientId::new("c"));
		manager.admit(&a, "/vnc/a/", true).await;
		sleep(Duration::from_millis(2001)).await;
		assert!(manager.can_access(&a, "/vnc/a/").await);
		manager.admit(&b, "/vnc/b/", true).await;
		manager.admit(&c, "/vnc/c/", true).await;

		let meta = ConnectionMeta::new()
			.with_request_url("/vnc/a/websockify")
			.with_user_agent("Mozilla/5.0")
			.with_remote_addr("203.0.113.7:51234")
			.with_forwarded("CF-IPCountry", "KE");
		let id = manager.track_connection(&a, meta, CancellationToken::new()).await.unwrap();
		sleep(Duration::from_secs(2)).await;

		let snapshot = manager.snapshot().await;
		assert_eq!(snapshot.name, "mbvnc");
		assert_eq!(snapshot.queue_length, 2);
		assert_eq!(snapshot.active_client(), Some(&a));

		let entries: Vec<(&str, usize)> = snapshot.entries.iter().map(|e| (e.client_id.as_str(), e.position)).collect();
		assert_eq!(entries, vec![("b", 0), ("c", 1)]);

		let active = snapshot.active.as_ref().unwrap();
		assert!(active.entry.promotion_at.is_some());
		assert!(active.entry.expiration_at > active.entry.promotion_at);

		let conn = active.connection.as_ref().unwrap();
		assert_eq!(conn.connection_id, id);
		assert_eq!(conn.duration_secs, 2);
		assert_eq!(conn.request_url.as_deref(), Some("/vnc/a/websockify"));
		assert_eq!(conn.user_agent.as_deref(), Some("Mozilla/5.0"));
		assert_eq!(conn.remote_addr.as_deref(), Some("203.0.113.7:51234"));
		assert_eq!(conn.forwarded.get("cf-ipcountry").map(String::as_str), Some("KE"));

		let json = serde_json::to_value(&snapshot).unwrap();
		assert_eq!(json["queueLength"], serde_json::json!(2));
		assert_eq!(json["active"]["entry"]["clientId"], serde_json::json!("a"));
		assert_eq!(json["active"]["connection"]["userAgent"], serde_json::json!("Mozilla/5.0"));
	}

	#[tokio::test(start_paused = true)]
	async fn test_snapshot_does_not_run_cleanup() {
		let manager = QueueManager::new(QueueConfig::new("mbvnc", Duration::from_secs(2), Duration::from_secs(5), Duration::from_secs(1), Duration::from_secs(60))).unwrap();
		manager.admit(&ClientId::new("a"), "/vnc/a/", true).await;

		sleep(Duration::from_secs(3)).await;
		let snapshot = manager.snapshot().await;
		assert_eq!(snapshot.queue_length, 1);
		assert!(snapshot.active.is_none());

		assert!(manager.heartbeat(&ClientId::new("a")).await.is_none());
		assert_eq!(manager.queue_length().await, 0);
	}
}
