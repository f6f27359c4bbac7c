use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use std::{sync::Arc, time::Duration};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt::format::JsonFields, layer::SubscriberExt, util::SubscriberInitExt, Layer};
use waiting_room::{ClientId, ConnectionMeta, QueueConfig, QueueManager, RecycleError, ResourceRecycler};

/// Drives a handful of fake browsers through one waiting room.
#[derive(Parser, Debug)]
struct Args {
	#[command(flatten)]
	queue: QueueConfig,

	#[arg(long, env = "SIM_CLIENTS", default_value = "4")]
	clients: usize,

	#[arg(long, env = "SIM_HOLD_SECS", default_value = "2", help = "How long each admitted client keeps its connection open")]
	hold_secs: u64,

	#[arg(long, env = "SIM_RUN_SECS", default_value = "30")]
	run_secs: u64,

	#[arg(long, env = "RUST_LOG", default_value = "info")]
	rust_log: String,

	#[arg(long, env = "LOG_JSON", default_value = "false")]
	log_json: bool,
}

struct LoggingRecycler;

#[async_trait]
impl ResourceRecycler for LoggingRecycler {
	async fn recycle(&self, target: &str) -> Result<(), RecycleError> {
		sleep(Duration::from_millis(50)).await;
		info!(deployment = %target, "Deployment restart requested");
		Ok(())
	}
}

fn init_tracing(args: &Args) -> Result<()> {
	let filter = EnvFilter::try_new(&args.rust_log)?;

	tracing_subscriber::registry()
		.with(if args.log_json {
			Box::new(
				tracing_subscriber::fmt::layer()
					.fmt_fields(JsonFields::default())
					.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false))
					.with_filter(filter),
			) as Box<dyn Layer<_> + Send + Sync>
		} else {
			Box::new(tracing_subscriber::fmt::layer().event_format(tracing_subscriber::fmt::format().pretty()).with_filter(filter))
		})
		.init();
	Ok(())
}

async fn run_client(manager: QueueManager, client_id: ClientId, hold: Duration, shutdown: CancellationToken) {
	let mut ticker = interval(Duration::from_secs(1));
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			() = shutdown.cancelled() => break,
			_ = ticker.tick() => {}
		}

		if !manager.can_access(&client_id, "/vnc/").await {
			if let Some(status) = manager.heartbeat(&client_id).await {
				info!(client = %client_id, remaining = status.numerator, of = status.denominator, total = status.total, "Waiting");
			}
			continue;
		}

		let conn = CancellationToken::new();
		let meta = ConnectionMeta::new().with_request_url("/vnc/websockify").with_user_agent("simulate/0.0.0");
		if manager.track_connection(&client_id, meta, conn.clone()).await.is_none() {
			continue;
		}

		tokio::select! {
			() = shutdown.cancelled() => {}
			() = conn.cancelled() => info!(client = %client_id, "Connection closed by queue"),
			() = sleep(hold) => conn.cancel(),
		}

		let outcome = manager.leave(&client_id).await;
		info!(client = %client_id, outcome = ?outcome, ack = outcome.ack(), "Client done");
		break;
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	dotenv::dotenv().ok();
	let args = Args::parse();
	init_tracing(&args)?;

	let manager = if args.queue.recycle_target.is_some() {
		QueueManager::with_recycler(args.queue.clone(), Arc::new(LoggingRecycler))?
	} else {
		QueueManager::new(args.queue.clone())?
	};

	let shutdown = CancellationToken::new();
	let clients: Vec<_> = (0..args.clients)
		.map(|i| tokio::spawn(run_client(manager.clone(), ClientId::new(format!("sim-{i}")), Duration::from_secs(args.hold_secs), shutdown.clone())))
		.collect();

	let mut report = interval(Duration::from_secs(5));
	let deadline = sleep(Duration::from_secs(args.run_secs));
	tokio::pin!(deadline);

	loop {
		tokio::select! {
			() = &mut deadline => break,
			_ = report.tick() => {
				let snapshot = manager.snapshot().await;
				println!("{}", serde_json::to_string_pretty(&snapshot)?);
				if snapshot.active.is_none() && snapshot.queue_length == 0 && clients.iter().all(tokio::task::JoinHandle::is_finished) {
					break;
				}
			}
		}
	}

	shutdown.cancel();
	for client in clients {
		client.await?;
	}
	println!("{}", serde_json::to_string_pretty(&manager.snapshot().await)?);
	Ok(())
}
