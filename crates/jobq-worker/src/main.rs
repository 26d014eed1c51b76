use clap::Parser;
use jobq_client::AsyncQueueClient;
use jobq_worker::handler::{EchoHandler, SleepHandler, WordCountHandler};
use jobq_worker::{Dispatcher, HandlerRegistry, Worker, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "jobq-worker")]
#[command(about = "jobq worker", long_about = None)]
struct Args {
    /// Broker address
    #[arg(short, long, default_value = "127.0.0.1:7070")]
    broker: String,

    /// Worker ID (generated if not provided)
    #[arg(long)]
    worker_id: Option<String>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = if let Some(config_path) = &args.config {
        WorkerConfig::from_file(config_path)?
    } else {
        WorkerConfig::default()
    };

    config.broker_address = args.broker;
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }

    let worker_id = config.resolve_worker_id();

    let registry = HandlerRegistry::new();
    registry.register("echo", EchoHandler);
    registry.register("sleep", SleepHandler);
    registry.register("word_count", WordCountHandler);

    tracing::info!("Registered task names: {:?}", registry.task_names());

    let client = Arc::new(
        AsyncQueueClient::connect(&config.broker_address)
            .await?
            .with_worker_id(worker_id.clone())
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms)),
    );
    tracing::info!("Connected to broker at {}", config.broker_address);

    let worker = Arc::new(Worker::new(worker_id, registry));

    // Heartbeats run beside the dispatch loop on their own connections.
    let heartbeat_client = client.clone();
    let heartbeat_worker = worker.clone();
    let heartbeat_interval = Duration::from_secs(config.heartbeat_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat_interval);
        interval.tick().await; // the first tick fires immediately
        loop {
            interval.tick().await;
            if heartbeat_client.is_shutdown() {
                break;
            }
            if let Err(e) = heartbeat_client.heartbeat(heartbeat_worker.active_jobs()).await {
                tracing::warn!("Heartbeat failed: {e}");
            }
        }
    });

    let signal_client = client.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        signal_client.shutdown();
    });

    let dispatcher = Dispatcher::new(client, worker);
    dispatcher.run().await?;

    Ok(())
}
