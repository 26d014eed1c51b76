use async_trait::async_trait;
use jobq_broker::{Broker, BrokerConfig};
use jobq_client::AsyncQueueClient;
use jobq_core::{Priority, Task};
use jobq_worker::{Dispatcher, HandlerRegistry, HandlerResult, JobHandler, Worker};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Records the args of every invocation, in order.
struct RecordingHandler {
    seen: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn run(&self, args: Value) -> HandlerResult {
        self.seen.lock().push(args.clone());
        Ok(args)
    }
}

struct AlwaysFailHandler;

#[async_trait]
impl JobHandler for AlwaysFailHandler {
    async fn run(&self, _args: Value) -> HandlerResult {
        Err("boom".to_string())
    }
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn start_broker(data_dir: &TempDir) -> (Arc<Broker>, String) {
    let port = free_port();
    let config = BrokerConfig {
        network: jobq_broker::config::NetworkConfig {
            host: "127.0.0.1".to_string(),
            port,
            queue_depth_limit: 1000,
        },
        persistence: jobq_broker::config::PersistenceConfig {
            data_dir: data_dir.path().to_path_buf(),
            completed_retention_days: 7,
        },
    };

    let broker = Arc::new(Broker::new(config).unwrap());
    let runner = broker.clone();
    tokio::spawn(async move {
        runner.run().await.unwrap();
    });

    let address = format!("127.0.0.1:{port}");

    // Wait for the listener to come up.
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(&address).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    (broker, address)
}

async fn connect_client(address: &str) -> AsyncQueueClient {
    AsyncQueueClient::connect(address)
        .await
        .unwrap()
        .with_poll_interval(Duration::from_millis(50))
}

#[tokio::test]
async fn tasks_execute_in_enqueue_order() {
    let data_dir = TempDir::new().unwrap();
    let (broker, address) = start_broker(&data_dir).await;

    let producer = connect_client(&address).await;

    // Same priority throughout, spaced out so creation times differ.
    let mut job_ids = Vec::new();
    for n in 0..3 {
        let task = Task::new("record", json!(n)).unwrap();
        job_ids.push(producer.enqueue(task).await.unwrap());
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let registry = HandlerRegistry::new();
    registry.register("record", RecordingHandler { seen: seen.clone() });

    let client = Arc::new(connect_client(&address).await.with_worker_id("e2e-worker"));
    let worker = Arc::new(Worker::new("e2e-worker", registry));
    let dispatcher = Dispatcher::new(client.clone(), worker);

    let dispatch = tokio::spawn(async move { dispatcher.run().await });

    // Every job completes with its args echoed back.
    for (n, job_id) in job_ids.iter().enumerate() {
        let result = producer
            .wait_for_result(*job_id, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(result, json!(n));
    }

    // Executed exactly once each, in enqueue order.
    let order: Vec<Value> = seen.lock().clone();
    assert_eq!(order, vec![json!(0), json!(1), json!(2)]);

    // Shutdown ends the dispatch loop via the empty dequeue branch.
    client.shutdown();
    dispatch.await.unwrap().unwrap();

    broker.shutdown();
}

#[tokio::test]
async fn failed_job_without_retries_is_dead_lettered() {
    let data_dir = TempDir::new().unwrap();
    let (broker, address) = start_broker(&data_dir).await;

    let producer = connect_client(&address).await;

    let task = Task::builder("always_fail", json!({}))
        .priority(Priority::High)
        .max_retries(0)
        .build()
        .unwrap();
    let job_id = producer.enqueue(task).await.unwrap();

    let registry = HandlerRegistry::new();
    registry.register("always_fail", AlwaysFailHandler);

    let client = Arc::new(connect_client(&address).await.with_worker_id("dlq-worker"));
    let worker = Arc::new(Worker::new("dlq-worker", registry));
    let dispatcher = Dispatcher::new(client.clone(), worker);
    let dispatch = tokio::spawn(async move { dispatcher.run().await });

    let err = producer
        .wait_for_result(job_id, Duration::from_secs(10))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("boom"));

    let task = producer.job_status(job_id).await.unwrap().unwrap();
    assert_eq!(task.status, jobq_core::JobStatus::DeadLetter);
    assert_eq!(task.error.as_deref(), Some("boom"));

    client.shutdown();
    dispatch.await.unwrap().unwrap();

    broker.shutdown();
}
