use futures::{SinkExt, StreamExt};
use jobq_client::AsyncQueueClient;
use jobq_core::{JobId, Task};
use jobq_protocol::{AcceptedResponse, FrameCodec, Message, RejectedResponse};
use jobq_worker::handler::EchoHandler;
use jobq_worker::{Dispatcher, HandlerRegistry, Worker};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::codec::Framed;

/// Minimal broker stand-in: hands out the given tasks in order, rejects
/// reports for the listed job ids, and accepts everything else. One framed
/// request per connection, matching the client's connection model.
async fn run_scripted_broker(
    listener: TcpListener,
    tasks: Vec<Task>,
    reject_reports_for: Vec<JobId>,
    report_log: Arc<Mutex<Vec<(JobId, bool)>>>,
) {
    let mut pending: VecDeque<Task> = tasks.into();

    loop {
        let Ok((stream, _)) = listener.accept().await else {
            break;
        };
        let mut framed = Framed::new(stream, FrameCodec);

        // The client's connect probe opens and drops a bare connection.
        let Some(Ok(request)) = framed.next().await else {
            continue;
        };

        let response = match request {
            Message::Dequeue(_) => Message::Accepted(AcceptedResponse {
                task: pending.pop_front(),
                note: None,
            }),
            Message::Report(req) => {
                report_log.lock().push((req.job_id, req.success));
                if reject_reports_for.contains(&req.job_id) {
                    Message::Rejected(RejectedResponse {
                        reason: "Failed to record result: Job not found".to_string(),
                    })
                } else {
                    Message::Accepted(AcceptedResponse {
                        task: None,
                        note: None,
                    })
                }
            }
            _ => Message::Accepted(AcceptedResponse {
                task: None,
                note: None,
            }),
        };

        let _ = framed.send(response).await;
    }
}

#[tokio::test]
async fn rejected_report_does_not_stop_the_loop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();

    // The first job's report is rejected, as happens when its lease lapsed
    // and the broker already re-queued it.
    let first = Task::new("echo", json!("stale")).unwrap();
    let second = Task::new("echo", json!("fresh")).unwrap();
    let stale_id = first.job_id;
    let fresh_id = second.job_id;

    let report_log = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(run_scripted_broker(
        listener,
        vec![first, second],
        vec![stale_id],
        report_log.clone(),
    ));

    let registry = HandlerRegistry::new();
    registry.register("echo", EchoHandler);

    let client = Arc::new(
        AsyncQueueClient::connect(&address)
            .await
            .unwrap()
            .with_worker_id("stale-report-worker")
            .with_poll_interval(Duration::from_millis(20)),
    );
    let worker = Arc::new(Worker::new("stale-report-worker", registry));
    let dispatcher = Dispatcher::new(client.clone(), worker);

    let dispatch = tokio::spawn(async move { dispatcher.run().await });

    // The loop must survive the rejection and still report the second job.
    for _ in 0..100 {
        if report_log.lock().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let reports = report_log.lock().clone();
    assert_eq!(reports, vec![(stale_id, true), (fresh_id, true)]);

    client.shutdown();
    dispatch.await.unwrap().unwrap();
}
