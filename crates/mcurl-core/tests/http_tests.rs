use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use mcurl_common::config::Config;
use mcurl_core::{BatchRunner, RepeatController, RequestExecutor};
use mcurl_transport::{HttpTransport, RequestFailure};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_millis(50)).await;
    "hello from the slow endpoint"
}

async fn echo(headers: HeaderMap, body: String) -> StatusCode {
    let probe = headers.get("x-probe").and_then(|v| v.to_str().ok());
    if probe == Some("yes") && body == "ping" {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

async fn broken() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/slow", get(slow))
        .route("/echo", post(echo))
        .route("/broken", get(broken));
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap(); });
    addr
}

/// Answers every connection with `head`, then optionally `tail` after a
/// delay, then closes the socket.
async fn raw_server(head: &'static [u8], tail: Option<(Duration, &'static [u8])>) -> SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(read) => request.extend_from_slice(&buf[..read]),
                    }
                }
                let _ = socket.write_all(head).await;
                if let Some((delay, rest)) = tail {
                    tokio::time::sleep(delay).await;
                    let _ = socket.write_all(rest).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

fn batch_runner(url: String, concurrency: usize) -> BatchRunner<HttpTransport> {
    let config = Arc::new(Config::new("GET", url, concurrency));
    let transport = Arc::new(HttpTransport::new(&config).unwrap());
    BatchRunner::new(RequestExecutor::new(transport, config))
}

fn controller(config: Config) -> RepeatController<HttpTransport> {
    let transport = Arc::new(HttpTransport::new(&config).unwrap());
    RepeatController::new(transport, Arc::new(config))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_batch_against_slow_endpoint() {
    let addr = serve().await;
    let config = Config::new("GET", format!("http://{addr}/slow"), 5);
    let stats = controller(config).run().await.unwrap();

    assert_eq!(stats.batch_count(), 1);
    assert_eq!(stats.requests, 5);
    assert_eq!(stats.failures, 0);
    assert!(stats.average >= Duration::from_millis(50), "average {:?}", stats.average);
    assert!(stats.max >= stats.average);
    let batch = &stats.batches[0];
    assert_eq!(batch.status_counts.get(&200), Some(&5));
    assert_eq!(batch.bytes, 5 * "hello from the slow endpoint".len() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn method_headers_and_body_are_sent_verbatim() {
    let addr = serve().await;
    let mut config = Config::new("POST", format!("http://{addr}/echo"), 3);
    config.headers.insert("X-Probe".into(), "yes".into());
    config.body = b"ping".to_vec();
    let stats = controller(config).run().await.unwrap();

    assert_eq!(stats.batches[0].status_counts.get(&200), Some(&3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn server_errors_are_recorded_as_statuses() {
    let addr = serve().await;
    let mut config = Config::new("GET", format!("http://{addr}/broken"), 4);
    config.repeat = 2;
    config.cooldown = Duration::from_millis(10);
    let stats = controller(config).run().await.unwrap();

    assert_eq!(stats.batch_count(), 2);
    assert_eq!(stats.failures, 0);
    assert!(stats.batches.iter().all(|b| b.status_counts.get(&500) == Some(&4)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refused_connections_are_counted_per_request() {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let stats = batch_runner(format!("http://{addr}/"), 5).run(1).await.unwrap();

    assert_eq!(stats.requests, 5);
    assert_eq!(stats.failures, 5);
    assert!(stats.status_counts.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn truncated_body_is_a_failure_with_its_status() {
    let head: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\nabc";
    let addr = raw_server(head, None).await;
    let runner = batch_runner(format!("http://{addr}/"), 3);

    let outcomes = runner.collect_outcomes(1).await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| matches!(o.failure, Some(RequestFailure::Body { status: 200, .. }))));

    let stats = runner.run(2).await.unwrap();
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.failures, 3);
    assert_eq!(stats.status_counts.get(&200), Some(&3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timing_covers_the_whole_body() {
    let head: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\nhello";
    let tail: &[u8] = b"world";
    let addr = raw_server(head, Some((Duration::from_millis(300), tail))).await;

    let stats = batch_runner(format!("http://{addr}/"), 3).run(1).await.unwrap();
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.bytes, 30);
    assert!(stats.average >= Duration::from_millis(300), "average {:?}", stats.average);
}
