use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use ndarray::{Array1, Array2};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use nlu_service::config::DEFAULT_MAX_BODY_BYTES;
use nlu_service::service::http::{self, ConnectionLimits};
use nlu_service::{
    ClassifierError, Dataset, ErrorResponse, HashingEmbedder, IntentClassifier, IntentResponse, IntentService,
    LogisticRegression, TextEmbedding, Trainer, TrainingConfig, TrainingExample, TrainingMetadata,
};

struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<io::Result<()>>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap().unwrap();
    }
}

fn flights_service() -> IntentService {
    let rows = [
        ("book me a flight to Paris", "book_flight"),
        ("book a flight to Rome", "book_flight"),
        ("book me a flight to London", "book_flight"),
        ("please book a flight to Madrid", "book_flight"),
        ("book me a ticket to Tokyo", "book_flight"),
        ("cancel my flight to Paris", "cancel_flight"),
        ("cancel my reservation to Rome", "cancel_flight"),
        ("please cancel my flight to London", "cancel_flight"),
        ("cancel the reservation to Madrid", "cancel_flight"),
        ("cancel my ticket to Tokyo", "cancel_flight"),
    ];
    let dataset = Dataset::new(rows.iter().map(|(t, l)| TrainingExample::new(*t, *l)).collect()).unwrap();
    let embedder = Arc::new(HashingEmbedder::default());
    let outcome = Trainer::new(embedder.as_ref(), TrainingConfig::default())
        .train(&dataset)
        .unwrap();
    IntentService::new(embedder, Arc::new(outcome.classifier)).unwrap()
}

/// Embeds every text to the same vector, except texts mentioning "explode", which fail.
struct FlakyEmbedder;

impl TextEmbedding for FlakyEmbedder {
    fn embed_text(&self, text: &str) -> Result<Array1<f32>, ClassifierError> {
        if text.contains("explode") {
            return Err(ClassifierError::ModelError("inference session failed".into()));
        }
        Ok(Array1::from_vec(vec![0.5, 0.5, 0.5, 0.5]))
    }

    fn embedding_size(&self) -> usize {
        4
    }

    fn model_id(&self) -> &str {
        "flaky-4"
    }
}

fn flaky_service() -> IntentService {
    let model = LogisticRegression::from_parameters(Array2::zeros((2, 4)), Array1::from_vec(vec![0.0, 1.0])).unwrap();
    let classifier =
        IntentClassifier::new(vec!["a".into(), "b".into()], model, "flaky-4", TrainingMetadata::default()).unwrap();
    IntentService::new(Arc::new(FlakyEmbedder), Arc::new(classifier)).unwrap()
}

async fn start(service: IntentService) -> TestServer {
    start_with_limits(service, ConnectionLimits::default()).await
}

async fn start_with_limits(service: IntentService, limits: ConnectionLimits) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(http::serve(listener, service, limits, async move {
        let _ = rx.await;
    }));
    TestServer { addr, shutdown, handle }
}

fn parse_response(response: Vec<u8>) -> (u16, String) {
    let response = String::from_utf8(response).unwrap();
    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    let body = response.split("\r\n\r\n").nth(1).unwrap_or("").to_string();
    (status, body)
}

/// Sends raw bytes and returns the status code and body of the reply.
async fn raw_request(addr: SocketAddr, request: &[u8]) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    parse_response(response)
}

#[tokio::test]
async fn test_classify_intent() {
    let server = start(flights_service()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/classify-intent"))
        .json(&json!({ "text": "book me a flight to Paris" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body: IntentResponse = response.json().await.unwrap();
    assert_eq!(body.intent, "book_flight");

    let body: serde_json::Value = client
        .post(server.url("/classify-intent"))
        .json(&json!({ "text": "cancel my flight to Paris" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "type": "cancel_flight" }));

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_bodies_are_unprocessable() {
    let server = start(flights_service()).await;
    let client = reqwest::Client::new();

    for body in [r#"{"text": ""}"#, r#"{"text": "   "}"#, r#"{"txt": "hi"}"#, r#"{"text": 5}"#, "not json", ""] {
        let response = client
            .post(server.url("/classify-intent"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 422, "body {:?}", body);
        let error: ErrorResponse = response.json().await.unwrap();
        assert!(!error.detail.is_empty());
    }

    server.stop().await;
}

#[tokio::test]
async fn test_routing_errors() {
    let server = start(flights_service()).await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/classify-intent")).send().await.unwrap();
    assert_eq!(response.status(), 405);
    assert_eq!(response.headers()["allow"], "POST");

    let response = client
        .post(server.url("/classify"))
        .json(&json!({ "text": "book a flight" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.detail, "Not Found");

    let response = client
        .post(server.url("/classify-intent?verbose=1"))
        .json(&json!({ "text": "book a flight" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_and_oversized_requests() {
    let server = start(flights_service()).await;

    let (status, body) = raw_request(server.addr, b"garbage\r\n\r\n").await;
    assert_eq!(status, 400);
    assert!(body.contains("detail"));

    let (status, _) = raw_request(
        server.addr,
        b"POST /classify-intent HTTP/1.1\r\nHost: localhost\r\nContent-Length: abc\r\n\r\n",
    )
    .await;
    assert_eq!(status, 400);

    let oversized = format!(
        "POST /classify-intent HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        DEFAULT_MAX_BODY_BYTES + 1
    );
    let (status, _) = raw_request(server.addr, oversized.as_bytes()).await;
    assert_eq!(status, 413);

    server.stop().await;
}

#[tokio::test]
async fn test_truncated_body_is_bad_request() {
    let server = start(flights_service()).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"POST /classify-intent HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10\r\n\r\nabc")
        .await
        .unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let (status, body) = parse_response(response);
    assert_eq!(status, 400);
    let error: ErrorResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(error.detail, "Incomplete request body");

    server.stop().await;
}

#[tokio::test]
async fn test_stalled_request_times_out() {
    let limits = ConnectionLimits {
        read_timeout: Duration::from_millis(200),
        ..ConnectionLimits::default()
    };
    let server = start_with_limits(flights_service(), limits).await;

    // Half a header block, then silence with the write side left open.
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"POST /classify-intent HTTP/1.1\r\nHost: localhost\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("server did not time out the request")
        .unwrap();
    let (status, body) = parse_response(response);
    assert_eq!(status, 408);
    let error: ErrorResponse = serde_json::from_str(&body).unwrap();
    assert_eq!(error.detail, "Request Timeout");

    // The server keeps serving other clients.
    let (status, _) = raw_request(
        server.addr,
        b"POST /classify-intent HTTP/1.1\r\nHost: localhost\r\nContent-Length: 25\r\n\r\n{\"text\": \"book a flight\"}",
    )
    .await;
    assert_eq!(status, 200);

    server.stop().await;
}

#[tokio::test]
async fn test_inference_failure_is_server_error() {
    let server = start(flaky_service()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/classify-intent"))
        .json(&json!({ "text": "please explode" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let error: ErrorResponse = response.json().await.unwrap();
    assert!(error.detail.contains("inference session failed"), "detail {:?}", error.detail);

    let response = client
        .post(server.url("/classify-intent"))
        .json(&json!({ "text": "book a flight" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "type": "b" }));

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_requests_agree() {
    let server = start(flights_service()).await;
    let client = reqwest::Client::new();
    let url = server.url("/classify-intent");

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            let response: IntentResponse = client
                .post(&url)
                .json(&json!({ "text": "I need to book a flight to Rome" }))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            response.intent
        }));
    }

    let mut labels = Vec::new();
    for task in tasks {
        labels.push(task.await.unwrap());
    }
    assert!(labels.iter().all(|label| label == &labels[0]));
    assert!(["book_flight", "cancel_flight"].contains(&labels[0].as_str()));

    server.stop().await;
}
