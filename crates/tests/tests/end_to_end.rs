//! Cross-crate E2E tests
//!
//! These tests run the real HTTP server over JSON collections on disk and
//! talk to it with a real HTTP client.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use quaero_index::{
    EncoderProvider, FailingEncoderProvider, HashingEncoderProvider, IndexBuilder, JsonDirSource,
    Readiness, SearchIndex,
};
use quaero_server::{SearchServer, ServerConfig};

/// Get an available port for testing.
fn get_test_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn write_collections(dir: &Path) {
    std::fs::write(
        dir.join("contracts.json"),
        json!([
            {"question": "What makes a contract legally binding?",
             "answer": "Offer, acceptance, consideration and intention.",
             "source": "Indian Contract Act"},
            {"question": "Can a minor enter into a contract?",
             "answer": "No, an agreement with a minor is void."}
        ])
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.join("family.json"),
        json!([
            {"question": "How do I file for divorce?",
             "answer": "File a petition in the family court."},
            {"question": "Who gets custody of the children?",
             "answer": "Courts decide based on the welfare of the child."},
            {"question": "Is maintenance payable after divorce?",
             "answer": "Yes, depending on the circumstances."}
        ])
        .to_string(),
    )
    .unwrap();
}

struct TestServer {
    base: String,
    index: Arc<SearchIndex>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<std::io::Result<()>>>,
}

impl TestServer {
    /// Start a server; the index is built only if `build` is set.
    async fn start(data_dir: &Path, encoders: Arc<dyn EncoderProvider>, build: bool) -> Self {
        let port = get_test_port();
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();

        let index = Arc::new(SearchIndex::new());
        let builder = Arc::new(IndexBuilder::new(
            Arc::new(JsonDirSource::new(data_dir)),
            encoders,
        ));
        if build {
            builder.spawn(index.clone()).unwrap();
        }

        let server = SearchServer::new(ServerConfig::new(addr), index.clone(), builder);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            server
                .run_with_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            base: format!("http://127.0.0.1:{}", port),
            index,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = reqwest::get(format!("{}{}", self.base, path)).await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn wait_healthy(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.index.wait_until_settled())
            .await
            .expect("index build timed out");
        let (_, body) = self.get("/health").await;
        assert_eq!(body["status"], "healthy", "health: {body}");
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send(()).ok();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// E2E Test: build from disk, then list and search over HTTP
#[tokio::test]
async fn test_e2e_search_flow() {
    let data = tempfile::tempdir().unwrap();
    write_collections(data.path());

    let server = TestServer::start(
        data.path(),
        Arc::new(HashingEncoderProvider::new(256)),
        true,
    )
    .await;
    server.wait_healthy().await;

    let (status, body) = server.get("/datasets").await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({"datasets": [
            {"name": "contracts", "count": 2},
            {"name": "family", "count": 3}
        ]})
    );

    let (status, body) = server
        .post("/search", json!({"query": "file for divorce", "limit": 2}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["total"], 2);
    assert_eq!(body["results"][0]["question"], "How do I file for divorce?");
    assert_eq!(body["results"][0]["dataset"], "family");
    assert!(body["time_taken"].is_number());

    let (_, body) = server
        .post(
            "/search",
            json!({"query": "legally binding contract", "dataset": "contracts", "limit": 10}),
        )
        .await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["results"][0]["metadata"]["source"], "Indian Contract Act");
    let scores: Vec<f64> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["score"].as_f64().unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    let (status, body) = server
        .post("/search", json!({"query": "divorce", "dataset": "patents"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["results"], json!([]));
    assert_eq!(body["total"], 0);

    let (status, body) = server.post("/search", json!({"dataset": "family"})).await;
    assert_eq!(status, 400);
    assert_eq!(body["type"], "error");

    server.stop().await;
}

/// E2E Test: queries are rejected until an index exists, then reindex builds one
#[tokio::test]
async fn test_e2e_not_ready_then_reindex() {
    let data = tempfile::tempdir().unwrap();
    write_collections(data.path());

    let server = TestServer::start(
        data.path(),
        Arc::new(HashingEncoderProvider::new(64)),
        false,
    )
    .await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "initializing", "phase": "uninitialized"}));

    let (status, body) = server.post("/search", json!({"query": "divorce"})).await;
    assert_eq!(status, 503);
    assert_eq!(body["error"]["type"], "service_not_ready");

    let (status, body) = server.get("/datasets").await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"datasets": []}));

    let (status, body) = server.post("/reindex", json!({})).await;
    assert_eq!(status, 202);
    assert_eq!(body, json!({"status": "accepted"}));

    server.wait_healthy().await;
    let (status, body) = server.post("/search", json!({"query": "divorce"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["total"], 5);

    server.stop().await;
}

/// E2E Test: an unavailable encoder leaves the service failed, not crashed
#[tokio::test]
async fn test_e2e_encoder_unavailable() {
    let data = tempfile::tempdir().unwrap();
    write_collections(data.path());

    let server = TestServer::start(
        data.path(),
        Arc::new(FailingEncoderProvider::new("model not installed")),
        true,
    )
    .await;
    let settled = tokio::time::timeout(Duration::from_secs(10), server.index.wait_until_settled())
        .await
        .unwrap();
    assert_eq!(settled, Readiness::Failed);

    let (_, body) = server.get("/health").await;
    assert_eq!(body, json!({"status": "initializing", "phase": "failed"}));

    let (status, _) = server.post("/search", json!({"query": "divorce"})).await;
    assert_eq!(status, 503);

    server.stop().await;
}

/// E2E Test: a malformed collection file is skipped, the rest are served
#[tokio::test]
async fn test_e2e_malformed_collection_skipped() {
    let data = tempfile::tempdir().unwrap();
    write_collections(data.path());
    std::fs::write(data.path().join("broken.json"), "[{\"question\": ").unwrap();

    let server = TestServer::start(
        data.path(),
        Arc::new(HashingEncoderProvider::new(64)),
        true,
    )
    .await;
    server.wait_healthy().await;

    let (_, body) = server.get("/datasets").await;
    let names: Vec<_> = body["datasets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["contracts", "family"]);

    server.stop().await;
}

/// E2E Test: a missing data directory still yields a healthy, empty index
#[tokio::test]
async fn test_e2e_missing_data_dir() {
    let data = tempfile::tempdir().unwrap();
    let server = TestServer::start(
        &data.path().join("nowhere"),
        Arc::new(HashingEncoderProvider::new(64)),
        true,
    )
    .await;
    server.wait_healthy().await;

    let (status, body) = server.post("/search", json!({"query": "anything"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["total"], 0);

    server.stop().await;
}
