//! End-to-end tests over a real TCP listener.

use serde_json::Value;
use std::collections::HashSet;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use micro_api::http::ServerError;
use micro_api::Shutdown;

mod common;
use common::TestApp;

struct Running {
    addr: SocketAddr,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), ServerError>>,
}

async fn start(app: TestApp) -> (Running, TestApp) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    // Keep handles to the sinks; the server itself moves into the task.
    let TestApp { server, spans, logs } = app;
    let observer = TestApp {
        server: micro_api::HttpServer::with_parts(
            server.config().clone(),
            server.message().clone(),
            server.pipeline().clone(),
        ),
        spans,
        logs,
    };

    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
    (
        Running {
            addr,
            shutdown,
            handle,
        },
        observer,
    )
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_serves_envelopes_over_tcp() {
    let (running, observer) = start(TestApp::new()).await;
    let base = format!("http://{}", running.addr);
    let client = client();

    let resp = client.get(format!("{base}/message")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "application/json");
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(
        resp.text().await.unwrap(),
        r#"{"statusCode":200,"data":"Hello World"}"#
    );

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();

    let logs = observer.logs.records();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].ip, "127.0.0.1");
    assert_eq!(logs[0].host, running.addr.to_string());
}

#[tokio::test]
async fn test_concurrent_reads_never_see_torn_values() {
    let (running, observer) = start(TestApp::new()).await;
    let base = format!("http://{}", running.addr);
    let client = client();

    let values: Vec<String> = (0..4).map(|i| format!("message number {i} {}", "x".repeat(i * 50))).collect();
    let mut allowed: HashSet<String> = values.iter().cloned().collect();
    allowed.insert("Hello World".to_string());

    let writer = {
        let client = client.clone();
        let base = base.clone();
        let values = values.clone();
        tokio::spawn(async move {
            for round in 0..20 {
                let value = &values[round % values.len()];
                let resp = client
                    .put(format!("{base}/configuration"))
                    .json(&serde_json::json!({ "message": value }))
                    .send()
                    .await
                    .unwrap();
                assert_eq!(resp.status(), 202);
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let base = base.clone();
        readers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..20 {
                let body: Value = client
                    .get(format!("{base}/message"))
                    .send()
                    .await
                    .unwrap()
                    .json()
                    .await
                    .unwrap();
                assert_eq!(body["statusCode"], 200);
                seen.push(body["data"].as_str().unwrap().to_string());
            }
            seen
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        for value in reader.await.unwrap() {
            assert!(allowed.contains(&value), "torn or unknown value {value:?}");
        }
    }

    // After the last write, reads return it.
    let last = values[19 % values.len()].clone();
    let body: Value = client
        .get(format!("{base}/message"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"], last.as_str());

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();
    assert_eq!(observer.logs.records().len(), 20 + 8 * 20 + 1);
}

#[tokio::test]
async fn test_shutdown_drains_side_effects() {
    let (running, observer) = start(TestApp::new()).await;
    let base = format!("http://{}", running.addr);
    let client = client();

    for path in ["/ping", "/health/live", "/health/ready", "/nope"] {
        client.get(format!("{base}{path}")).send().await.unwrap();
    }

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();

    assert_eq!(observer.server.pipeline().tasks().pending(), 0);
    assert_eq!(observer.spans.spans().len(), 4);
    assert_eq!(observer.logs.records().len(), 4);
    assert_eq!(observer.request_count("404", "GET", "unmatched"), Some(1.0));
}

#[tokio::test]
async fn test_metrics_endpoint_over_tcp() {
    let (running, _observer) = start(TestApp::new()).await;
    let base = format!("http://{}", running.addr);
    let client = client();

    client.get(format!("{base}/ping")).send().await.unwrap();
    let resp = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();
    assert!(text.contains("itest_http_request_count"));
    assert!(!text.contains(r#"path="/metrics""#));

    running.shutdown.trigger();
    running.handle.await.unwrap().unwrap();
}
