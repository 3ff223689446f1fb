use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wifi_keysearch_rs::coordinator::{SearchConfig, SearchCoordinator};
use wifi_keysearch_rs::radio::SimulatedRadio;
use wifi_keysearch_rs::server::{router, AppState};

fn app(content: &str, passphrase: &str) -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let wordlist = dir.path().join("rockyou.txt");
    std::fs::write(&wordlist, content).unwrap();
    let config = SearchConfig {
        wordlist,
        checkpoint: dir.path().join("checkpoint.txt"),
        ..SearchConfig::default()
    };
    let coordinator = Arc::new(SearchCoordinator::new(config, SimulatedRadio::new(passphrase)));
    (dir, router(AppState::new(coordinator)))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), 1 << 20).await.unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn status_starts_idle() {
    let (_dir, app) = app("aaa\n", "x");
    let (status, body) = call(&app, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["state"], "idle");
    assert_eq!(v["percent"], 0);
    assert!(v["target"].is_null());

    let (status, _) = call(&app, "GET", "/api/result", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn search_without_target_is_rejected() {
    let (_dir, app) = app("aaa\n", "x");
    let (status, _) = call(&app, "POST", "/api/search", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_ssid_is_rejected() {
    let (_dir, app) = app("aaa\n", "x");
    let target = json!({ "ssid": " ", "bssid": "00:11:22:33:44:55" });
    let (status, _) = call(&app, "POST", "/api/target", Some(target)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn selected_target_search_reports_result() {
    let (_dir, app) = app("aaa\nbbb\ntarget123\nddd\n", "target123");
    let target = json!({ "ssid": "TestSSID", "bssid": "00:11:22:33:44:55", "channel": 6 });
    let (status, _) = call(&app, "POST", "/api/target", Some(target)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = call(&app, "GET", "/api/status", None).await;
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["target"]["ssid"], "TestSSID");

    let (status, _) = call(&app, "POST", "/api/search", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (status, body) = call(&app, "GET", "/api/result", None).await;
            if status == StatusCode::OK {
                return serde_json::from_slice::<Value>(&body).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("search never finished");

    assert_eq!(result["outcome"]["status"], "found");
    assert_eq!(result["outcome"]["passphrase"], "target123");
    assert_eq!(result["tested"], 3);
    assert_eq!(result["checkpoint"], 18);
}

#[tokio::test]
async fn cancel_when_idle_is_harmless() {
    let (_dir, app) = app("aaa\n", "x");
    let (status, _) = call(&app, "POST", "/api/cancel", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = call(&app, "DELETE", "/api/target", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn back_to_back_search_requests_start_one_run() {
    let content: String = (0..100).map(|i| format!("slow{i:03}\n")).collect();
    let dir = tempfile::tempdir().unwrap();
    let wordlist = dir.path().join("rockyou.txt");
    std::fs::write(&wordlist, content).unwrap();
    let config = SearchConfig {
        wordlist,
        checkpoint: dir.path().join("checkpoint.txt"),
        ..SearchConfig::default()
    };
    let radio = SimulatedRadio::new("none").with_latency(Duration::from_millis(20));
    let coordinator = Arc::new(SearchCoordinator::new(config, radio));
    let app = router(AppState::new(coordinator));

    let target = json!({ "ssid": "TestSSID", "bssid": "00:11:22:33:44:55" });
    call(&app, "POST", "/api/target", Some(target)).await;

    let (first, _) = call(&app, "POST", "/api/search", None).await;
    let (second, _) = call(&app, "POST", "/api/search", None).await;
    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(second, StatusCode::CONFLICT);

    call(&app, "POST", "/api/cancel", None).await;
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (status, body) = call(&app, "GET", "/api/result", None).await;
            if status == StatusCode::OK {
                return serde_json::from_slice::<Value>(&body).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("search never finished");
    assert_eq!(result["outcome"]["status"], "cancelled");
}
