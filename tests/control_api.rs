//! Control API and lifecycle tests against a running redirector.

use std::time::Duration;

use redirector::lifecycle::{self, Shutdown, StartupError};
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn test_set_then_redirect_then_remove() {
    let server = common::start_redirector(28301, 28302, "{}").await;
    let client = common::client();

    let res = client
        .post(format!("{}/api/", server.control_url))
        .json(&json!({"url": "go", "template": "https://golang.org{{.URL.Path}}"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client.get(format!("{}/go/doc", server.redirect_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[LOCATION], "https://golang.org/doc");

    let saved = std::fs::read_to_string(&server.rules_path).unwrap();
    assert!(saved.contains("\n    \"go\": "), "unexpected file layout: {}", saved);

    let res = client.delete(format!("{}/api/go", server.control_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = client.get(format!("{}/go/doc", server.redirect_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_list_carries_redirect_port() {
    let server = common::start_redirector(28311, 28312, r#"{"a": "https://a"}"#).await;
    let client = common::client();

    let res = client.get(format!("{}/api/", server.control_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-redir-port"], "28311");
    let list: Value = res.json().await.unwrap();
    assert_eq!(list["a"]["template"], "https://a");
    assert_eq!(list["a"]["url"], "a");

    server.stop().await;
}

#[tokio::test]
async fn test_bad_template_is_rejected() {
    let server = common::start_redirector(28321, 28322, r#"{"keep": "https://keep"}"#).await;
    let client = common::client();

    let res = client
        .post(format!("{}/api/broken", server.control_url))
        .form(&[("template", "{{if .Method}}")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let saved = std::fs::read_to_string(&server.rules_path).unwrap();
    assert!(!saved.contains("broken"));
    let res = client.get(format!("{}/keep", server.redirect_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_reregistering_same_rule_is_idempotent() {
    let server = common::start_redirector(28331, 28332, r#"{"go": "https://golang.org{{.URL.Path}}"}"#).await;
    let client = common::client();
    let url = format!("{}/go/x?y=1", server.redirect_url);

    let before = client.get(&url).send().await.unwrap().headers()[LOCATION].clone();
    let res = client
        .put(format!("{}/api/go", server.control_url))
        .form(&[("template", "https://golang.org{{.URL.Path}}")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let after = client.get(&url).send().await.unwrap().headers()[LOCATION].clone();
    assert_eq!(before, after);

    server.stop().await;
}

#[tokio::test]
async fn test_file_edit_is_picked_up_when_watching() {
    let server = common::start_with(28341, 28342, r#"{"old": "https://old"}"#, |config| {
        config.storage.watch = true;
    })
    .await;
    let client = common::client();

    std::fs::write(&server.rules_path, r#"{"new": "https://new"}"#).unwrap();

    let mut status = StatusCode::NOT_FOUND;
    for _ in 0..50 {
        status = client
            .get(format!("{}/new", server.redirect_url))
            .send()
            .await
            .unwrap()
            .status();
        if status == StatusCode::FOUND {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(status, StatusCode::FOUND);
    let res = client.get(format!("{}/old", server.redirect_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_broken_rule_at_startup_serves_nothing() {
    let rules = r#"{"ok": "https://ok", "broken": "{{if .Method}}"}"#;
    let server = common::start_redirector(28351, 28352, rules).await;
    let client = common::client();

    let res = client.get(format!("{}/ok", server.redirect_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(server.running.core.engine.table().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_corrupt_rules_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("redir.json");
    std::fs::write(&path, "{not json").unwrap();

    let config = common::test_config(28361, 28362, &path);
    let shutdown = Shutdown::new();
    let err = lifecycle::start(config, &shutdown).await.err().expect("start should fail");
    assert!(matches!(err, StartupError::Storage { .. }));

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
}

#[tokio::test]
async fn test_missing_rules_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");

    let config = common::test_config(28371, 28372, &path);
    let shutdown = Shutdown::new();
    let running = lifecycle::start(config, &shutdown).await.unwrap();
    assert!(running.core.engine.table().is_empty());

    shutdown.trigger();
    running.wait().await.unwrap();
}
