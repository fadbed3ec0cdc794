//! End-to-end redirect behavior over real sockets.

use reqwest::header::LOCATION;
use reqwest::StatusCode;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_path_tail_redirect() {
    let server = common::start_redirector(28201, 28202, r#"{"go": "https://golang.org{{.URL.Path}}"}"#).await;
    let client = common::client();

    let res = client.get(format!("{}/go/doc", server.redirect_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()[LOCATION], "https://golang.org/doc");
    assert_eq!(res.headers()["content-length"], "0");
    assert!(res.headers().contains_key("x-request-id"));
    assert!(res.bytes().await.unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_head_returns_location_without_redirect() {
    let rules = r#"{"search": "https://example.com/s?q={{.URL.Query.Get \"q\"}}"}"#;
    let server = common::start_redirector(28211, 28212, rules).await;
    let client = common::client();

    let res = client.head(format!("{}/search?q=cats", server.redirect_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[LOCATION], "https://example.com/s?q=cats");

    server.stop().await;
}

#[tokio::test]
async fn test_render_failure_counts_visit() {
    let server = common::start_redirector(28221, 28222, r#"{"bad": "{{.Nonexistent.Field}}"}"#).await;
    let client = common::client();

    let res = client.get(format!("{}/bad", server.redirect_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.headers().get(LOCATION).is_none());
    assert!(res.text().await.unwrap().contains("Nonexistent"));

    let entry: Value = client
        .get(format!("{}/api/bad", server.control_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(entry["hits"], 1);

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_service_is_404() {
    let server = common::start_redirector(28231, 28232, r#"{"go": "https://golang.org"}"#).await;
    let client = common::client();

    let res = client.get(format!("{}/missing", server.redirect_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "404 page not found");

    let list: Value = client
        .get(format!("{}/api/", server.control_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list.get("missing").is_none());
    assert_eq!(list["go"]["hits"], 0);

    server.stop().await;
}

#[tokio::test]
async fn test_remote_addr_is_visible() {
    let server = common::start_redirector(28241, 28242, r#"{"who": "https://x/{{.RemoteAddr}}"}"#).await;
    let client = common::client();

    let res = client.get(format!("{}/who", server.redirect_url)).send().await.unwrap();
    let location = res.headers()[LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("https://x/127.0.0.1:"), "got {}", location);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_hits_are_all_counted() {
    let server = common::start_redirector(28251, 28252, r#"{"hot": "https://hot"}"#).await;
    let client = common::client();

    let tasks = 8;
    let per_task = 25;
    let mut handles = Vec::new();
    for _ in 0..tasks {
        let client = client.clone();
        let url = format!("{}/hot", server.redirect_url);
        handles.push(tokio::spawn(async move {
            for _ in 0..per_task {
                let res = client.get(&url).send().await.unwrap();
                assert_eq!(res.status(), StatusCode::FOUND);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let entry: Value = client
        .get(format!("{}/api/hot", server.control_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(entry["hits"], tasks * per_task);

    server.stop().await;
}
