//! Shared utilities for integration tests.

use std::path::PathBuf;
use std::time::Duration;

use redirector::config::RedirectorConfig;
use redirector::lifecycle::{self, Running, Shutdown};
use tempfile::TempDir;

/// A redirector running on fixed loopback ports with its own rules file.
pub struct TestRedirector {
    pub running: Running,
    pub shutdown: Shutdown,
    pub rules_path: PathBuf,
    pub redirect_url: String,
    pub control_url: String,
    _dir: TempDir,
}

impl TestRedirector {
    #[allow(dead_code)]
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.running.wait().await;
    }
}

/// Config pointing both listeners at `127.0.0.1:<port>`.
pub fn test_config(redirect_port: u16, control_port: u16, rules_path: &std::path::Path) -> RedirectorConfig {
    let mut config = RedirectorConfig::default();
    config.listener.bind_address = format!("127.0.0.1:{}", redirect_port);
    config.control.bind_address = format!("127.0.0.1:{}", control_port);
    config.storage.path = rules_path.to_string_lossy().into_owned();
    config.timeouts.request_secs = 5;
    config
}

/// Write `rules_json` to a fresh rules file and start a redirector on it.
pub async fn start_redirector(redirect_port: u16, control_port: u16, rules_json: &str) -> TestRedirector {
    start_with(redirect_port, control_port, rules_json, |_| {}).await
}

/// Like [`start_redirector`] but lets the caller adjust the config first.
pub async fn start_with<F>(redirect_port: u16, control_port: u16, rules_json: &str, adjust: F) -> TestRedirector
where
    F: FnOnce(&mut RedirectorConfig),
{
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("redir.json");
    std::fs::write(&rules_path, rules_json).unwrap();

    let mut config = test_config(redirect_port, control_port, &rules_path);
    adjust(&mut config);

    let shutdown = Shutdown::new();
    let running = lifecycle::start(config, &shutdown).await.expect("redirector failed to start");

    // Let the accept loops come up.
    tokio::time::sleep(Duration::from_millis(100)).await;

    TestRedirector {
        redirect_url: format!("http://{}", running.redirect_addr),
        control_url: format!("http://127.0.0.1:{}", control_port),
        running,
        shutdown,
        rules_path,
        _dir: dir,
    }
}

/// HTTP client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
