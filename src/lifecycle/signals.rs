//! OS signal handling.
//!
//! # Responsibilities
//! - SIGINT / SIGTERM → graceful shutdown
//! - SIGHUP → re-read the rules file and rebuild the table
//! - Rules file change events → same as SIGHUP
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A failed reload is logged; the previous rules stay in effect

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::rules::Engine;

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn refresh(engine: &Engine, trigger: &'static str) {
    match engine.refresh() {
        Ok(()) => tracing::info!(trigger, "Rules refreshed"),
        Err(e) => tracing::warn!(trigger, error = %e, "Rules refresh failed, keeping current rules"),
    }
}

/// Refresh the engine every time `changes` yields, until shutdown.
pub fn spawn_reload_on_change(
    engine: Arc<Engine>,
    mut changes: mpsc::UnboundedReceiver<()>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                change = changes.recv() => match change {
                    Some(()) => {
                        // Editors and our own saves emit bursts; fold them into one refresh.
                        while changes.try_recv().is_ok() {}
                        refresh(&engine, "file")
                    }
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    })
}

/// Refresh the engine on SIGHUP, until shutdown.
#[cfg(unix)]
pub fn spawn_reload_on_hangup(
    engine: Arc<Engine>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                received = hangup.recv() => match received {
                    Some(()) => refresh(&engine, "sighup"),
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::rules::RedirectOutcome;
    use crate::stats::InMemoryStats;
    use crate::storage::JsonStorage;
    use crate::template::RequestContext;
    use axum::http::Method;

    #[tokio::test]
    async fn test_change_events_refresh_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redir.json");
        std::fs::write(&path, r#"{"a": "https://a"}"#).unwrap();

        let storage = Arc::new(JsonStorage::open(&path).unwrap());
        let engine = Arc::new(Engine::new(storage, Arc::new(InMemoryStats::new())));
        engine.reload().unwrap();

        let shutdown = Shutdown::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = spawn_reload_on_change(engine.clone(), rx, shutdown.subscribe());

        std::fs::write(&path, r#"{"b": "https://b"}"#).unwrap();
        tx.send(()).unwrap();

        let request = RequestContext::from_uri(Method::GET, "/b").unwrap();
        let mut outcome = RedirectOutcome::NotFound;
        for _ in 0..50 {
            outcome = engine.serve(&request);
            if outcome != RedirectOutcome::NotFound {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(outcome, RedirectOutcome::Found("https://b".into()));

        shutdown.trigger();
        task.await.unwrap();
    }
}
