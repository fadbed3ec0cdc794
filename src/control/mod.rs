//! Control API and UI.
//!
//! # Routes
//! ```text
//! GET    /api/            → every rule with its hit count
//! GET    /api/<service>   → one rule, 404 when unknown
//! POST   /api/[<service>] → create or replace (JSON or form body), 204
//! PUT    /api/[<service>]   same as POST
//! PATCH  /api/[<service>]   same as POST
//! DELETE /api/<service>   → remove, 204
//! *      /api/...         → list
//! GET    /ui/...          → static files from `control.ui_dir`
//! *      /                → 307 to ui/
//! ```
//!
//! # Design Decisions
//! - Every successful mutation is followed by `Engine::reload`
//! - Storage writes and the reload after them run on the blocking pool
//! - Templates are compiled before they are stored, so a rejected rule
//!   never reaches disk
//! - Bound to loopback by default; there is no authentication

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::any, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RedirectorConfig;
use crate::http::UuidRequestId;
use crate::rules::Engine;
use crate::stats::StatReader;
use crate::storage::Storage;

pub use handlers::{ControlEntry, ControlError, X_REDIR_PORT};

/// State shared by control handlers.
#[derive(Clone)]
pub struct ControlState {
    pub storage: Arc<dyn Storage>,
    pub stats: Arc<dyn StatReader>,
    pub engine: Arc<Engine>,
    /// Port of the redirect listener, echoed in `X-Redir-Port`.
    pub redirect_port: String,
}

/// Build the control router.
#[allow(deprecated)]
pub fn setup_control_router(config: &RedirectorConfig, state: ControlState) -> Router {
    let mut router = Router::new()
        .route("/api", any(handlers::api))
        .route("/api/", any(handlers::api))
        .route("/api/{*service}", any(handlers::api))
        .route("/", any(handlers::root))
        .with_state(state);

    if let Some(dir) = &config.control.ui_dir {
        router = router.nest_service("/ui", ServeDir::new(dir));
    }

    router
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}

/// HTTP server for the control listener.
pub struct ControlServer {
    router: Router,
}

impl ControlServer {
    pub fn new(config: &RedirectorConfig, state: ControlState) -> Self {
        Self {
            router: setup_control_router(config, state),
        }
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Control server starting");

        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Control server stopped");
        Ok(())
    }
}
