//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Start background tasks (metrics exporter, rules watcher, SIGHUP)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Unreadable rules file is fatal: a later save would overwrite it
//! - A rule that fails to compile is not fatal; the server starts empty
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{RedirectorConfig, RulesWatcher};
use crate::control::{ControlServer, ControlState};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::rules::Engine;
use crate::stats::InMemoryStats;
use crate::storage::{JsonStorage, StorageError};

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("load rules from {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: StorageError,
    },

    #[error("bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("watch rules file: {0}")]
    Watch(#[from] notify::Error),

    #[error("install SIGHUP handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Storage, stats and engine wired together.
pub struct Core {
    pub storage: Arc<JsonStorage>,
    pub stats: Arc<InMemoryStats>,
    pub engine: Arc<Engine>,
}

/// Load the rules file and build the first table.
pub fn init_core(config: &RedirectorConfig) -> Result<Core, StartupError> {
    let storage = JsonStorage::open(&config.storage.path).map_err(|source| StartupError::Storage {
        path: config.storage.path.clone(),
        source,
    })?;
    let storage = Arc::new(storage);
    let stats = Arc::new(InMemoryStats::new());
    let engine = Arc::new(Engine::new(storage.clone(), stats.clone()));

    if let Err(e) = engine.reload() {
        tracing::error!(error = %e, "Initial rule load failed, starting with no rules");
    }

    Ok(Core { storage, stats, engine })
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address).await.map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}

/// A started redirector.
pub struct Running {
    pub core: Core,
    pub redirect_addr: SocketAddr,
    pub control_addr: Option<SocketAddr>,
    servers: Vec<JoinHandle<Result<(), std::io::Error>>>,
    background: Vec<JoinHandle<()>>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl Running {
    /// Wait for every listener to stop.
    pub async fn wait(self) -> Result<(), std::io::Error> {
        let mut result = Ok(());
        for server in self.servers {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Server failed");
                    result = Err(e);
                }
                Err(e) => tracing::error!(error = %e, "Server task panicked"),
            }
        }
        for task in self.background {
            let _ = task.await;
        }
        result
    }
}

/// Start everything described by `config`. Servers stop when `shutdown` fires.
pub async fn start(config: RedirectorConfig, shutdown: &Shutdown) -> Result<Running, StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let core = init_core(&config)?;
    let mut background = Vec::new();

    let watcher = if config.storage.watch {
        let (watcher, changes) = RulesWatcher::new(core.storage.path());
        let handle = watcher.run()?;
        background.push(signals::spawn_reload_on_change(
            core.engine.clone(),
            changes,
            shutdown.subscribe(),
        ));
        Some(handle)
    } else {
        None
    };

    #[cfg(unix)]
    background.push(
        signals::spawn_reload_on_hangup(core.engine.clone(), shutdown.subscribe())
            .map_err(StartupError::Signal)?,
    );

    let redirect_listener = bind(&config.listener.bind_address).await?;
    let redirect_addr = redirect_listener
        .local_addr()
        .map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;

    let mut servers = Vec::new();
    let mut control_addr = None;

    if config.control.enabled {
        let control_listener = bind(&config.control.bind_address).await?;
        control_addr = control_listener.local_addr().ok();
        let state = ControlState {
            storage: core.storage.clone(),
            stats: core.stats.clone(),
            engine: core.engine.clone(),
            redirect_port: redirect_addr.port().to_string(),
        };
        let control = ControlServer::new(&config, state);
        servers.push(tokio::spawn(control.run(control_listener, shutdown.subscribe())));
    }

    let server = HttpServer::new(config, core.engine.clone());
    servers.push(tokio::spawn(server.run(redirect_listener, shutdown.subscribe())));

    tracing::info!(
        redirect = %redirect_addr,
        control = ?control_addr,
        rules = core.engine.table().len(),
        "Redirector started"
    );

    Ok(Running {
        core,
        redirect_addr,
        control_addr,
        servers,
        background,
        _watcher: watcher,
    })
}
