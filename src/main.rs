//! Redirector
//!
//! Serves templated HTTP redirects and a small control API.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                 REDIRECTOR                   │
//!   Client Request       │  ┌─────────┐    ┌──────────┐   ┌──────────┐  │
//!   ─────────────────────┼─▶│  http   │───▶│  rules   │──▶│ template │  │
//!                        │  │ server  │    │  engine  │   │  render  │  │
//!   302 Location         │  └─────────┘    └────┬─────┘   └──────────┘  │
//!   ◀────────────────────┼──────────────────────┘                       │
//!                        │                      ▲ reload                │
//!   Operator             │  ┌─────────┐    ┌────┴─────┐   ┌──────────┐  │
//!   ─────────────────────┼─▶│ control │───▶│ storage  │   │  stats   │  │
//!                        │  │   API   │    │  (JSON)  │   │ (counts) │  │
//!                        │  └─────────┘    └──────────┘   └──────────┘  │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use redirector::config::{load_config, validate_config, RedirectorConfig};
use redirector::lifecycle::{self, signals, Shutdown};
use redirector::observability::logging;

#[derive(Parser)]
#[command(name = "redirector")]
#[command(about = "Templated HTTP redirect server", long_about = None)]
struct Cli {
    /// Path to configuration file (TOML). The rules file is set with --rules;
    /// a .json path given here is taken as the rules file
    #[arg(short, long, value_name = "FILE", env = "REDIRECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Redirect listener address
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Control API listener address
    #[arg(long, value_name = "ADDR")]
    control_addr: Option<String>,

    /// Rules file
    #[arg(long, value_name = "FILE")]
    rules: Option<String>,

    /// Directory served under /ui/ on the control listener
    #[arg(long, value_name = "DIR")]
    ui: Option<String>,

    /// Reload rules when the rules file changes
    #[arg(long)]
    watch: bool,

    /// Do not start the control API
    #[arg(long)]
    no_control: bool,
}

impl Cli {
    /// Treat `--config rules.json` as `--rules rules.json`.
    /// Returns the path when it was moved.
    fn take_json_config(&mut self) -> Option<String> {
        let is_json = self
            .config
            .as_ref()
            .and_then(|path| path.extension())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json || self.rules.is_some() {
            return None;
        }
        let path = self.config.take()?.to_string_lossy().into_owned();
        self.rules = Some(path.clone());
        Some(path)
    }

    fn apply(self, config: &mut RedirectorConfig) {
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(addr) = self.control_addr {
            config.control.bind_address = addr;
        }
        if let Some(rules) = self.rules {
            config.storage.path = rules;
        }
        if let Some(ui) = self.ui {
            config.control.ui_dir = Some(ui);
        }
        if self.watch {
            config.storage.watch = true;
        }
        if self.no_control {
            config.control.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut cli = Cli::parse();
    let json_config = cli.take_json_config();

    let mut config = match cli.config.take() {
        Some(path) => load_config(&path)?,
        None => RedirectorConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(redirector::config::ConfigError::Validation)?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "redirector starting");
    if let Some(path) = json_config {
        tracing::warn!(rules = %path, "--config points at a JSON file, using it as the rules file");
    }
    tracing::info!(
        bind_address = %config.listener.bind_address,
        control_enabled = config.control.enabled,
        control_address = %config.control.bind_address,
        rules = %config.storage.path,
        watch = config.storage.watch,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let running = lifecycle::start(config, &shutdown).await?;

    signals::shutdown_signal().await;
    shutdown.trigger();
    running.wait().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_config_is_rules_file() {
        let mut cli = Cli::try_parse_from(["redirector", "--config", "./redir.json"]).unwrap();
        assert_eq!(cli.take_json_config().as_deref(), Some("./redir.json"));
        assert!(cli.config.is_none());

        let mut config = RedirectorConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.storage.path, "./redir.json");
    }

    #[test]
    fn test_toml_config_is_kept() {
        let mut cli = Cli::try_parse_from(["redirector", "-c", "redirector.toml", "--rules", "r.json"]).unwrap();
        assert!(cli.take_json_config().is_none());
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("redirector.toml")));

        let mut config = RedirectorConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.storage.path, "r.json");
    }

    #[test]
    fn test_explicit_rules_wins_over_json_config() {
        let mut cli = Cli::try_parse_from(["redirector", "--config", "a.json", "--rules", "b.json"]).unwrap();
        assert!(cli.take_json_config().is_none());
        assert_eq!(cli.rules.as_deref(), Some("b.json"));
    }
}
