//! hotroute: file-routed HTTP server.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ axum (request id, trace) ──▶ Dispatcher
//!                                                    │
//!                            ┌───────────────────────┼─────────────────────┐
//!                            ▼                       ▼                     ▼
//!                      PathResolver            MiddlewareChain          UnitCache ◀── UnitWatcher
//!                   (routes/ directory)    (before/after/on_error)   (compile on mtime)   (notify)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use hotroute::config::{load_config, validate_config, ConfigError, ServerConfig};
use hotroute::lifecycle::Shutdown;
use hotroute::observability::{logging, metrics};
use hotroute::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "hotroute", version, about = "Serve a directory of Rhai route units over HTTP")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Route root directory (overrides `routes.root`).
    #[arg(short, long)]
    routes: Option<PathBuf>,

    /// Bind host (overrides `listener.host`).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides `listener.port`).
    #[arg(short, long)]
    port: Option<u16>,

    /// Disable the background unit watcher.
    #[arg(long)]
    no_watch: bool,

    /// Include internal error messages in 500 responses.
    #[arg(long)]
    expose_errors: bool,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(routes) = &self.routes {
            config.routes.root = routes.clone();
        }
        if let Some(host) = &self.host {
            config.listener.host = host.clone();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if self.no_watch {
            config.watcher.enabled = false;
        }
        if self.expose_errors {
            config.errors.expose_internal = true;
        }
    }

    /// File config (or defaults) with flag overrides, validated as a whole.
    fn resolve_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = cli.resolve_config()?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "hotroute starting");
    tracing::info!(
        bind_address = %config.bind_address(),
        routes = ?config.routes.root,
        watcher = config.watcher.enabled,
        max_body_bytes = config.limits.max_body_bytes,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(config.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(args: &[&str]) -> Result<ServerConfig, ConfigError> {
        let argv = std::iter::once("hotroute").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().resolve_config()
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = resolve(&["--routes", "site", "--port", "9000", "--no-watch"]).unwrap();
        assert_eq!(config.routes.root, PathBuf::from("site"));
        assert_eq!(config.listener.port, 9000);
        assert!(!config.watcher.enabled);
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        match resolve(&["--port", "0"]) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors, vec![hotroute::config::ValidationError::ZeroPort]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
