//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the unit cache, resolver and dispatcher from config
//! - Create the Axum router: every path goes to the dispatcher
//! - Wire up tower layers (request id, tracing)
//! - Start the unit watcher (or precompile) and serve until shutdown

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::dispatcher::Dispatcher;
use crate::http::middleware::{Cors, Middleware};
use crate::lifecycle::shutdown_signal;
use crate::observability::metrics;
use crate::routing::PathResolver;
use crate::units::{precompile_tree, UnitCache, UnitCompiler, UnitWatcher, WatchError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unit watcher failed to start: {0}")]
    Watch(#[from] WatchError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// File-routed HTTP server.
pub struct HttpServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Server with only the built-in middleware enabled by config.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_middleware(config, Vec::new())
    }

    /// Server with `middleware` run in the given order, after the built-ins.
    pub fn with_middleware(config: ServerConfig, middleware: Vec<Arc<dyn Middleware>>) -> Self {
        let resolver = PathResolver::new(&config.routes.root, config.routes.extension.clone());
        let compiler = UnitCompiler::new(config.routes.cache_dir(), config.limits.max_operations);
        let cache = Arc::new(UnitCache::new(compiler));

        let mut chain: Vec<Arc<dyn Middleware>> = Vec::with_capacity(middleware.len() + 1);
        if config.cors.enabled {
            chain.push(Arc::new(Cors::new(&config.cors)));
        }
        chain.extend(middleware);

        let dispatcher = Arc::new(Dispatcher::new(&config, resolver, cache, chain));
        Self { config, dispatcher }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The Axum router with all layers. Usable without `run` for in-process tests.
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
        };
        Router::new()
            .route("/", any(unit_handler))
            .route("/{*path}", any(unit_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server until Ctrl-C or `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let watcher = self.start_units().await?;

        tracing::info!(
            address = %addr,
            root = ?self.dispatcher.resolver().root(),
            watcher = watcher.is_some(),
            "HTTP server starting"
        );

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await;

        if let Some(mut watcher) = watcher {
            tokio::task::spawn_blocking(move || watcher.stop()).await?;
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Start the watcher, or precompile once when it is disabled.
    async fn start_units(&self) -> Result<Option<UnitWatcher>, ServerError> {
        let resolver = self.dispatcher.resolver().clone();
        let cache = Arc::clone(self.dispatcher.cache());

        if self.config.watcher.enabled {
            let watcher = tokio::task::spawn_blocking(move || UnitWatcher::start(resolver, cache)).await??;
            return Ok(Some(watcher));
        }

        if self.config.routes.precompile {
            let report = tokio::task::spawn_blocking(move || {
                precompile_tree(resolver.root(), &resolver, &cache)
            })
            .await?;
            tracing::info!(
                compiled = report.compiled,
                failed = report.failed,
                "Units precompiled"
            );
        }
        Ok(None)
    }
}

/// Hands every request to the dispatcher.
async fn unit_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = Arc::clone(&state.dispatcher).handle(request).await;

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}
