//! File-routed HTTP server with hot-reloading script units.
//!
//! A request path is resolved against a directory tree of Rhai scripts; the
//! matching script is compiled on demand (and recompiled when its mtime
//! changes), then the function named after the HTTP verb is called with a
//! request context, wrapped in a before/after/on_error middleware chain.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod units;

pub use config::ServerConfig;
pub use http::{HttpServer, Middleware};
pub use lifecycle::Shutdown;
