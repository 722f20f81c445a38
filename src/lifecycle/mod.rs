//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main + HttpServer::run):
//!     Load config → Init logging/metrics → Bind → Start watcher / precompile → Serve
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     Ctrl-C or Shutdown::trigger → Stop accepting → Drain in-flight → Stop watcher
//! ```
//!
//! # Design Decisions
//! - One broadcast channel fans the stop request out to every long-running task
//! - The watcher is stopped after the listener drains, so late requests still
//!   see fresh units

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
