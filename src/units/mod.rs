//! Units: route source files compiled into invokable handlers.
//!
//! # Data Flow
//! ```text
//! location (from routing)
//!     → cache.rs (mtime check, per-location lock)
//!     → compiler.rs (fresh engine, parse, verb table, artifacts)
//!     → unit.rs (CompiledUnit: invoke verb with a request context)
//!
//! watcher.rs (background) → cache.invalidate / cache.load
//! ```

pub mod bindings;
pub mod cache;
pub mod compiler;
pub mod error;
pub mod unit;
pub mod verb;
pub mod watcher;

pub use cache::UnitCache;
pub use compiler::{ArtifactStore, UnitCompiler};
pub use error::{Diagnostic, UnitError};
pub use unit::CompiledUnit;
pub use verb::{Verb, VerbTable};
pub use watcher::{precompile_tree, PrecompileReport, UnitWatcher, WatchError};
