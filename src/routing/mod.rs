//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → segment.rs (normalize, decode, safety check)
//!     → resolver.rs (walk the route directory, static before dynamic)
//!     → Return: RouteMatch { location, params }, no-match, or RouteError
//! ```
//!
//! # Route tree layout
//! ```text
//! routes/
//!     index.rhai          → /
//!     about.rhai          → /about
//!     users/index.rhai    → /users
//!     users/[id]/index.rhai → /users/:id
//!     [slug].rhai         → /:slug
//! ```
//!
//! # Design Decisions
//! - The filesystem is the route table; there is no in-memory route registry
//! - Deterministic: static entries always win over dynamic siblings
//! - Explicit errors for ambiguous trees rather than silent ordering

pub mod resolver;
pub mod segment;

pub use resolver::{PathResolver, RouteError, RouteMatch};
