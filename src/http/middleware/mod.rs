//! Cross-cutting hooks around unit dispatch.
//!
//! # Data Flow
//! ```text
//! before[0] → before[1] → … → terminal (verb resolution + unit call)
//!                 │ first non-absent result short-circuits
//!                 ▼
//!         error? → on_error[k] … on_error[0]   (executed hooks only, reversed)
//!                 ▼
//! after[k] … after[0]   (always, reversed; failures skipped)
//! ```
//!
//! # Design Decisions
//! - Every hook has a pass-through default, so a middleware implements only
//!   what it needs
//! - The list is fixed when the server is built

pub mod chain;
pub mod cors;

use crate::http::context::RequestContext;
use crate::http::error::DispatchError;
use crate::http::response::Outcome;

pub use chain::MiddlewareChain;
pub use cors::Cors;

/// A set of optional hooks run around every request.
pub trait Middleware: Send + Sync {
    /// Runs before the handler. A non-absent result becomes the outcome and
    /// the handler is skipped.
    fn before(&self, _ctx: &RequestContext) -> Result<Outcome, DispatchError> {
        Ok(Outcome::Absent)
    }

    /// Transforms the outcome on the way out.
    fn after(&self, _ctx: &RequestContext, outcome: Outcome) -> Result<Outcome, DispatchError> {
        Ok(outcome)
    }

    /// Recovers from an error, or returns one (the same or a new one) to pass
    /// it on.
    fn on_error(&self, _ctx: &RequestContext, err: DispatchError) -> Result<Outcome, DispatchError> {
        Err(err)
    }

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
