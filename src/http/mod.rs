//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, request id + trace layers)
//!     → dispatcher.rs (resolve, middleware chain, verb resolution)
//!         → context.rs (request accessors, lazy bounded body)
//!         → middleware/ (before / after / on_error hooks)
//!     → response.rs (Outcome → status, headers, body via codec.rs)
//!     → Send to client
//! ```

pub mod codec;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod response;
pub mod server;

pub use codec::{CodecError, JsonCodec};
pub use context::{BodyError, RequestContext};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, HttpError};
pub use middleware::{Middleware, MiddlewareChain};
pub use response::{materialize, Outcome, Res};
pub use server::{HttpServer, ServerError};
