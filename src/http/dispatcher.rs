//! Per-request orchestration.
//!
//! # Data Flow
//! ```text
//! Request
//!     → PathResolver::resolve (location + params, or no-match, or RouteError)
//!     → RequestContext
//!     → MiddlewareChain::run(
//!           terminal: 404 | load unit → OPTIONS / HEAD / verb / 405
//!           recover:  HttpError as-is, anything else 500
//!       )
//!     → materialize (HEAD drops body bytes)
//! ```
//!
//! # Design Decisions
//! - Resolution happens before the context exists (params come from it), but
//!   its errors are raised inside the terminal step so on_error hooks see them
//! - Units run synchronously on a blocking worker; the async handler only
//!   hands the request over and awaits the response

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
};

use crate::config::ServerConfig;
use crate::http::codec::JsonCodec;
use crate::http::context::RequestContext;
use crate::http::error::{error_body, DispatchError};
use crate::http::middleware::{Middleware, MiddlewareChain};
use crate::http::response::{materialize, Outcome, Res};
use crate::routing::{PathResolver, RouteError, RouteMatch};
use crate::units::{UnitCache, Verb};

const INTERNAL_ERROR: &str = "Internal Server Error";

/// Resolves, runs middleware and units, and builds responses.
pub struct Dispatcher {
    resolver: PathResolver,
    cache: Arc<UnitCache>,
    chain: MiddlewareChain,
    codec: JsonCodec,
    max_body_bytes: usize,
    expose_internal: bool,
}

impl Dispatcher {
    pub fn new(
        config: &ServerConfig,
        resolver: PathResolver,
        cache: Arc<UnitCache>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        Self {
            resolver,
            cache,
            chain: MiddlewareChain::new(middleware),
            codec: JsonCodec,
            max_body_bytes: config.limits.max_body_bytes,
            expose_internal: config.errors.expose_internal,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<UnitCache> {
        &self.cache
    }

    /// Dispatch on a blocking worker.
    pub async fn handle(self: Arc<Self>, request: Request<Body>) -> Response {
        let codec = self.codec;
        let head = request.method() == Method::HEAD;
        match tokio::task::spawn_blocking(move || self.dispatch(request)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Dispatch worker failed");
                let body = error_body(&[("error", INTERNAL_ERROR)]);
                materialize(Res::new(StatusCode::INTERNAL_SERVER_ERROR, body).into(), head, &codec)
            }
        }
    }

    /// Dispatch synchronously. Blocks on unit compilation and body reads.
    pub fn dispatch(&self, request: Request<Body>) -> Response {
        let head = request.method() == Method::HEAD;
        let resolved = self.resolver.resolve(request.uri().path());
        let params = match &resolved {
            Ok(Some(route)) => route.params.clone(),
            _ => HashMap::new(),
        };
        let ctx = RequestContext::from_request(request, params, self.max_body_bytes);

        let outcome = self.chain.run(
            &ctx,
            |ctx| self.terminal(resolved, ctx),
            |err| self.recover(&ctx, err),
        );
        materialize(outcome, head, &self.codec)
    }

    fn terminal(
        &self,
        resolved: Result<Option<RouteMatch>, RouteError>,
        ctx: &RequestContext,
    ) -> Result<Outcome, DispatchError> {
        let Some(route) = resolved? else {
            tracing::debug!(path = %ctx.path(), "No unit matched");
            return Ok(Outcome::not_found());
        };

        let unit = self.cache.load(&route.location)?;
        let verbs = unit.verbs();
        let method = ctx.method();

        if method == Method::OPTIONS {
            let allow = verbs.allow_header();
            return Ok(Res::empty(StatusCode::NO_CONTENT).with_header("Allow", &allow).into());
        }

        let verb = if method == Method::HEAD {
            [Verb::Head, Verb::Get].into_iter().find(|v| unit.has(*v))
        } else {
            Verb::from_method(method).filter(|v| unit.has(*v))
        };

        match verb {
            Some(verb) => unit.invoke(verb, ctx),
            None => Ok(Outcome::method_not_allowed(&verbs.allow_header())),
        }
    }

    /// Default mapping for errors no middleware recovered.
    fn recover(&self, ctx: &RequestContext, err: DispatchError) -> Outcome {
        match err {
            DispatchError::Http(e) => Res::new(e.status, e.body).into(),
            other => {
                tracing::error!(
                    method = %ctx.method(),
                    path = %ctx.path(),
                    error = %other,
                    "Request failed"
                );
                let body = if self.expose_internal {
                    error_body(&[("error", INTERNAL_ERROR), ("message", &other.to_string())])
                } else {
                    error_body(&[("error", INTERNAL_ERROR)])
                };
                Res::new(StatusCode::INTERNAL_SERVER_ERROR, body).into()
            }
        }
    }
}
