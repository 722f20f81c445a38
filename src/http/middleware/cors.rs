//! Permissive CORS middleware.

use axum::http::{Method, StatusCode};
use rhai::Dynamic;

use crate::config::CorsConfig;
use crate::http::context::RequestContext;
use crate::http::error::DispatchError;
use crate::http::middleware::Middleware;
use crate::http::response::{Outcome, Res};

const ALLOW_METHODS: &str = "GET,POST,PUT,PATCH,DELETE,OPTIONS";

/// Answers preflight requests and stamps CORS headers on every response.
#[derive(Debug, Clone)]
pub struct Cors {
    allow_origin: String,
    allow_headers: String,
    max_age_secs: u64,
}

impl Cors {
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            allow_origin: config.allow_origin.clone(),
            allow_headers: config.allow_headers.clone(),
            max_age_secs: config.max_age_secs,
        }
    }

    fn stamp(&self, res: Res) -> Res {
        res.with_header("Access-Control-Allow-Origin", &self.allow_origin)
            .with_header("Vary", "Origin")
    }
}

impl Middleware for Cors {
    fn before(&self, ctx: &RequestContext) -> Result<Outcome, DispatchError> {
        if ctx.method() != Method::OPTIONS {
            return Ok(Outcome::Absent);
        }

        let allow_headers = ctx
            .header("Access-Control-Request-Headers")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(&self.allow_headers);

        let preflight = Res::empty(StatusCode::NO_CONTENT)
            .with_header("Access-Control-Allow-Methods", ALLOW_METHODS)
            .with_header("Access-Control-Allow-Headers", allow_headers)
            .with_header("Access-Control-Max-Age", &self.max_age_secs.to_string());
        Ok(Outcome::Response(self.stamp(preflight)))
    }

    fn after(&self, _ctx: &RequestContext, outcome: Outcome) -> Result<Outcome, DispatchError> {
        let res = match outcome {
            Outcome::Response(res) => res,
            Outcome::Absent => Res::empty(StatusCode::NO_CONTENT),
            Outcome::Text(text) => Res::new(StatusCode::OK, Dynamic::from(text)),
            Outcome::Value(value) => Res::new(StatusCode::OK, value),
        };
        Ok(Outcome::Response(self.stamp(res)))
    }

    fn name(&self) -> &str {
        "cors"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::body::Body;
    use axum::http::Request;

    fn ctx(method: Method, request_headers: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().method(method).uri("/users");
        if let Some(h) = request_headers {
            builder = builder.header("Access-Control-Request-Headers", h);
        }
        RequestContext::from_request(builder.body(Body::empty()).unwrap(), HashMap::new(), 0)
    }

    fn response(outcome: Outcome) -> Res {
        match outcome {
            Outcome::Response(res) => res,
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_preflight_answered() {
        let cors = Cors::new(&CorsConfig::default());
        let res = response(cors.before(&ctx(Method::OPTIONS, None)).unwrap());
        assert_eq!(res.status, StatusCode::NO_CONTENT);
        assert_eq!(res.header("access-control-allow-methods"), Some(ALLOW_METHODS));
        assert_eq!(res.header("access-control-allow-headers"), Some("content-type, authorization"));
        assert_eq!(res.header("access-control-max-age"), Some("86400"));
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    }

    #[test]
    fn test_preflight_echoes_requested_headers() {
        let cors = Cors::new(&CorsConfig::default());
        let res = response(cors.before(&ctx(Method::OPTIONS, Some("x-custom"))).unwrap());
        assert_eq!(res.header("access-control-allow-headers"), Some("x-custom"));
    }

    #[test]
    fn test_non_preflight_passes_through() {
        let cors = Cors::new(&CorsConfig::default());
        assert!(cors.before(&ctx(Method::GET, None)).unwrap().is_absent());
    }

    #[test]
    fn test_after_wraps_every_outcome() {
        let cors = Cors::new(&CorsConfig::default());
        let get = ctx(Method::GET, None);

        let absent = response(cors.after(&get, Outcome::Absent).unwrap());
        assert_eq!(absent.status, StatusCode::NO_CONTENT);
        assert_eq!(absent.header("vary"), Some("Origin"));

        let text = response(cors.after(&get, Outcome::Text("hi".into())).unwrap());
        assert_eq!(text.status, StatusCode::OK);
        assert!(text.body.is_string());

        let created = Res::empty(StatusCode::CREATED);
        let kept = response(cors.after(&get, created.into()).unwrap());
        assert_eq!(kept.status, StatusCode::CREATED);
        assert_eq!(kept.header("access-control-allow-origin"), Some("*"));
    }
}
