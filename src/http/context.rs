//! Per-request context handed to middleware and units.
//!
//! # Responsibilities
//! - Expose params, query, headers, cookies, method and path
//! - Read the body lazily, at most once, within the configured size limit
//!
//! # Design Decisions
//! - Cheap to clone (`Arc` inner) so it can be passed into scripts by value
//! - The body is pulled from the transport only when a reader asks for it;
//!   the dispatcher runs on a blocking worker, so reading drives the body
//!   future through the runtime handle captured at construction

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, Request},
};
use rhai::Dynamic;
use thiserror::Error;
use tokio::runtime::Handle;

use crate::http::codec::JsonCodec;
use crate::http::error::{DispatchError, HttpError};

/// Body read failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Read(String),

    #[error("no async runtime available to read the request body")]
    NoRuntime,
}

impl From<BodyError> for DispatchError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::TooLarge { .. } => DispatchError::Http(HttpError::payload_too_large()),
            other => DispatchError::Body(other),
        }
    }
}

enum BodyState {
    Pending(Body),
    Ready(Bytes),
    Failed(BodyError),
}

struct ContextInner {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    params: HashMap<String, String>,
    max_body_bytes: usize,
    body: Mutex<BodyState>,
    runtime: Option<Handle>,
}

/// Request accessors for hooks and units.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.inner.method)
            .field("path", &self.inner.path)
            .field("params", &self.inner.params)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    /// Build a context from a transport request and the bound route params.
    /// `max_body_bytes == 0` means unlimited.
    pub fn from_request(
        request: Request<Body>,
        params: HashMap<String, String>,
        max_body_bytes: usize,
    ) -> Self {
        let (parts, body) = request.into_parts();
        let query = parts
            .uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        let cookies = parse_cookies(&parts.headers);

        Self {
            inner: Arc::new(ContextInner {
                method: parts.method,
                path: parts.uri.path().to_string(),
                query,
                headers: parts.headers,
                cookies,
                params,
                max_body_bytes,
                body: Mutex::new(BodyState::Pending(body)),
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.inner.params
    }

    /// First query value for `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.inner
            .query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query_all(&self, name: &str) -> Vec<&str> {
        self.inner
            .query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.inner
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.inner
            .cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.inner.cookies
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// The raw body. Read once, then served from memory.
    pub fn body_bytes(&self) -> Result<Bytes, DispatchError> {
        let mut state = self.inner.body.lock().unwrap_or_else(PoisonError::into_inner);

        let body = match std::mem::replace(&mut *state, BodyState::Ready(Bytes::new())) {
            BodyState::Ready(bytes) => {
                *state = BodyState::Ready(bytes.clone());
                return Ok(bytes);
            }
            BodyState::Failed(err) => {
                *state = BodyState::Failed(err.clone());
                return Err(err.into());
            }
            BodyState::Pending(body) => body,
        };

        match self.read_body(body) {
            Ok(bytes) => {
                *state = BodyState::Ready(bytes.clone());
                Ok(bytes)
            }
            Err(err) => {
                tracing::debug!(path = %self.inner.path, error = %err, "Request body rejected");
                *state = BodyState::Failed(err.clone());
                Err(err.into())
            }
        }
    }

    /// The body as UTF-8 text (lossy).
    pub fn body_text(&self) -> Result<String, DispatchError> {
        let bytes = self.body_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The body decoded through the interchange codec. Malformed input is a 400.
    pub fn body_value(&self) -> Result<Dynamic, DispatchError> {
        let bytes = self.body_bytes()?;
        JsonCodec
            .decode(&bytes)
            .map_err(|_| DispatchError::Http(HttpError::invalid_json()))
    }

    fn read_body(&self, body: Body) -> Result<Bytes, BodyError> {
        let limit = self.inner.max_body_bytes;

        if limit > 0 {
            let declared = self
                .inner
                .headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<usize>().ok());
            if declared.is_some_and(|len| len > limit) {
                return Err(BodyError::TooLarge { limit });
            }
        }

        let runtime = self.inner.runtime.as_ref().ok_or(BodyError::NoRuntime)?;
        let read_limit = if limit == 0 { usize::MAX } else { limit };
        runtime
            .block_on(axum::body::to_bytes(body, read_limit))
            .map_err(|e| {
                // Transport failures surface as `axum::Error`; the length
                // limit reports its own error type.
                let inner = e.into_inner();
                if inner.is::<axum::Error>() {
                    BodyError::Read(inner.to_string())
                } else {
                    BodyError::TooLarge { limit }
                }
            })
    }
}

fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("x-test", "a")
            .header("x-test", "b")
            .header(header::COOKIE, "session=abc; theme=\"dark\"")
            .header(header::COOKIE, "lang=en")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn context(uri: &str, body: &str, limit: usize) -> RequestContext {
        let params = HashMap::from([("id".to_string(), "42".to_string())]);
        RequestContext::from_request(request(uri, body), params, limit)
    }

    #[test]
    fn test_accessors() {
        let ctx = context("/users/42?q=1&q=2&name=a%20b", "", 0);
        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.path(), "/users/42");
        assert_eq!(ctx.param("id"), Some("42"));
        assert_eq!(ctx.param("missing"), None);
        assert_eq!(ctx.query("q"), Some("1"));
        assert_eq!(ctx.query_all("q"), vec!["1", "2"]);
        assert_eq!(ctx.query("name"), Some("a b"));
        assert_eq!(ctx.header("X-Test"), Some("a"));
        assert_eq!(ctx.header_values("x-test"), vec!["a", "b"]);
        assert_eq!(ctx.cookie("session"), Some("abc"));
        assert_eq!(ctx.cookie("theme"), Some("dark"));
        assert_eq!(ctx.cookie("lang"), Some("en"));
        assert_eq!(ctx.cookies().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_body_read_once_and_cached() {
        let ctx = context("/", r#"{"a":1}"#, 0);
        let text = tokio::task::spawn_blocking(move || {
            let first = ctx.body_text().unwrap();
            let second = ctx.body_text().unwrap();
            assert_eq!(first, second);
            let value = ctx.body_value().unwrap();
            assert!(value.is_map());
            first
        })
        .await
        .unwrap();
        assert_eq!(text, r#"{"a":1}"#);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_body_over_limit_is_413() {
        let ctx = context("/", "0123456789", 4);
        let err = tokio::task::spawn_blocking(move || ctx.body_bytes().unwrap_err())
            .await
            .unwrap();
        match err {
            DispatchError::Http(e) => assert_eq!(e.status, StatusCode::PAYLOAD_TOO_LARGE),
            other => panic!("expected 413, got {other:?}"),
        }
    }

    fn streamed(chunks: Vec<Result<&'static str, std::io::Error>>, limit: usize) -> RequestContext {
        let stream = futures_util::stream::iter(chunks);
        let req = Request::builder()
            .uri("/")
            .body(Body::from_stream(stream))
            .unwrap();
        RequestContext::from_request(req, HashMap::new(), limit)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_streamed_body_limit() {
        let at_limit = streamed(vec![Ok("abc"), Ok("de")], 5);
        let over = streamed(vec![Ok("abc"), Ok("def")], 5);
        let (at_limit, over) = tokio::task::spawn_blocking(move || {
            (at_limit.body_text(), over.body_bytes().unwrap_err())
        })
        .await
        .unwrap();

        assert_eq!(at_limit.unwrap(), "abcde");
        assert!(matches!(over, DispatchError::Http(ref e) if e.status == StatusCode::PAYLOAD_TOO_LARGE));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transport_failure_is_read_error_and_remembered() {
        let ctx = streamed(vec![Ok("abc"), Err(std::io::Error::other("connection reset"))], 0);
        let (first, second) = tokio::task::spawn_blocking(move || {
            (ctx.body_bytes().unwrap_err(), ctx.body_bytes().unwrap_err())
        })
        .await
        .unwrap();

        assert!(matches!(first, DispatchError::Body(BodyError::Read(ref m)) if m.contains("connection reset")));
        assert!(matches!(second, DispatchError::Body(BodyError::Read(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_declared_length_over_limit_rejected_before_read() {
        let req = Request::builder()
            .uri("/")
            .header(header::CONTENT_LENGTH, "100")
            .body(Body::from("tiny"))
            .unwrap();
        let ctx = RequestContext::from_request(req, HashMap::new(), 10);
        let err = tokio::task::spawn_blocking(move || ctx.body_bytes().unwrap_err())
            .await
            .unwrap();
        assert!(matches!(err, DispatchError::Http(ref e) if e.status == StatusCode::PAYLOAD_TOO_LARGE));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_json_is_400() {
        let ctx = context("/", "{not json", 0);
        let err = tokio::task::spawn_blocking(move || ctx.body_value().unwrap_err())
            .await
            .unwrap();
        assert!(matches!(err, DispatchError::Http(ref e) if e.status == StatusCode::BAD_REQUEST));
    }
}
