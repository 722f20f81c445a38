//! Execution results and their conversion into HTTP responses.
//!
//! # Responsibilities
//! - Model what handlers, middleware and recovery produce (`Outcome`)
//! - Materialize an outcome into a transport response
//!
//! # Design Decisions
//! - Text and encoded values always carry content type and length, even for
//!   HEAD where the bytes themselves are dropped
//! - A value the codec cannot encode degrades to a fixed 500 payload

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use rhai::Dynamic;

use crate::http::codec::{JsonCodec, JSON_CONTENT_TYPE};
use crate::http::error::{error_body, HttpError};

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const ENCODE_FAILURE_BODY: &[u8] = br#"{"error":"Internal Server Error"}"#;

/// A structured result: status, headers and a body value.
#[derive(Debug, Clone)]
pub struct Res {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Dynamic,
}

impl Res {
    pub fn new(status: StatusCode, body: Dynamic) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// Status with no body.
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, Dynamic::UNIT)
    }

    /// Copy with `name` set to `value`, replacing any header of the same name.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What a handler, hook or recovery step produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// No content.
    Absent,
    /// Explicit status, headers and body.
    Response(Res),
    /// Plain text.
    Text(String),
    /// Any other value, sent through the codec.
    Value(Dynamic),
}

impl Outcome {
    /// Classify a value returned from a script.
    pub fn from_dynamic(value: Dynamic) -> Self {
        if value.is_unit() {
            Outcome::Absent
        } else if value.is::<Res>() {
            Outcome::Response(value.cast::<Res>())
        } else if value.is::<HttpError>() {
            let err = value.cast::<HttpError>();
            Outcome::Response(Res::new(err.status, err.body))
        } else if value.is_string() {
            Outcome::Text(value.to_string())
        } else {
            Outcome::Value(value)
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Outcome::Absent)
    }

    /// Status this outcome will be sent with when nothing overrides it.
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Absent => StatusCode::NO_CONTENT,
            Outcome::Response(res) => res.status,
            _ => StatusCode::OK,
        }
    }

    pub fn not_found() -> Self {
        Outcome::Response(Res::new(
            StatusCode::NOT_FOUND,
            error_body(&[("error", "Not Found")]),
        ))
    }

    pub fn method_not_allowed(allow: &str) -> Self {
        Outcome::Response(
            Res::new(
                StatusCode::METHOD_NOT_ALLOWED,
                error_body(&[("error", "Method Not Allowed")]),
            )
            .with_header("Allow", allow),
        )
    }
}

impl From<Res> for Outcome {
    fn from(res: Res) -> Self {
        Outcome::Response(res)
    }
}

/// Turn an outcome into a response. `head` drops body bytes only.
pub fn materialize(outcome: Outcome, head: bool, codec: &JsonCodec) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    write_outcome(&mut response, outcome, head, codec, true);
    response
}

fn write_outcome(response: &mut Response, outcome: Outcome, head: bool, codec: &JsonCodec, top: bool) {
    match outcome {
        Outcome::Absent => {
            if top {
                *response.status_mut() = StatusCode::NO_CONTENT;
            }
        }
        Outcome::Response(res) => {
            *response.status_mut() = res.status;
            for (name, value) in &res.headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().insert(name, value);
                    }
                    _ => tracing::warn!(header = %name, "Dropping invalid response header"),
                }
            }
            write_outcome(response, Outcome::from_dynamic(res.body), head, codec, false);
        }
        Outcome::Text(text) => set_body(response, text.into_bytes(), TEXT_CONTENT_TYPE, head),
        Outcome::Value(value) => match codec.encode(&value) {
            Ok(bytes) => set_body(response, bytes, codec.content_type(), head),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode response body");
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response.headers_mut().remove(header::CONTENT_TYPE);
                set_body(response, ENCODE_FAILURE_BODY.to_vec(), JSON_CONTENT_TYPE, head);
            }
        },
    }
}

fn set_body(response: &mut Response, bytes: Vec<u8>, content_type: &'static str, head: bool) {
    let headers = response.headers_mut();
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    if !head {
        *response.body_mut() = Body::from(bytes);
    }
}
