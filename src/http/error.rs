//! Errors raised while dispatching a request.
//!
//! # Design Decisions
//! - `HttpError` is the only domain error: it carries the status and body the
//!   client should see and is passed through default recovery untouched
//! - Everything else is wrapped into `DispatchError` and becomes a 500 unless
//!   a middleware recovers it

use std::fmt;

use axum::http::StatusCode;
use rhai::{Dynamic, EvalAltResult, Map};
use thiserror::Error;

use crate::http::context::BodyError;
use crate::routing::RouteError;
use crate::units::UnitError;

/// An intentional HTTP failure with an explicit status and body.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: StatusCode,
    pub body: Dynamic,
}

impl HttpError {
    pub fn new(status: StatusCode, body: Dynamic) -> Self {
        Self { status, body }
    }

    /// Error whose body is `{"error": <message>}`.
    pub fn with_message(status: StatusCode, message: &str) -> Self {
        Self::new(status, error_body(&[("error", message)]))
    }

    pub fn payload_too_large() -> Self {
        Self::with_message(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
    }

    pub fn invalid_json() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            error_body(&[("error", "Bad Request"), ("message", "Invalid JSON")]),
        )
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}: {}", self.status.as_u16(), self.body)
    }
}

impl std::error::Error for HttpError {}

/// Anything that can abort the request pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Domain error with explicit status/body.
    #[error("{0}")]
    Http(HttpError),

    /// The route tree is ambiguous for this request.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The unit could not be stat'ed, read or compiled.
    #[error(transparent)]
    Unit(#[from] UnitError),

    /// The request body could not be read. Oversized bodies are mapped to a
    /// 413 `Http` error instead, see `From<BodyError>`.
    #[error(transparent)]
    Body(BodyError),

    /// A unit raised an error at runtime.
    #[error("script error: {0}")]
    Script(String),

    /// Any other failure, typically from middleware.
    #[error("{0}")]
    Internal(String),
}

impl From<HttpError> for DispatchError {
    fn from(err: HttpError) -> Self {
        DispatchError::Http(err)
    }
}

impl DispatchError {
    /// Translate a script evaluation failure.
    ///
    /// A thrown `HttpError` value is recovered as a domain error no matter
    /// how deeply it was raised.
    pub fn from_script(err: Box<EvalAltResult>) -> Self {
        match *err {
            EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => Self::from_script(inner),
            EvalAltResult::ErrorInModule(_, inner, _) => Self::from_script(inner),
            EvalAltResult::ErrorRuntime(value, pos) => {
                if value.is::<HttpError>() {
                    DispatchError::Http(value.cast::<HttpError>())
                } else if pos.is_none() {
                    DispatchError::Script(value.to_string())
                } else {
                    DispatchError::Script(format!("{} ({})", value, pos))
                }
            }
            other => DispatchError::Script(other.to_string()),
        }
    }

    /// Convert into a script-side runtime error so it can cross a native call.
    pub fn into_script(self) -> Box<EvalAltResult> {
        let value = match self {
            DispatchError::Http(e) => Dynamic::from(e),
            other => Dynamic::from(other.to_string()),
        };
        Box::new(EvalAltResult::ErrorRuntime(value, rhai::Position::NONE))
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, DispatchError::Http(_))
    }
}

/// Build a small `{key: value}` object body.
pub fn error_body(pairs: &[(&str, &str)]) -> Dynamic {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert((*key).into(), Dynamic::from(value.to_string()));
    }
    Dynamic::from_map(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thrown_http_error_unwrapped_from_call_chain() {
        let thrown = Box::new(EvalAltResult::ErrorRuntime(
            Dynamic::from(HttpError::with_message(StatusCode::FORBIDDEN, "nope")),
            rhai::Position::NONE,
        ));
        let nested = Box::new(EvalAltResult::ErrorInFunctionCall(
            "get".into(),
            String::new(),
            thrown,
            rhai::Position::NONE,
        ));

        match DispatchError::from_script(nested) {
            DispatchError::Http(e) => assert_eq!(e.status, StatusCode::FORBIDDEN),
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_throw_is_script_error() {
        let thrown = Box::new(EvalAltResult::ErrorRuntime(
            Dynamic::from("boom".to_string()),
            rhai::Position::NONE,
        ));
        let err = DispatchError::from_script(thrown);
        assert!(!err.is_domain());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_round_trip_through_script_boundary() {
        let err = DispatchError::from(HttpError::payload_too_large());
        match DispatchError::from_script(err.into_script()) {
            DispatchError::Http(e) => assert_eq!(e.status, StatusCode::PAYLOAD_TOO_LARGE),
            other => panic!("expected domain error, got {other:?}"),
        }
    }
}
