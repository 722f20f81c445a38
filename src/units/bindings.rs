//! Script API available to every unit.
//!
//! ```text
//! fn get(ctx) {
//!     let id = ctx.param("id");
//!     if id == () { throw http_error(400, #{ error: "missing id" }); }
//!     res(201, #{ id: id }).header("x-created", "1")
//! }
//! ```

use axum::http::StatusCode;
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map};

use crate::http::context::RequestContext;
use crate::http::error::HttpError;
use crate::http::response::Res;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Register `Ctx`, `Res` and `HttpError` with their functions on `engine`.
pub fn register(engine: &mut Engine) {
    register_context(engine);
    register_results(engine);
}

fn register_context(engine: &mut Engine) {
    engine
        .register_type_with_name::<RequestContext>("Ctx")
        .register_fn("param", |ctx: &mut RequestContext, name: ImmutableString| {
            optional(ctx.param(&name))
        })
        .register_fn("query", |ctx: &mut RequestContext, name: ImmutableString| {
            optional(ctx.query(&name))
        })
        .register_fn("query_all", |ctx: &mut RequestContext, name: ImmutableString| {
            strings(ctx.query_all(&name))
        })
        .register_fn("header", |ctx: &mut RequestContext, name: ImmutableString| {
            optional(ctx.header(&name))
        })
        .register_fn("headers", |ctx: &mut RequestContext, name: ImmutableString| {
            strings(ctx.header_values(&name))
        })
        .register_fn("headers", |ctx: &mut RequestContext| {
            let mut map = Map::new();
            for name in ctx.headers().keys() {
                let joined = ctx.header_values(name.as_str()).join(", ");
                map.insert(name.as_str().into(), Dynamic::from(joined));
            }
            map
        })
        .register_fn("cookie", |ctx: &mut RequestContext, name: ImmutableString| {
            optional(ctx.cookie(&name))
        })
        .register_fn("cookies", |ctx: &mut RequestContext| {
            let mut map = Map::new();
            for (name, value) in ctx.cookies() {
                map.entry(name.as_str().into())
                    .or_insert_with(|| Dynamic::from(value.clone()));
            }
            map
        })
        .register_fn("method", |ctx: &mut RequestContext| {
            ctx.method().as_str().to_string()
        })
        .register_fn("path", |ctx: &mut RequestContext| ctx.path().to_string())
        .register_fn("body_bytes", |ctx: &mut RequestContext| -> ScriptResult<Dynamic> {
            let bytes = ctx.body_bytes().map_err(|e| e.into_script())?;
            Ok(Dynamic::from_blob(bytes.to_vec()))
        })
        .register_fn("body_text", |ctx: &mut RequestContext| -> ScriptResult<String> {
            ctx.body_text().map_err(|e| e.into_script())
        })
        .register_fn("body", |ctx: &mut RequestContext| -> ScriptResult<Dynamic> {
            ctx.body_value().map_err(|e| e.into_script())
        });
}

fn register_results(engine: &mut Engine) {
    engine
        .register_type_with_name::<Res>("Res")
        .register_fn("res", |status: i64, body: Dynamic| -> ScriptResult<Res> {
            Ok(Res::new(status_code(status)?, body))
        })
        .register_fn("res", |status: i64| -> ScriptResult<Res> {
            Ok(Res::empty(status_code(status)?))
        })
        .register_fn(
            "header",
            |res: &mut Res, name: ImmutableString, value: ImmutableString| {
                res.clone().with_header(&name, &value)
            },
        )
        .register_get("status", |res: &mut Res| i64::from(res.status.as_u16()))
        .register_get("body", |res: &mut Res| res.body.clone());

    engine
        .register_type_with_name::<HttpError>("HttpError")
        .register_fn("http_error", |status: i64, body: Dynamic| -> ScriptResult<HttpError> {
            Ok(HttpError::new(status_code(status)?, body))
        })
        .register_get("status", |err: &mut HttpError| i64::from(err.status.as_u16()))
        .register_get("body", |err: &mut HttpError| err.body.clone())
        .register_fn("to_string", |err: &mut HttpError| err.to_string());
}

fn status_code(status: i64) -> ScriptResult<StatusCode> {
    u16::try_from(status)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| format!("invalid HTTP status: {status}").into())
}

fn optional(value: Option<&str>) -> Dynamic {
    value.map_or(Dynamic::UNIT, |v| Dynamic::from(v.to_string()))
}

fn strings(values: Vec<&str>) -> Array {
    values
        .into_iter()
        .map(|v| Dynamic::from(v.to_string()))
        .collect()
}
