//! Runs a fixed middleware list around a terminal step.

use std::sync::Arc;

use crate::http::context::RequestContext;
use crate::http::error::DispatchError;
use crate::http::middleware::Middleware;
use crate::http::response::Outcome;

/// Ordered, immutable middleware list.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middleware: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new(middleware: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            middleware: Arc::new(middleware),
        }
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Run the full before → terminal → on_error → after protocol.
    ///
    /// `recover` maps an error no hook recovered into an outcome.
    pub fn run<T, R>(&self, ctx: &RequestContext, terminal: T, recover: R) -> Outcome
    where
        T: FnOnce(&RequestContext) -> Result<Outcome, DispatchError>,
        R: FnOnce(DispatchError) -> Outcome,
    {
        let mut executed = 0;
        let result = self.run_before(ctx, &mut executed).and_then(|short| match short {
            Some(outcome) => Ok(outcome),
            None => terminal(ctx),
        });

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => match self.recover(ctx, err, executed) {
                Ok(outcome) => outcome,
                Err(err) => recover(err),
            },
        };

        self.run_after(ctx, outcome, executed)
    }

    /// Before hooks in order. `executed` counts hooks that were entered,
    /// including one that failed.
    fn run_before(
        &self,
        ctx: &RequestContext,
        executed: &mut usize,
    ) -> Result<Option<Outcome>, DispatchError> {
        for middleware in self.middleware.iter() {
            *executed += 1;
            let outcome = middleware.before(ctx)?;
            if !outcome.is_absent() {
                tracing::debug!(middleware = middleware.name(), "Before hook short-circuited");
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    fn recover(
        &self,
        ctx: &RequestContext,
        mut err: DispatchError,
        executed: usize,
    ) -> Result<Outcome, DispatchError> {
        for middleware in self.middleware[..executed].iter().rev() {
            match middleware.on_error(ctx, err) {
                Ok(outcome) => return Ok(outcome),
                Err(next) => err = next,
            }
        }
        Err(err)
    }

    fn run_after(&self, ctx: &RequestContext, mut outcome: Outcome, executed: usize) -> Outcome {
        for middleware in self.middleware[..executed].iter().rev() {
            match middleware.after(ctx, outcome.clone()) {
                Ok(next) => outcome = next,
                Err(e) => tracing::warn!(
                    middleware = middleware.name(),
                    error = %e,
                    "After hook failed, keeping previous result"
                ),
            }
        }
        outcome
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.middleware.iter().map(|m| m.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rhai::Dynamic;

    use crate::http::error::HttpError;
    use crate::http::response::Res;

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Default)]
    struct Recorder {
        tag: &'static str,
        log: Log,
        short_circuit: bool,
        fail_before: bool,
        fail_after: bool,
        recover: bool,
        rethrow_as: Option<&'static str>,
    }

    impl Recorder {
        fn new(tag: &'static str, log: &Log) -> Self {
            Self {
                tag,
                log: Arc::clone(log),
                ..Default::default()
            }
        }

        fn push(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{}.{event}", self.tag));
        }
    }

    impl Middleware for Recorder {
        fn before(&self, _ctx: &RequestContext) -> Result<Outcome, DispatchError> {
            self.push("before");
            if self.fail_before {
                return Err(DispatchError::Internal(format!("{} before", self.tag)));
            }
            if self.short_circuit {
                return Ok(Outcome::Text(format!("from {}", self.tag)));
            }
            Ok(Outcome::Absent)
        }

        fn after(&self, _ctx: &RequestContext, outcome: Outcome) -> Result<Outcome, DispatchError> {
            self.push("after");
            if self.fail_after {
                return Err(DispatchError::Internal("after".into()));
            }
            match outcome {
                Outcome::Text(text) => Ok(Outcome::Text(format!("{text}+{}", self.tag))),
                other => Ok(other),
            }
        }

        fn on_error(&self, _ctx: &RequestContext, err: DispatchError) -> Result<Outcome, DispatchError> {
            self.push(&format!("on_error({err})"));
            if let Some(next) = self.rethrow_as {
                return Err(DispatchError::Internal(next.into()));
            }
            if self.recover {
                return Ok(Outcome::Text(format!("recovered by {}", self.tag)));
            }
            Err(err)
        }
    }

    fn ctx() -> RequestContext {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        RequestContext::from_request(request, HashMap::new(), 0)
    }

    fn chain(items: Vec<Recorder>) -> MiddlewareChain {
        MiddlewareChain::new(
            items
                .into_iter()
                .map(|m| Arc::new(m) as Arc<dyn Middleware>)
                .collect(),
        )
    }

    fn text(outcome: Outcome) -> String {
        match outcome {
            Outcome::Text(text) => text,
            other => panic!("expected text, got {other:?}"),
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn unrecovered(_: DispatchError) -> Outcome {
        Outcome::Text("default".into())
    }

    #[test]
    fn test_order_without_errors() {
        let log = Log::default();
        let chain = chain(vec![Recorder::new("a", &log), Recorder::new("b", &log)]);

        let outcome = chain.run(
            &ctx(),
            |_| {
                log.lock().unwrap().push("handler".into());
                Ok(Outcome::Text("h".into()))
            },
            unrecovered,
        );

        assert_eq!(text(outcome), "h+b+a");
        assert_eq!(entries(&log), vec!["a.before", "b.before", "handler", "b.after", "a.after"]);
    }

    #[test]
    fn test_before_short_circuit_skips_handler_and_later_hooks() {
        let log = Log::default();
        let mut first = Recorder::new("a", &log);
        first.short_circuit = true;
        let chain = chain(vec![first, Recorder::new("b", &log)]);

        let outcome = chain.run(&ctx(), |_| panic!("handler must not run"), unrecovered);

        assert_eq!(text(outcome), "from a+a");
        assert_eq!(entries(&log), vec!["a.before", "a.after"]);
    }

    #[test]
    fn test_failing_after_hook_is_skipped() {
        let log = Log::default();
        let mut middle = Recorder::new("b", &log);
        middle.fail_after = true;
        let chain = chain(vec![Recorder::new("a", &log), middle, Recorder::new("c", &log)]);

        let outcome = chain.run(&ctx(), |_| Ok(Outcome::Text("h".into())), unrecovered);

        assert_eq!(text(outcome), "h+c+a");
        assert_eq!(
            entries(&log),
            vec!["a.before", "b.before", "c.before", "c.after", "b.after", "a.after"]
        );
    }

    #[test]
    fn test_on_error_reverse_order_first_recovery_wins() {
        let log = Log::default();
        let mut outer = Recorder::new("a", &log);
        outer.recover = true;
        let mut inner = Recorder::new("b", &log);
        inner.recover = true;
        let chain = chain(vec![outer, inner, Recorder::new("c", &log)]);

        let outcome = chain.run(
            &ctx(),
            |_| Err(DispatchError::Internal("boom".into())),
            unrecovered,
        );

        assert_eq!(text(outcome), "recovered by b+c+b+a");
        assert_eq!(
            entries(&log),
            vec![
                "a.before",
                "b.before",
                "c.before",
                "c.on_error(boom)",
                "b.on_error(boom)",
                "c.after",
                "b.after",
                "a.after",
            ]
        );
    }

    #[test]
    fn test_rethrown_error_replaces_original() {
        let log = Log::default();
        let mut outer = Recorder::new("a", &log);
        outer.recover = false;
        let mut inner = Recorder::new("b", &log);
        inner.rethrow_as = Some("second");
        let chain = chain(vec![outer, inner]);

        let seen = Arc::new(Mutex::new(String::new()));
        let seen_by_default = Arc::clone(&seen);
        chain.run(
            &ctx(),
            |_| Err(DispatchError::Internal("first".into())),
            move |err| {
                *seen_by_default.lock().unwrap() = err.to_string();
                Outcome::Absent
            },
        );

        assert_eq!(*seen.lock().unwrap(), "second");
        assert!(entries(&log).contains(&"a.on_error(second)".to_string()));
    }

    #[test]
    fn test_before_failure_only_unwinds_entered_hooks() {
        let log = Log::default();
        let mut first = Recorder::new("a", &log);
        first.fail_before = true;
        let chain = chain(vec![first, Recorder::new("b", &log)]);

        let outcome = chain.run(&ctx(), |_| panic!("handler must not run"), unrecovered);

        assert_eq!(text(outcome), "default+a");
        assert_eq!(entries(&log), vec!["a.before", "a.on_error(a before)", "a.after"]);
    }

    #[test]
    fn test_domain_error_reaches_hooks_unchanged() {
        let log = Log::default();
        let chain = chain(vec![Recorder::new("a", &log)]);

        let outcome = chain.run(
            &ctx(),
            |_| Err(HttpError::new(StatusCode::CONFLICT, Dynamic::UNIT).into()),
            |err| match err {
                DispatchError::Http(e) => Res::empty(e.status).into(),
                other => panic!("unexpected {other:?}"),
            },
        );

        assert_eq!(outcome.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_empty_chain_runs_handler() {
        let outcome = MiddlewareChain::default().run(&ctx(), |_| Ok(Outcome::Absent), unrecovered);
        assert!(outcome.is_absent());
    }
}
