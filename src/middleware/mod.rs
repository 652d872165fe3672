//! Middleware layer.
//!
//! Middleware intercepts a request on its way to the handler and is the
//! right place for cross-cutting concerns: CORS, CSRF checks,
//! authentication, tracing. Each middleware receives the request and a [`Next`]
//! continuation and may:
//!
//! - call `next.run(req)` and return (or adjust) what it produces;
//! - return a response of its own without calling `next`, which skips the
//!   rest of the chain and the handler;
//! - return an error, which ends the request with an error page.
//!
//! [`Next`] is consumed by `run`, so the rest of the chain runs at most once.
//!
//! Middleware is referenced by name from routes ([`Scope::middleware`]) and
//! from configuration (`middleware.default`). The name is its identity: a
//! chain never contains the same name twice.
//!
//! [`Scope::middleware`]: crate::Scope::middleware

mod auth;
mod cors;
mod csrf;
mod trace;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;
use crate::response::Response;

pub use auth::{BearerAuth, TokenVerifier};
pub use cors::Cors;
pub use csrf::{CSRF_COOKIE, CSRF_FIELD, Csrf, CsrfToken, csrf_field};
pub use trace::Trace;

/// A request interceptor in the chain around a handler.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, next: Next, req: Request) -> BoxFuture<Result<Response, Error>>;
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The rest of the chain, ending at the route's handler.
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(chain: Vec<Arc<dyn Middleware>>, endpoint: BoxedHandler) -> Self {
        Self { chain: chain.into(), index: 0, endpoint }
    }

    /// Runs the next middleware, or the handler once the chain is exhausted.
    pub fn run(self, req: Request) -> BoxFuture<Result<Response, Error>> {
        match self.chain.get(self.index) {
            Some(middleware) => {
                let middleware = Arc::clone(middleware);
                let next = Self {
                    chain: self.chain,
                    index: self.index + 1,
                    endpoint: self.endpoint,
                };
                middleware.handle(next, req)
            }
            None => self.endpoint.call(req),
        }
    }
}

// ── Built-ins ─────────────────────────────────────────────────────────────────

/// Calls `next` and nothing else. The chain used when a route has no
/// middleware at all.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

impl Middleware for Passthrough {
    fn handle(&self, next: Next, req: Request) -> BoxFuture<Result<Response, Error>> {
        next.run(req)
    }
}

/// Middleware from an async function or closure.
///
/// ```rust
/// use kiln::middleware::{self, Next};
/// use kiln::{Error, Request, Response};
///
/// async fn powered_by(next: Next, req: Request) -> Result<Response, Error> {
///     Ok(next.run(req).await?.with_header("x-powered-by", "kiln"))
/// }
///
/// let mw = middleware::from_fn(powered_by);
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Next, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    FromFn(f)
}

/// See [`from_fn`].
pub struct FromFn<F>(F);

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Next, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    fn handle(&self, next: Next, req: Request) -> BoxFuture<Result<Response, Error>> {
        Box::pin((self.0)(next, req))
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

pub const PASSTHROUGH: &str = "passthrough";

/// Name → middleware lookup used to assemble chains.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    entries: HashMap<String, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register(PASSTHROUGH, Passthrough);
        registry
    }

    /// Registers (or replaces) the middleware called `name`.
    pub fn register(&mut self, name: &str, middleware: impl Middleware) {
        self.entries.insert(name.to_owned(), Arc::new(middleware));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Assembles the chain for one request: route-specific names first, then
    /// the defaults, each name kept only at its first occurrence. An empty
    /// list yields a single [`Passthrough`].
    pub fn chain(&self, route: &[String], defaults: &[String]) -> Result<Vec<Arc<dyn Middleware>>, Error> {
        let names = merge_names(route, defaults);
        if names.is_empty() {
            return Ok(vec![Arc::new(Passthrough)]);
        }
        names
            .into_iter()
            .map(|name| {
                self.entries
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::Middleware(format!("middleware `{name}` is not registered")))
            })
            .collect()
    }
}

/// Concatenates and de-duplicates, preserving first occurrence.
pub(crate) fn merge_names<'a>(route: &'a [String], defaults: &'a [String]) -> Vec<&'a str> {
    let mut merged: Vec<&str> = Vec::with_capacity(route.len() + defaults.len());
    for name in route.iter().chain(defaults) {
        if !merged.contains(&name.as_str()) {
            merged.push(name);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use std::sync::Mutex;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let route = names(&["auth", "csrf", "auth"]);
        let defaults = names(&["csrf", "trace"]);
        assert_eq!(merge_names(&route, &defaults), ["auth", "csrf", "trace"]);
    }

    #[test]
    fn empty_chain_is_a_single_passthrough() {
        let registry = MiddlewareRegistry::new();
        assert_eq!(registry.chain(&[], &[]).unwrap().len(), 1);
    }

    #[test]
    fn unknown_names_fail_at_assembly() {
        let registry = MiddlewareRegistry::new();
        let err = registry.chain(&names(&["nope"]), &[]).err().unwrap();
        assert!(matches!(err, Error::Middleware(_)));
    }

    #[tokio::test]
    async fn runs_in_order_then_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = MiddlewareRegistry::new();
        for label in ["first", "second"] {
            let log = Arc::clone(&log);
            registry.register(label, from_fn(move |next: Next, req| {
                log.lock().unwrap().push(label);
                next.run(req)
            }));
        }

        let endpoint = {
            let log = Arc::clone(&log);
            (move || {
                log.lock().unwrap().push("handler");
                async { "done" }
            })
            .into_boxed_handler()
        };
        let chain = registry.chain(&names(&["first", "second"]), &[]).unwrap();
        let resp = Next::new(chain, endpoint).run(Request::builder().build()).await.unwrap();

        assert_eq!(resp.body(), b"done");
        assert_eq!(*log.lock().unwrap(), ["first", "second", "handler"]);
    }
}
