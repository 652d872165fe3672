//! Request dispatch.
//!
//! For every request the dispatcher:
//!
//! 1. settles the effective method (a `POST` may ask to be treated as
//!    `PUT`, `PATCH`, `DELETE` or `OPTIONS` through `_method` or
//!    `X-HTTP-Method-Override`; anything else is a 405);
//! 2. finds the first matching route, or fails with a 404;
//! 3. assembles the middleware chain: route middleware, then the configured
//!    defaults, de-duplicated by name;
//! 4. runs the chain, whose last link resolves the handler's arguments and
//!    calls it;
//! 5. turns any error raised along the way into a rendered error response.
//!
//! Errors never escape [`Dispatcher::dispatch`]. Neither do panics: a
//! middleware or handler that panics ends its request with a 500.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::config::{Config, Environment};
use crate::error::Error;
use crate::extract::State;
use crate::method::Method;
use crate::middleware::{Cors, Csrf, Middleware, MiddlewareRegistry, Next, Trace};
use crate::render::{DefaultRenderer, ErrorRenderer, ErrorView};
use crate::request::Request;
use crate::response::Response;
use crate::router::{MatchResult, NamedRoutes, Router};

/// Owns the routing table and everything a request needs on its way
/// through. Build once, share behind an `Arc`.
pub struct Dispatcher {
    router: Router,
    named: Arc<NamedRoutes>,
    state: Arc<State>,
    registry: MiddlewareRegistry,
    defaults: Vec<String>,
    env: Environment,
    renderer: Box<dyn ErrorRenderer>,
}

impl Dispatcher {
    /// Takes ownership of `router`. The built-in `passthrough`, `cors`, `csrf`
    /// and `trace` middleware are registered; `middleware.default` from
    /// `config` is appended to every route's chain.
    pub fn new(mut router: Router, config: &Config) -> Self {
        let (named, state) = router.take_shared();

        let mut registry = MiddlewareRegistry::new();
        registry.register("cors", Cors::from_config(config));
        registry.register("csrf", Csrf::from_config(config));
        registry.register("trace", Trace);

        Self {
            router,
            named: Arc::new(named),
            state: Arc::new(state),
            registry,
            defaults: config.middleware.default.clone(),
            env: config.app.env,
            renderer: Box::new(DefaultRenderer),
        }
    }

    /// Registers (or replaces) a named middleware.
    pub fn middleware(mut self, name: &str, middleware: impl Middleware) -> Self {
        self.registry.register(name, middleware);
        self
    }

    pub fn renderer(mut self, renderer: impl ErrorRenderer) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn router(&self) -> &Router { &self.router }

    pub fn named_routes(&self) -> &NamedRoutes { &self.named }

    /// Dispatches `req`, rendering any failure as an error page.
    pub async fn dispatch(&self, req: Request) -> Response {
        let accept = req.header("accept").unwrap_or_default().to_owned();
        match self.try_dispatch(req).await {
            Ok(resp) => resp,
            Err(e) => self.render_error(&e, &accept),
        }
    }

    /// Dispatches `req` and hands back the raw error instead of rendering it.
    pub async fn try_dispatch(&self, mut req: Request) -> Result<Response, Error> {
        let method = effective_method(&req)?;
        let MatchResult { route, params } = self
            .router
            .lookup(method, req.path())?
            .ok_or(Error::PageNotFound)?;

        let chain = self.registry.chain(route.middlewares(), &self.defaults)?;
        debug!(
            %method,
            path = req.path(),
            route = route.uri(),
            handler = route.handler_name(),
            middleware = chain.len(),
            "dispatching"
        );

        req.set_method(method);
        req.set_params(params);
        req.set_routes(Arc::clone(&self.named));
        req.set_state(Arc::clone(&self.state));
        req.set_controllers(Arc::clone(route.controllers()));

        let next = Next::new(chain, Arc::clone(route.handler()));
        // The async block defers `run`, so panics raised while the chain is
        // being entered are caught too.
        match AssertUnwindSafe(async move { next.run(req).await }).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(Error::internal(format!(
                "request handler panicked: {}",
                panic_message(payload.as_ref()),
            ))),
        }
    }

    /// Renders `err` for a client that sent `accept`, applying the
    /// environment's disclosure policy.
    pub fn render_error(&self, err: &Error, accept: &str) -> Response {
        let status = err.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %err, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %err, "request rejected");
        }
        let view = ErrorView::new(err, self.env);
        self.renderer.render(&view, accept)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// The request method after `_method` / `X-HTTP-Method-Override` on a POST.
fn effective_method(req: &Request) -> Result<Method, Error> {
    let method = req.method();
    if method != Method::Post {
        return Ok(method);
    }
    let Some(raw) = req.method_override().map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(method);
    };

    let wanted = raw.to_ascii_uppercase();
    match wanted.parse::<Method>() {
        Ok(m) if m.overridable() => Ok(m),
        _ => Err(Error::method_not_allowed(wanted, req.path())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_with(override_: &str) -> Request {
        Request::builder()
            .method(Method::Post)
            .uri("/items/1")
            .form(&[("_method", override_)])
            .build()
    }

    #[test]
    fn override_applies_only_to_post() {
        assert_eq!(effective_method(&post_with("put")).unwrap(), Method::Put);
        assert_eq!(effective_method(&post_with("DELETE")).unwrap(), Method::Delete);
        assert_eq!(effective_method(&post_with("")).unwrap(), Method::Post);

        let get = Request::builder().uri("/?_method=PUT").build();
        assert_eq!(effective_method(&get).unwrap(), Method::Get);
    }

    #[test]
    fn unsupported_override_is_405() {
        for bad in ["TRACE", "GET", "BREW"] {
            assert!(matches!(
                effective_method(&post_with(bad)),
                Err(Error::MethodNotAllowed { .. }),
            ));
        }
    }

    #[test]
    fn panic_payloads_become_messages() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("index out of range"));
        assert_eq!(panic_message(owned.as_ref()), "index out of range");
        let fixed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(fixed.as_ref()), "boom");
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[test]
    fn header_override_is_honoured() {
        let req = Request::builder()
            .method(Method::Post)
            .header("x-http-method-override", "PATCH")
            .build();
        assert_eq!(effective_method(&req).unwrap(), Method::Patch);
    }
}
