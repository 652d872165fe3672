//! Route registry and matching.
//!
//! One ordered list of routes per HTTP method. Lookup walks the list in
//! registration order and the first route whose pattern fits the path wins;
//! there is no priority beyond insertion order. Build the router once at
//! startup and hand it to [`Dispatcher::new`](crate::Dispatcher::new).
//!
//! ```rust
//! use std::sync::Arc;
//! use kiln::{PathParams, Request, Router, Scope};
//!
//! struct Shorts;
//!
//! impl Shorts {
//!     async fn index(self: Arc<Self>) -> &'static str { "home" }
//!     async fn redirect(self: Arc<Self>, params: PathParams) -> String {
//!         format!("going to {}", &params[0])
//!     }
//! }
//!
//! let router = Router::new()
//!     .group(Scope::new().controller(Arc::new(Shorts)), |r| {
//!         r.get("/", Shorts::index).name("index")
//!          .get("/:short", Shorts::redirect).name("redirect")
//!     })
//!     .group(Scope::new().prefix("/api").middleware(["api_auth"]), |r| {
//!         r.get("/user", |req: Request| async move { req.path().to_owned() })
//!     });
//!
//! assert_eq!(router.named_routes().get("redirect"), Some("/:short"));
//! ```

mod named;
mod pattern;

use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Error;
use crate::extract::State;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;

pub use named::NamedRoutes;
pub use pattern::Pattern;

// ── Route ─────────────────────────────────────────────────────────────────────

/// One registered route.
pub struct Route {
    method: Method,
    uri: String,
    pattern: Pattern,
    handler: BoxedHandler,
    handler_name: &'static str,
    middlewares: Vec<String>,
    controllers: Arc<State>,
    name: Option<String>,
    allowed_methods: Vec<Method>,
}

impl Route {
    pub fn method(&self) -> Method { self.method }
    /// Full URI as registered, prefix included.
    pub fn uri(&self) -> &str { &self.uri }
    pub fn pattern(&self) -> &Pattern { &self.pattern }
    pub fn name(&self) -> Option<&str> { self.name.as_deref() }
    pub fn middlewares(&self) -> &[String] { &self.middlewares }
    /// Rust type name of the handler, for route listings and logs.
    pub fn handler_name(&self) -> &'static str { self.handler_name }
    pub(crate) fn handler(&self) -> &BoxedHandler { &self.handler }
    /// Controllers bound by the groups enclosing this route.
    pub(crate) fn controllers(&self) -> &Arc<State> { &self.controllers }
}

// ── PathParams ────────────────────────────────────────────────────────────────

/// Values captured by a route's `:name` placeholders, in the order the
/// placeholders appear in the pattern.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PathParams {
    names: Vec<String>,
    values: Vec<String>,
}

impl PathParams {
    pub(crate) fn new(names: Vec<String>, values: Vec<String>) -> Self {
        Self { names, values }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// Value of the placeholder called `name`.
    pub fn named(&self, name: &str) -> Option<&str> {
        let index = self.names.iter().position(|n| n == name)?;
        self.get(index)
    }

    /// Parses the value at `index`, `None` when absent or unparsable.
    pub fn parse<T: std::str::FromStr>(&self, index: usize) -> Option<T> {
        self.get(index)?.parse().ok()
    }

    pub fn as_slice(&self) -> &[String] { &self.values }
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}

impl Index<usize> for PathParams {
    type Output = str;
    fn index(&self, index: usize) -> &str { &self.values[index] }
}

// ── MatchResult ───────────────────────────────────────────────────────────────

/// The route that matched a request and what its pattern captured.
pub struct MatchResult<'r> {
    pub route: &'r Route,
    pub params: PathParams,
}

impl MatchResult<'_> {
    pub fn middlewares(&self) -> &[String] { self.route.middlewares() }
}

// ── Scope ─────────────────────────────────────────────────────────────────────

/// Settings applied to every route registered inside [`Router::group`].
///
/// Scopes nest: prefixes concatenate outer-first, middleware lists are
/// appended outer-first and controllers bound by an outer scope stay visible
/// inside unless an inner scope binds the same type.
#[derive(Default)]
pub struct Scope {
    prefix: String,
    middlewares: Vec<String>,
    controllers: State,
}

impl Scope {
    pub fn new() -> Self { Self::default() }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_owned();
        self
    }

    /// Middleware names, resolved against the dispatcher's registry.
    pub fn middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middlewares.extend(names.into_iter().map(Into::into));
        self
    }

    /// Binds a controller instance. Handlers in the group that take
    /// `Arc<C>` (including methods declared `self: Arc<Self>`) receive it;
    /// routes outside the group do not. One instance per type per scope.
    pub fn controller<C: Send + Sync + 'static>(mut self, controller: Arc<C>) -> Self {
        self.controllers.insert(controller);
        self
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router.
///
/// Each registration returns `self` so declarations chain naturally;
/// [`Router::name`] and [`Router::allow`] apply to the route registered
/// just before them.
pub struct Router {
    routes: HashMap<Method, Vec<Route>>,
    named: NamedRoutes,
    state: State,
    base: Scope,
    scopes: Vec<Scope>,
    /// Controllers visible at each nesting level, outer bindings merged in.
    bound: Vec<Arc<State>>,
    last: Option<(Method, usize)>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            named: NamedRoutes::default(),
            state: State::default(),
            base: Scope::default(),
            scopes: Vec::new(),
            bound: Vec::new(),
            last: None,
        }
    }

    /// Register a handler for a method + path pair. Path parameters use
    /// `:name` syntax and capture one segment each.
    pub fn on<Args>(self, method: Method, path: &str, handler: impl Handler<Args>) -> Self {
        self.add(method, path, handler)
    }

    pub fn get<Args>(self, path: &str, handler: impl Handler<Args>) -> Self {
        self.add(Method::Get, path, handler)
    }

    pub fn post<Args>(self, path: &str, handler: impl Handler<Args>) -> Self {
        self.add(Method::Post, path, handler)
    }

    pub fn put<Args>(self, path: &str, handler: impl Handler<Args>) -> Self {
        self.add(Method::Put, path, handler)
    }

    pub fn patch<Args>(self, path: &str, handler: impl Handler<Args>) -> Self {
        self.add(Method::Patch, path, handler)
    }

    pub fn delete<Args>(self, path: &str, handler: impl Handler<Args>) -> Self {
        self.add(Method::Delete, path, handler)
    }

    pub fn options<Args>(self, path: &str, handler: impl Handler<Args>) -> Self {
        self.add(Method::Options, path, handler)
    }

    /// Names the route registered last, for reverse routing with
    /// [`Request::route`](crate::Request::route).
    pub fn name(mut self, name: &str) -> Self {
        let Some(route) = self.last_route_mut() else {
            warn!(name, "route name given before any route was registered; ignored");
            return self;
        };
        route.name = Some(name.to_owned());
        let uri = route.uri.clone();
        self.named.insert(name, &uri);
        self
    }

    /// Restricts the route registered last to `methods`. A request reaching
    /// it with any other effective method fails with `405`.
    pub fn allow(mut self, methods: &[Method]) -> Self {
        if let Some(route) = self.last_route_mut() {
            route.allowed_methods = methods.to_vec();
        }
        self
    }

    /// Prefix for every route registered after this call, outside groups.
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.base.prefix = prefix.to_owned();
        self
    }

    /// Middleware for every route registered after this call, outside
    /// groups. Replaces the previous list.
    pub fn middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base.middlewares = names.into_iter().map(Into::into).collect();
        self
    }

    /// Makes `value` available to handlers through
    /// [`Provided<T>`](crate::extract::Provided).
    pub fn provide<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(Arc::new(value));
        self
    }

    /// Registers the routes declared in `routes` under `scope`.
    pub fn group(mut self, mut scope: Scope, routes: impl FnOnce(Self) -> Self) -> Self {
        let mut visible = self.bound.last().map(|b| State::clone(b)).unwrap_or_default();
        visible.extend(std::mem::take(&mut scope.controllers));
        self.bound.push(Arc::new(visible));
        self.scopes.push(scope);

        let mut router = routes(self);
        router.scopes.pop();
        router.bound.pop();
        router
    }

    fn add<Args>(mut self, method: Method, path: &str, handler: impl Handler<Args>) -> Self {
        let mut uri = self.base.prefix.clone();
        let mut middlewares = self.base.middlewares.clone();
        for scope in &self.scopes {
            uri.push_str(&scope.prefix);
            middlewares.extend(scope.middlewares.iter().cloned());
        }
        uri.push_str(path);

        let handler_name = std::any::type_name_of_val(&handler);
        let route = Route {
            method,
            pattern: Pattern::compile(&uri),
            handler: handler.into_boxed_handler(),
            handler_name,
            middlewares,
            controllers: self.bound.last().cloned().unwrap_or_default(),
            name: None,
            allowed_methods: Vec::new(),
            uri,
        };
        debug!(%method, uri = %route.uri, handler = route.handler_name, "route registered");

        let bucket = self.routes.entry(method).or_default();
        // Same key: replace in place, keeping the original position.
        let index = match bucket.iter().position(|r| r.pattern.source() == route.pattern.source()) {
            Some(i) => {
                bucket[i] = route;
                i
            }
            None => {
                bucket.push(route);
                bucket.len() - 1
            }
        };
        self.last = Some((method, index));
        self
    }

    fn last_route_mut(&mut self) -> Option<&mut Route> {
        let (method, index) = self.last?;
        self.routes.get_mut(&method)?.get_mut(index)
    }

    /// First route registered for `method` whose pattern fits `path`.
    ///
    /// `Ok(None)` means nothing matched. A match whose route carries an
    /// `allowed_methods` restriction excluding `method` is an error.
    pub fn lookup(&self, method: Method, path: &str) -> Result<Option<MatchResult<'_>>, Error> {
        let path = path.trim_matches('/');
        let Some(bucket) = self.routes.get(&method) else { return Ok(None) };

        for route in bucket {
            let Some(values) = route.pattern.captures(path) else { continue };
            if !route.allowed_methods.is_empty() && !route.allowed_methods.contains(&method) {
                return Err(Error::method_not_allowed(method.as_str(), path));
            }
            let params = PathParams::new(route.pattern.names().to_vec(), values);
            return Ok(Some(MatchResult { route, params }));
        }
        Ok(None)
    }

    pub fn named_routes(&self) -> &NamedRoutes { &self.named }

    /// Every route for `method`, in match order.
    pub fn routes(&self, method: Method) -> &[Route] {
        self.routes.get(&method).map(Vec::as_slice).unwrap_or_default()
    }

    /// Moves out the tables handed to every request. The routes stay.
    pub(crate) fn take_shared(&mut self) -> (NamedRoutes, State) {
        (std::mem::take(&mut self.named), std::mem::take(&mut self.state))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    async fn noop() -> &'static str { "" }

    fn matched(router: &Router, method: Method, path: &str) -> Option<(String, Vec<String>)> {
        router
            .lookup(method, path)
            .unwrap()
            .map(|m| (m.route.uri().to_owned(), m.params.as_slice().to_vec()))
    }

    #[test]
    fn first_registered_match_wins() {
        let router = Router::new()
            .get("/", noop).name("home")
            .get("/:short", noop).name("redirect")
            .get("/about", noop);

        assert_eq!(matched(&router, Method::Get, "/abc123"), Some(("/:short".into(), vec!["abc123".into()])));
        assert_eq!(matched(&router, Method::Get, "/"), Some(("/".into(), vec![])));
        // `/about` is shadowed by `/:short`, registered earlier.
        assert_eq!(matched(&router, Method::Get, "/about").unwrap().0, "/:short");
    }

    #[test]
    fn extra_segments_do_not_match() {
        let router = Router::new().get("/users/:id", noop);
        assert_eq!(matched(&router, Method::Get, "/users/42"), Some(("/users/:id".into(), vec!["42".into()])));
        assert_eq!(matched(&router, Method::Get, "/users/42/edit"), None);
        assert_eq!(matched(&router, Method::Post, "/users/42"), None);
    }

    #[tokio::test]
    async fn reregistering_a_key_replaces_in_place() {
        let router = Router::new()
            .get("/a", || async { "first" })
            .get("/:x", noop)
            .get("a/", || async { "second" });

        let routes = router.routes(Method::Get);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].uri(), "a/");

        let m = router.lookup(Method::Get, "/a").unwrap().unwrap();
        assert_eq!(m.route.uri(), "a/");
        let resp = m.route.handler().call(Request::builder().uri("/a").build()).await.unwrap();
        assert_eq!(resp.body(), b"second");
    }

    #[test]
    fn name_binds_the_route_added_last() {
        let router = Router::new()
            .post("/generate", noop)
            .get("/", noop)
            .name("index");
        assert_eq!(router.named_routes().get("index"), Some("/"));
        assert_eq!(router.routes(Method::Get)[0].name(), Some("index"));
        assert_eq!(router.routes(Method::Post)[0].name(), None);
    }

    #[test]
    fn name_before_any_route_is_ignored() {
        let router = Router::new().name("ghost");
        assert!(router.named_routes().is_empty());
    }

    #[test]
    fn groups_nest_prefix_and_middleware() {
        let router = Router::new()
            .middleware(["trace"])
            .group(Scope::new().prefix("/api").middleware(["api_auth"]), |r| {
                r.group(Scope::new().prefix("/v1").middleware(["trace", "json"]), |r| {
                    r.get("/user", noop).name("api.user")
                })
                .get("/ping", noop)
            })
            .get("/outside", noop);

        let get = router.routes(Method::Get);
        assert_eq!(get[0].uri(), "/api/v1/user");
        assert_eq!(get[0].middlewares(), ["trace", "api_auth", "trace", "json"]);
        assert_eq!(get[1].uri(), "/api/ping");
        assert_eq!(get[1].middlewares(), ["trace", "api_auth"]);
        assert_eq!(get[2].uri(), "/outside");
        assert_eq!(get[2].middlewares(), ["trace"]);
        assert_eq!(router.named_routes().get("api.user"), Some("/api/v1/user"));
    }

    #[test]
    fn base_prefix_applies_until_changed() {
        let router = Router::new()
            .prefix("/admin")
            .get("/users", noop)
            .prefix("")
            .get("/users", noop);
        let uris: Vec<&str> = router.routes(Method::Get).iter().map(Route::uri).collect();
        assert_eq!(uris, ["/admin/users", "/users"]);
    }

    #[test]
    fn allowed_methods_restriction_raises_405() {
        let router = Router::new().put("/items/:id", noop).allow(&[Method::Patch]);
        assert!(matches!(
            router.lookup(Method::Put, "/items/1"),
            Err(Error::MethodNotAllowed { .. }),
        ));
    }

    #[test]
    fn controllers_bind_to_their_group_only() {
        struct Shorts(&'static str);
        struct Stats;

        let router = Router::new()
            .group(Scope::new().controller(Arc::new(Stats)), |r| {
                r.group(Scope::new().controller(Arc::new(Shorts("inner"))), |r| r.get("/a", noop))
                    .get("/b", noop)
            })
            .group(Scope::new().controller(Arc::new(Shorts("other"))), |r| r.get("/c", noop))
            .get("/d", noop);

        let get = router.routes(Method::Get);
        let shorts = |i: usize| get[i].controllers().get::<Shorts>().map(|s| s.0);

        assert_eq!(shorts(0), Some("inner"));
        assert!(get[0].controllers().get::<Stats>().is_some());
        assert_eq!(shorts(1), None);
        assert!(get[1].controllers().get::<Stats>().is_some());
        assert_eq!(shorts(2), Some("other"));
        assert!(get[2].controllers().get::<Stats>().is_none());
        assert_eq!(shorts(3), None);
    }

    #[test]
    fn path_params_by_name_and_index() {
        let router = Router::new().get("/teams/:team/members/:member", |_: Request| async { "" });
        let m = router.lookup(Method::Get, "teams/core/members/7").unwrap().unwrap();
        assert_eq!(m.params.named("team"), Some("core"));
        assert_eq!(m.params.parse::<u32>(1), Some(7));
        assert_eq!(&m.params[0], "core");
    }
}
