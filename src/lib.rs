//! # kiln
//!
//! A small MVC-style web framework core: routing, middleware pipelines and
//! dependency-resolving handler invocation, behind a reverse proxy.
//!
//! ## The pipeline
//!
//! ```text
//! request → method override → first matching route → middleware chain → handler
//!                                                             ↓
//!                          rendered error page  ←  Error  ←  any step
//! ```
//!
//! - Routes are tried in registration order; the first whose pattern fits
//!   wins. `:name` placeholders capture exactly one path segment.
//! - A route's middleware list is merged with the configured defaults,
//!   de-duplicated by name, and run in order. Any middleware may answer on
//!   its own without calling the rest of the chain.
//! - Handlers are async functions whose arguments are resolved from the
//!   request: [`Request`], [`PathParams`], [`Form`](extract::Form), bound
//!   controllers (`Arc<C>`), shared state ([`Provided<T>`](extract::Provided)).
//! - Failures are an [`Error`] value with an HTTP status. They are rendered as
//!   JSON, plain text or HTML depending on `Accept`, with server-side detail
//!   hidden outside the `local` environment.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiln::{Config, Dispatcher, Json, PathParams, Router, Scope, Server};
//!
//! struct Users;
//!
//! impl Users {
//!     async fn show(self: Arc<Self>, params: PathParams) -> Json<serde_json::Value> {
//!         Json(serde_json::json!({ "id": &params[0] }))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kiln::Error> {
//!     kiln::logging::init();
//!     let config = Config::load("kiln.toml")?;
//!
//!     let router = Router::new()
//!         .get("/", || async { "<h1>home</h1>" }).name("index")
//!         .group(Scope::new().prefix("/users").controller(Arc::new(Users)), |r| {
//!             r.get("/:id", Users::show).name("users.show")
//!         });
//!
//!     let dispatcher = Dispatcher::new(router, &config);
//!     Server::bind(&config.server.bind)?.serve(dispatcher).await
//! }
//! ```

mod dispatcher;
mod error;
mod handler;
mod method;
mod render;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod extract;
pub mod logging;
pub mod middleware;

pub use config::{Config, Environment};
pub use dispatcher::Dispatcher;
pub use error::{BoxError, Error};
pub use extract::FromRequest;
pub use handler::{BoxFuture, Handler};
pub use method::{Method, UnknownMethod};
pub use render::{DefaultRenderer, ErrorRenderer, ErrorView};
pub use request::{Request, RequestBuilder, UploadedFile};
pub use response::{ContentType, Html, IntoResponse, Json, Response, ResponseBuilder};
pub use router::{MatchResult, NamedRoutes, PathParams, Pattern, Route, Router, Scope};
pub use server::Server;
