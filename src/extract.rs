//! Handler argument resolution.
//!
//! A handler declares what it needs through its parameter types and each
//! type implements [`FromRequest`]. Resolution happens left to right, just
//! before the handler runs, after the whole middleware chain has let the
//! request through:
//!
//! | Parameter | Receives |
//! |---|---|
//! | [`Request`] | a fresh copy of the request |
//! | [`PathParams`] | captured `:name` segments, in pattern order |
//! | [`Form`] / [`Query`] | decoded body / query-string fields |
//! | [`BearerToken`] | the `Authorization: Bearer` token, or 401 |
//! | [`Provided<T>`] | a value registered with [`Router::provide`](crate::Router::provide) |
//! | `Arc<C>` | the controller bound to the route's group |
//! | [`Fresh<T>`] | `T::default()`, built per request |
//! | `Option<T>` | `T`, or `None` when `T` cannot be resolved |
//!
//! Nothing here touches storage: a handler that needs a record loads it
//! itself.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;
use crate::router::PathParams;

/// Resolves one handler argument from the request.
pub trait FromRequest: Sized {
    fn from_request(req: &Request) -> Result<Self, Error>;
}

impl FromRequest for Request {
    fn from_request(req: &Request) -> Result<Self, Error> {
        Ok(req.clone())
    }
}

impl FromRequest for PathParams {
    fn from_request(req: &Request) -> Result<Self, Error> {
        Ok(req.params().clone())
    }
}

impl<T: FromRequest> FromRequest for Option<T> {
    fn from_request(req: &Request) -> Result<Self, Error> {
        Ok(T::from_request(req).ok())
    }
}

/// Decoded body fields.
#[derive(Clone, Debug, Default)]
pub struct Form(pub HashMap<String, String>);

impl Form {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// A required field, or `400 Bad Request`.
    pub fn require(&self, key: &str) -> Result<&str, Error> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::BadRequest(format!("missing field `{key}`")))
    }
}

impl FromRequest for Form {
    fn from_request(req: &Request) -> Result<Self, Error> {
        Ok(Self(req.fields().clone()))
    }
}

/// Decoded query-string fields.
#[derive(Clone, Debug, Default)]
pub struct Query(pub HashMap<String, String>);

impl Query {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl FromRequest for Query {
    fn from_request(req: &Request) -> Result<Self, Error> {
        Ok(Self(req.query_fields().clone()))
    }
}

/// The bearer token. Resolution fails with `401` when it is absent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BearerToken(pub String);

impl FromRequest for BearerToken {
    fn from_request(req: &Request) -> Result<Self, Error> {
        req.token()
            .map(|t| Self(t.to_owned()))
            .ok_or_else(Error::unauthorized)
    }
}

/// A shared value registered on the router at startup (a pool, a client, a
/// repository).
pub struct Provided<T>(pub Arc<T>);

impl<T> Deref for Provided<T> {
    type Target = T;
    fn deref(&self) -> &T { &self.0 }
}

impl<T: Send + Sync + 'static> FromRequest for Provided<T> {
    fn from_request(req: &Request) -> Result<Self, Error> {
        req.state().get::<T>().map(Self).ok_or_else(|| {
            Error::InvalidRouteConfiguration(format!(
                "no value of type `{}` was provided to the router",
                type_name::<T>(),
            ))
        })
    }
}

/// A controller bound with [`Scope::controller`](crate::Scope::controller).
///
/// Lets controller methods written as `async fn index(self: Arc<Self>, …)`
/// be registered directly as handlers.
impl<C: Send + Sync + 'static> FromRequest for Arc<C> {
    fn from_request(req: &Request) -> Result<Self, Error> {
        req.controllers().get::<C>().ok_or_else(|| {
            Error::InvalidRouteConfiguration(format!(
                "controller `{}` is not bound to this route",
                type_name::<C>(),
            ))
        })
    }
}

/// A value built with `Default` for every request.
#[derive(Clone, Debug, Default)]
pub struct Fresh<T>(pub T);

impl<T> Deref for Fresh<T> {
    type Target = T;
    fn deref(&self) -> &T { &self.0 }
}

impl<T: Default> FromRequest for Fresh<T> {
    fn from_request(_req: &Request) -> Result<Self, Error> {
        Ok(Self(T::default()))
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Type-keyed store of shared values or controllers. Written while the
/// router is built, read-only once dispatching starts.
#[derive(Clone, Default)]
pub(crate) struct State {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl State {
    pub(crate) fn insert<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.values.insert(TypeId::of::<T>(), value);
    }

    pub(crate) fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let value = self.values.get(&TypeId::of::<T>())?;
        Arc::clone(value).downcast::<T>().ok()
    }

    /// Moves every entry of `other` in, replacing entries of the same type.
    pub(crate) fn extend(&mut self, other: State) {
        self.values.extend(other.values);
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State").field("values", &self.values.len()).finish()
    }
}
