//! Handler trait and type erasure.
//!
//! # How handlers of different shapes are stored
//!
//! The router keeps every route's handler in one `Vec`, so each handler is
//! erased behind [`ErasedHandler`]. A handler is any `async fn` (or closure
//! returning a future) whose arguments all implement
//! [`FromRequest`](crate::extract::FromRequest):
//!
//! ```text
//! async fn show(ctl: Arc<Users>, params: PathParams) -> Json<User>   ← user writes this
//!        ↓ router.get("/users/:id", show)
//! show.into_boxed_handler()                      ← Handler<(Arc<Users>, PathParams)> impl
//!        ↓
//! Arc::new(FnHandler { f: show, .. })           ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time             ← arguments resolved, one vtable call
//! ```
//!
//! Argument resolution runs synchronously before the handler's future is
//! created; the first failure short-circuits with its error.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::extract::FromRequest;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Result<Response, Error>>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function of up
/// to eight arguments with the shape:
///
/// ```text
/// async fn name(a: impl FromRequest, b: impl FromRequest, …) -> impl IntoResponse
/// ```
///
/// `Args` is the tuple of argument types; it only exists to keep the impls
/// for different arities apart.
pub trait Handler<Args>: private::Sealed<Args> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed<Args> {}
}

/// Holds a concrete handler `F` and bridges it to [`ErasedHandler`].
struct FnHandler<F, Args> {
    f: F,
    _args: PhantomData<fn() -> Args>,
}

macro_rules! impl_handler {
    ( $($arg:ident),* ) => {
        impl<F, Fut, R, $($arg,)*> private::Sealed<($($arg,)*)> for F
        where
            F: Fn($($arg,)*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoResponse + Send + 'static,
            $( $arg: FromRequest + Send + 'static, )*
        {
        }

        impl<F, Fut, R, $($arg,)*> Handler<($($arg,)*)> for F
        where
            F: Fn($($arg,)*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoResponse + Send + 'static,
            $( $arg: FromRequest + Send + 'static, )*
        {
            fn into_boxed_handler(self) -> BoxedHandler {
                Arc::new(FnHandler { f: self, _args: PhantomData })
            }
        }

        impl<F, Fut, R, $($arg,)*> ErasedHandler for FnHandler<F, ($($arg,)*)>
        where
            F: Fn($($arg,)*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoResponse + Send + 'static,
            $( $arg: FromRequest + Send + 'static, )*
        {
            #[allow(non_snake_case, unused_variables)]
            fn call(&self, req: Request) -> BoxFuture<Result<Response, Error>> {
                $(
                    let $arg = match $arg::from_request(&req) {
                        Ok(value) => value,
                        Err(e) => return Box::pin(async move { Err(e) }),
                    };
                )*
                let fut = (self.f)($($arg,)*);
                Box::pin(async move { fut.await.into_response() })
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);
impl_handler!(A1, A2, A3, A4, A5);
impl_handler!(A1, A2, A3, A4, A5, A6);
impl_handler!(A1, A2, A3, A4, A5, A6, A7);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::PathParams;

    fn boxed<Args, H: Handler<Args>>(h: H) -> BoxedHandler {
        h.into_boxed_handler()
    }

    #[tokio::test]
    async fn zero_argument_handler() {
        let h = boxed(|| async { "hi" });
        let resp = h.call(Request::builder().build()).await.unwrap();
        assert_eq!(resp.body(), b"hi");
    }

    #[tokio::test]
    async fn arguments_are_resolved_in_order() {
        async fn echo(req: Request, params: PathParams) -> String {
            format!("{} {:?}", req.path(), params.as_slice())
        }
        let resp = boxed(echo).call(Request::builder().uri("/x").build()).await.unwrap();
        assert_eq!(resp.body(), b"/x []");
    }

    #[tokio::test]
    async fn resolution_failure_skips_the_handler() {
        use crate::extract::BearerToken;
        use std::sync::atomic::{AtomicBool, Ordering};

        static CALLED: AtomicBool = AtomicBool::new(false);
        let h = boxed(|_t: BearerToken| async {
            CALLED.store(true, Ordering::SeqCst);
            "secret"
        });
        let err = h.call(Request::builder().build()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert!(!CALLED.load(Ordering::SeqCst));
    }
}
