use std::sync::Arc;

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

use super::{Middleware, Next};

/// Decides whether a bearer token grants access.
pub trait TokenVerifier: Send + Sync + 'static {
    fn verify(&self, token: &str) -> bool;
}

impl<F> TokenVerifier for F
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    fn verify(&self, token: &str) -> bool {
        self(token)
    }
}

/// Rejects requests whose `Authorization: Bearer …` token is missing or not
/// accepted by the verifier.
///
/// ```rust
/// use kiln::middleware::BearerAuth;
///
/// let auth = BearerAuth::new(|token: &str| token == "s3cret");
/// ```
pub struct BearerAuth<V> {
    verifier: Arc<V>,
}

impl<V: TokenVerifier> BearerAuth<V> {
    pub fn new(verifier: V) -> Self {
        Self { verifier: Arc::new(verifier) }
    }
}

impl<V: TokenVerifier> Middleware for BearerAuth<V> {
    fn handle(&self, next: Next, req: Request) -> BoxFuture<Result<Response, Error>> {
        let accepted = req.token().is_some_and(|t| self.verifier.verify(t));
        if !accepted {
            tracing::debug!(path = req.path(), "bearer token rejected");
            return Box::pin(async { Err(Error::unauthorized()) });
        }
        next.run(req)
    }
}
