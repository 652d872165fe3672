use std::time::Instant;

use tracing::{Instrument, info, info_span, warn};

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

use super::{Middleware, Next};

/// One `request` span per request, closed with status and latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn handle(&self, next: Next, req: Request) -> BoxFuture<Result<Response, Error>> {
        let span = info_span!("request", method = %req.method(), path = %req.path());
        let start = Instant::now();

        Box::pin(
            async move {
                let result = next.run(req).await;
                let latency_ms = start.elapsed().as_millis() as u64;
                match &result {
                    Ok(resp) => info!(status = resp.status_code().as_u16(), latency_ms, "handled"),
                    Err(e) => warn!(status = e.status().as_u16(), latency_ms, error = %e, "failed"),
                }
                result
            }
            .instrument(span),
        )
    }
}
