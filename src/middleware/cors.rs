//! Cross-origin resource sharing.
//!
//! Driven by the `[cors]` configuration section. Requests outside the
//! configured `paths` are left alone. A preflight (`OPTIONS` carrying
//! `Access-Control-Request-Method`) is answered here and never reaches the
//! handler; any other request from an allowed origin gets the CORS headers
//! added to its response.

use http::StatusCode;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::{Config, CorsConfig};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

use super::{Middleware, Next};

#[derive(Clone, Debug)]
pub struct Cors {
    paths: Vec<String>,
    origins: Vec<String>,
    origin_patterns: Vec<Regex>,
    allow_methods: String,
    allow_headers: String,
    expose_headers: String,
    max_age: u32,
    credentials: bool,
}

impl Cors {
    /// Origin patterns that are not valid regexes are logged and skipped.
    pub fn new(config: &CorsConfig) -> Self {
        let origin_patterns = config
            .allowed_origins_patterns
            .iter()
            .filter_map(|p| match Regex::new(&format!("^(?:{p})$")) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "invalid CORS origin pattern ignored");
                    None
                }
            })
            .collect();

        Self {
            paths: config.paths.clone(),
            origins: config.allowed_origins.clone(),
            origin_patterns,
            allow_methods: config.allowed_methods.join(", "),
            allow_headers: config.allowed_headers.join(", "),
            expose_headers: config.exposed_headers.join(", "),
            max_age: config.max_age,
            credentials: config.supports_credentials,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.cors)
    }

    /// `api/*` covers everything under `/api/`, `*` covers every path.
    fn applies_to(&self, path: &str) -> bool {
        let path = path.trim_matches('/');
        self.paths.iter().any(|p| {
            let p = p.trim_start_matches('/');
            match p.strip_suffix('*') {
                Some(prefix) => path.starts_with(prefix),
                None => path == p.trim_end_matches('/'),
            }
        })
    }

    fn allows(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == "*" || o == origin)
            || self.origin_patterns.iter().any(|re| re.is_match(origin))
    }

    fn headers(&self, origin: &str, preflight: bool) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("access-control-allow-origin", origin.to_owned()),
            ("vary", "Origin".to_owned()),
            ("access-control-allow-methods", self.allow_methods.clone()),
            ("access-control-allow-headers", self.allow_headers.clone()),
            ("access-control-max-age", self.max_age.to_string()),
        ];
        if !preflight && !self.expose_headers.is_empty() {
            headers.push(("access-control-expose-headers", self.expose_headers.clone()));
        }
        if self.credentials {
            headers.push(("access-control-allow-credentials", "true".to_owned()));
        }
        headers
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new(&CorsConfig::default())
    }
}

fn with_headers(resp: Response, headers: &[(&'static str, String)]) -> Response {
    headers.iter().fold(resp, |resp, (name, value)| resp.with_header(name, value))
}

impl Middleware for Cors {
    fn handle(&self, next: Next, req: Request) -> BoxFuture<Result<Response, Error>> {
        if !self.applies_to(req.path()) {
            return next.run(req);
        }

        let origin = req.header("origin").filter(|o| self.allows(o)).map(str::to_owned);
        let preflight =
            req.method() == Method::Options && req.header("access-control-request-method").is_some();

        if preflight {
            let resp = match &origin {
                Some(origin) => with_headers(
                    Response::status(StatusCode::NO_CONTENT),
                    &self.headers(origin, true),
                ),
                None => {
                    debug!(path = req.path(), origin = ?req.header("origin"), "cors preflight refused");
                    Response::status(StatusCode::FORBIDDEN)
                }
            };
            return Box::pin(async move { Ok(resp) });
        }

        let Some(origin) = origin else { return next.run(req) };
        let headers = self.headers(&origin, false);
        Box::pin(async move {
            let resp = next.run(req).await?;
            Ok(with_headers(resp, &headers))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::handler::Handler;

    fn cors(toml: &str) -> Cors {
        Cors::from_config(&Config::from_toml(toml).unwrap())
    }

    async fn run(cors: &Cors, req: Request) -> (Response, usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let endpoint = (move || {
            seen.fetch_add(1, Ordering::SeqCst);
            async { "ok" }
        })
        .into_boxed_handler();
        let resp = cors.handle(Next::new(Vec::new(), endpoint), req).await.unwrap();
        (resp, calls.load(Ordering::SeqCst))
    }

    fn preflight(path: &str, origin: &str) -> Request {
        Request::builder()
            .method(Method::Options)
            .uri(path)
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .build()
    }

    #[tokio::test]
    async fn preflight_is_answered_without_the_handler() {
        let cors = cors("[cors]\nmax_age = 600\nsupports_credentials = true");
        let (resp, calls) = run(&cors, preflight("/api/generate", "https://app.example")).await;

        assert_eq!(calls, 0);
        assert_eq!(resp.status_code(), StatusCode::NO_CONTENT);
        assert_eq!(resp.header("access-control-allow-origin"), Some("https://app.example"));
        assert_eq!(resp.header("access-control-allow-methods"), Some("*"));
        assert_eq!(resp.header("access-control-max-age"), Some("600"));
        assert_eq!(resp.header("access-control-allow-credentials"), Some("true"));
    }

    #[tokio::test]
    async fn disallowed_origin_gets_no_headers() {
        let cors = cors(
            "[cors]\nallowed_origins = [\"https://app.example\"]\n\
             allowed_origins_patterns = ['https://.*\\.trusted\\.dev']",
        );

        let (resp, calls) = run(&cors, preflight("/api/generate", "https://evil.example")).await;
        assert_eq!(calls, 0);
        assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);

        let req = Request::builder().uri("/api/user").header("origin", "https://evil.example").build();
        let (resp, calls) = run(&cors, req).await;
        assert_eq!(calls, 1);
        assert!(resp.header("access-control-allow-origin").is_none());

        let req = Request::builder().uri("/api/user").header("origin", "https://ci.trusted.dev").build();
        let (resp, _) = run(&cors, req).await;
        assert_eq!(resp.header("access-control-allow-origin"), Some("https://ci.trusted.dev"));
    }

    #[tokio::test]
    async fn simple_requests_get_exposed_headers() {
        let cors = cors("[cors]\nexposed_headers = [\"x-short-code\"]");
        let req = Request::builder().uri("/api/user").header("origin", "https://app.example").build();
        let (resp, calls) = run(&cors, req).await;

        assert_eq!(calls, 1);
        assert_eq!(resp.body(), b"ok");
        assert_eq!(resp.header("access-control-expose-headers"), Some("x-short-code"));
        assert!(resp.header("access-control-allow-credentials").is_none());
    }

    #[tokio::test]
    async fn paths_outside_the_configured_set_are_untouched() {
        let (resp, calls) = run(&Cors::default(), preflight("/generate", "https://app.example")).await;
        assert_eq!(calls, 1);
        assert!(resp.header("access-control-allow-origin").is_none());
    }

    #[test]
    fn path_globs() {
        let cors = cors("[cors]\npaths = [\"api/*\", \"/webhook\"]");
        assert!(cors.applies_to("/api/user"));
        assert!(cors.applies_to("/webhook/"));
        assert!(!cors.applies_to("/apiary"));
        assert!(!cors.applies_to("/"));
        assert!(self::cors("[cors]\npaths = [\"*\"]").applies_to("/anything"));
    }
}
