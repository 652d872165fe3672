//! Double-submit CSRF protection.
//!
//! A state-changing request must echo the value of the `csrf_token` cookie in
//! its `_token` form field (or the `X-CSRF-Token` header). A client without
//! the cookie is handed a fresh one on its next response.

use std::fmt::Write as _;

use rand::Rng;

use crate::config::Config;
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

use super::{Middleware, Next};

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_FIELD: &str = "_token";
const CSRF_HEADER: &str = "x-csrf-token";
const COOKIE_MAX_AGE: u32 = 3600;

/// The token in effect for this request, available to handlers through
/// [`Request::extensions`] (e.g. to render [`csrf_field`]).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CsrfToken(pub String);

impl CsrfToken {
    /// 32 random bytes, hex encoded.
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        let mut hex = String::with_capacity(64);
        for b in bytes {
            let _ = write!(hex, "{b:02x}");
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str { &self.0 }

    /// The current token: the one issued during this request, else the
    /// cookie the client sent.
    pub fn current(req: &Request) -> Option<String> {
        req.extensions()
            .get::<CsrfToken>()
            .map(|t| t.0.clone())
            .or_else(|| req.cookie(CSRF_COOKIE).map(str::to_owned))
    }
}

/// Hidden form input carrying `token`.
pub fn csrf_field(token: &str) -> String {
    format!(r#"<input type="hidden" name="{CSRF_FIELD}" value="{token}">"#)
}

#[derive(Clone, Debug, Default)]
pub struct Csrf {
    exclude_prefixes: Vec<String>,
    except: Vec<String>,
}

impl Csrf {
    pub fn new() -> Self { Self::default() }

    /// Skips every path under `middleware.exclude_prefixes`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            exclude_prefixes: config.middleware.exclude_prefixes.clone(),
            except: Vec::new(),
        }
    }

    /// Exact paths that skip verification.
    pub fn except<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except.extend(paths.into_iter().map(Into::into));
        self
    }

    fn skips(&self, req: &Request) -> bool {
        if matches!(req.method(), Method::Get | Method::Head) {
            return true;
        }
        let path = req.path();
        self.exclude_prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || self.except.iter().any(|p| p.trim_matches('/') == path.trim_matches('/'))
    }

    fn verify(&self, req: &Request) -> Result<(), Error> {
        let expected = req.cookie(CSRF_COOKIE).ok_or(Error::CsrfToken)?;
        let submitted = req
            .field(CSRF_FIELD)
            .or_else(|| req.header(CSRF_HEADER))
            .ok_or(Error::CsrfToken)?;

        if !expected.is_empty() && constant_time_eq(expected.as_bytes(), submitted.as_bytes()) {
            Ok(())
        } else {
            Err(Error::CsrfToken)
        }
    }
}

impl Middleware for Csrf {
    fn handle(&self, next: Next, mut req: Request) -> BoxFuture<Result<Response, Error>> {
        if !self.skips(&req) {
            if let Err(e) = self.verify(&req) {
                tracing::debug!(path = req.path(), "csrf token rejected");
                return Box::pin(async move { Err(e) });
            }
        }

        let issued = req.cookie(CSRF_COOKIE).is_none().then(CsrfToken::generate);
        if let Some(token) = &issued {
            req.extensions_mut().insert(token.clone());
        }

        Box::pin(async move {
            let resp = next.run(req).await?;
            Ok(match issued {
                Some(token) => resp.with_header(
                    "set-cookie",
                    &format!(
                        "{CSRF_COOKIE}={}; Path=/; Max-Age={COOKIE_MAX_AGE}; SameSite=Lax",
                        token.as_str()
                    ),
                ),
                None => resp,
            })
        })
    }
}

/// Timing-safe byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;

    async fn run(csrf: &Csrf, req: Request) -> Result<Response, Error> {
        let endpoint = (|| async { "ok" }).into_boxed_handler();
        csrf.handle(Next::new(Vec::new(), endpoint), req).await
    }

    #[test]
    fn generated_tokens_are_64_hex_chars() {
        let t = CsrfToken::generate();
        assert_eq!(t.as_str().len(), 64);
        assert!(t.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(t, CsrfToken::generate());
    }

    #[tokio::test]
    async fn get_passes_and_receives_a_cookie() {
        let resp = run(&Csrf::new(), Request::builder().uri("/form").build()).await.unwrap();
        let cookie = resp.header("set-cookie").unwrap();
        assert!(cookie.starts_with("csrf_token="));
        assert!(cookie.contains("SameSite=Lax"));
    }

    #[tokio::test]
    async fn post_without_token_is_rejected() {
        let req = Request::builder().method(Method::Post).uri("/generate").build();
        let err = run(&Csrf::new(), req).await.unwrap_err();
        assert!(matches!(err, Error::CsrfToken));
    }

    #[tokio::test]
    async fn post_with_matching_token_passes() {
        let req = Request::builder()
            .method(Method::Post)
            .uri("/generate")
            .header("cookie", "csrf_token=abc123")
            .form(&[("_token", "abc123")])
            .build();
        let resp = run(&Csrf::new(), req).await.unwrap();
        assert_eq!(resp.body(), b"ok");
        assert!(resp.header("set-cookie").is_none());
    }

    #[tokio::test]
    async fn only_get_and_head_skip_verification() {
        for method in [Method::Get, Method::Head] {
            let req = Request::builder().method(method).uri("/generate").build();
            assert!(run(&Csrf::new(), req).await.is_ok(), "{method}");
        }
        for method in [Method::Options, Method::Trace, Method::Delete] {
            let req = Request::builder().method(method).uri("/generate").build();
            assert!(matches!(run(&Csrf::new(), req).await, Err(Error::CsrfToken)), "{method}");
        }
    }

    #[tokio::test]
    async fn mismatched_token_is_rejected() {
        let req = Request::builder()
            .method(Method::Post)
            .header("cookie", "csrf_token=abc123")
            .header("x-csrf-token", "abc124")
            .build();
        assert!(run(&Csrf::new(), req).await.is_err());
    }

    #[tokio::test]
    async fn excluded_paths_skip_verification() {
        let config = Config::from_toml("[middleware]\nexclude_prefixes = [\"/api\"]").unwrap();
        let csrf = Csrf::from_config(&config).except(["/webhook"]);

        let api = Request::builder().method(Method::Post).uri("/api/generate").build();
        assert!(run(&csrf, api).await.is_ok());

        let hook = Request::builder().method(Method::Post).uri("/webhook").build();
        assert!(run(&csrf, hook).await.is_ok());
    }

    #[test]
    fn hidden_field_markup() {
        assert_eq!(csrf_field("t0k"), r#"<input type="hidden" name="_token" value="t0k">"#);
    }
}
