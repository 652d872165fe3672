//! Unified error type.
//!
//! Every failure that can happen while a request is in flight is a variant
//! of [`Error`], and every variant knows its HTTP status. The dispatcher
//! catches all of them at its outer boundary and hands them to the
//! [`ErrorRenderer`](crate::render::ErrorRenderer). None of them reach hyper.

use http::StatusCode;

use crate::config::ConfigError;

/// Boxed source for errors raised by application code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by kiln's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request body or a parameter could not be decoded.
    #[error("{0}")]
    BadRequest(String),

    /// No registered route matched the request path.
    #[error("page not found")]
    PageNotFound,

    /// The method (or method override) is not acceptable for this path.
    #[error("method `{method}` is not allowed for `/{path}`")]
    MethodNotAllowed { method: String, path: String },

    /// Authentication is missing or was rejected.
    #[error("{0}")]
    Unauthorized(String),

    /// A route refers to state or a controller that was never provided.
    #[error("invalid route configuration: {0}")]
    InvalidRouteConfiguration(String),

    /// A middleware failed or could not be resolved.
    #[error("middleware error: {0}")]
    Middleware(String),

    /// The submitted CSRF token is missing or does not match.
    #[error("CSRF token mismatch")]
    CsrfToken,

    /// Anything raised by handler code that has no better classification.
    #[error(transparent)]
    Internal(BoxError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn method_not_allowed(method: impl Into<String>, path: &str) -> Self {
        Self::MethodNotAllowed {
            method: method.into(),
            path: path.trim_matches('/').to_owned(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized("You are not authorized to access this resource.".to_owned())
    }

    /// Wraps any error raised by application code.
    pub fn internal(e: impl Into<BoxError>) -> Self {
        Self::Internal(e.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)                => StatusCode::BAD_REQUEST,
            Self::PageNotFound                 => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. }      => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unauthorized(_)              => StatusCode::UNAUTHORIZED,
            Self::CsrfToken                    => StatusCode::FORBIDDEN,
            Self::InvalidRouteConfiguration(_)
            | Self::Middleware(_)
            | Self::Internal(_)
            | Self::Io(_)
            | Self::Config(_)                  => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short human title shown as the heading of an error page.
    pub fn title(&self) -> &'static str {
        match self {
            Self::BadRequest(_)                => "Bad Request",
            Self::PageNotFound                 => "Page Not Found",
            Self::MethodNotAllowed { .. }      => "Method Not Allowed",
            Self::Unauthorized(_)              => "Unauthorized",
            Self::CsrfToken                    => "CSRF Token Mismatch",
            Self::InvalidRouteConfiguration(_) => "Invalid Route Configuration",
            Self::Middleware(_)                => "Middleware Error",
            Self::Internal(_)
            | Self::Io(_)
            | Self::Config(_)                  => "An Error Occurred",
        }
    }

    /// Detail text shown under the title.
    pub fn message(&self) -> String {
        match self {
            Self::PageNotFound => {
                "Sorry, we couldn't find the page you're looking for.".to_owned()
            }
            Self::CsrfToken => "The CSRF token is invalid or has expired.".to_owned(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}
