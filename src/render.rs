//! Error pages.
//!
//! The dispatcher turns every [`Error`] into an [`ErrorView`] (applying the
//! environment's disclosure policy) and asks an [`ErrorRenderer`] to draw it.
//! [`DefaultRenderer`] negotiates on the `Accept` header:
//!
//! | `Accept` | Body |
//! |---|---|
//! | contains `application/json` | `{"ERROR_CODE":…,"ERROR_TITLE":…,"ERROR_MESSAGE":…}` |
//! | exactly `*/*` | `"<code> <title> - <message>"` as plain text |
//! | anything else | a small HTML page |

use http::StatusCode;
use serde::Serialize;

use crate::config::Environment;
use crate::error::Error;
use crate::response::Response;

const GENERIC_TITLE: &str = "Internal Server Error";
const GENERIC_MESSAGE: &str = "An internal server error occurred.";

/// What the client is allowed to see about an error.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ErrorView {
    #[serde(rename = "ERROR_CODE")]
    pub code: u16,
    #[serde(rename = "ERROR_TITLE")]
    pub title: String,
    #[serde(rename = "ERROR_MESSAGE")]
    pub message: String,
}

impl ErrorView {
    /// Applies the disclosure policy.
    ///
    /// `local` shows everything. Elsewhere 404 and 401 are shown verbatim,
    /// other client errors keep their status and title but not their
    /// detail, and every server error collapses to a generic 500.
    pub fn new(err: &Error, env: Environment) -> Self {
        let status = err.status();
        let verbatim = env == Environment::Local
            || matches!(status, StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED);

        if verbatim {
            return Self {
                code: status.as_u16(),
                title: err.title().to_owned(),
                message: err.message(),
            };
        }
        if status.is_client_error() {
            return Self {
                code: status.as_u16(),
                title: err.title().to_owned(),
                message: status.canonical_reason().unwrap_or(GENERIC_MESSAGE).to_owned(),
            };
        }
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            title: GENERIC_TITLE.to_owned(),
            message: GENERIC_MESSAGE.to_owned(),
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Draws an [`ErrorView`] as a response. Implement this to brand error pages.
pub trait ErrorRenderer: Send + Sync + 'static {
    fn render(&self, view: &ErrorView, accept: &str) -> Response;
}

/// JSON / plain text / HTML, chosen from the `Accept` header.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRenderer;

impl ErrorRenderer for DefaultRenderer {
    fn render(&self, view: &ErrorView, accept: &str) -> Response {
        let accept = accept.to_ascii_lowercase();
        let builder = Response::builder().status(view.status());

        if accept.trim() == "*/*" {
            return builder.text(format!("{} {} - {}", view.code, view.title, view.message));
        }
        if accept.contains("application/json") {
            // ErrorView only holds strings and a number; serialisation cannot fail.
            let body = serde_json::to_vec(view).unwrap_or_default();
            return builder.json(body);
        }
        builder.html(error_page(view))
    }
}

fn error_page(view: &ErrorView) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head><meta charset=\"utf-8\"><title>{code} | {title}</title></head>\n\
         <body>\n\
         <main>\n\
         <p>{code}</p>\n\
         <h1>{title}</h1>\n\
         <p>{message}</p>\n\
         <a href=\"/\">Go back home</a>\n\
         </main>\n\
         </body>\n\
         </html>\n",
        code = view.code,
        title = escape_html(&view.title),
        message = escape_html(&view.message),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_shows_everything() {
        let err = Error::InvalidRouteConfiguration("no controller".into());
        let view = ErrorView::new(&err, Environment::Local);
        assert_eq!(view.code, 500);
        assert_eq!(view.message, "invalid route configuration: no controller");
    }

    #[test]
    fn production_masks_server_errors() {
        let view = ErrorView::new(&Error::internal("db password wrong"), Environment::Production);
        assert_eq!(view.code, 500);
        assert_eq!(view.title, GENERIC_TITLE);
        assert_eq!(view.message, GENERIC_MESSAGE);
    }

    #[test]
    fn production_keeps_not_found_and_unauthorized_verbatim() {
        let view = ErrorView::new(&Error::Unauthorized("Invalid token".into()), Environment::Production);
        assert_eq!((view.code, view.message.as_str()), (401, "Invalid token"));

        let view = ErrorView::new(&Error::PageNotFound, Environment::Production);
        assert_eq!(view.code, 404);
        assert_eq!(view.title, "Page Not Found");
    }

    #[test]
    fn production_keeps_client_status_but_hides_detail() {
        let err = Error::method_not_allowed("TRACE", "/secret/internal");
        let view = ErrorView::new(&err, Environment::Production);
        assert_eq!(view.code, 405);
        assert!(!view.message.contains("secret"));
    }

    #[test]
    fn negotiates_on_accept() {
        let view = ErrorView::new(&Error::PageNotFound, Environment::Local);

        let json = DefaultRenderer.render(&view, "application/json, text/plain");
        assert_eq!(json.header("content-type"), Some("application/json"));
        let value: serde_json::Value = serde_json::from_slice(json.body()).unwrap();
        assert_eq!(value["ERROR_CODE"], 404);

        let text = DefaultRenderer.render(&view, "*/*");
        assert!(String::from_utf8_lossy(text.body()).starts_with("404 Page Not Found - "));
        assert_eq!(text.status_code(), StatusCode::NOT_FOUND);

        let html = DefaultRenderer.render(&view, "text/html");
        assert!(String::from_utf8_lossy(html.body()).contains("<h1>Page Not Found</h1>"));
    }

    #[test]
    fn html_page_escapes_detail() {
        let view = ErrorView {
            code: 400,
            title: "Bad Request".into(),
            message: "<script>".into(),
        };
        let html = DefaultRenderer.render(&view, "");
        assert!(String::from_utf8_lossy(html.body()).contains("&lt;script&gt;"));
    }
}
