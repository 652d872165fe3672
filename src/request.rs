//! Incoming HTTP request type.
//!
//! A [`Request`] is built once per incoming request, either by the server
//! from a hyper request or by [`Request::builder`] in tests. The body is
//! decoded eagerly into string fields, so handlers and middleware never deal
//! with content types:
//!
//! - `application/x-www-form-urlencoded` → fields
//! - `application/json` (object) → fields, non-string values as JSON text
//! - `multipart/form-data` → fields and [`UploadedFile`]s
//!
//! Cloning is cheap enough to do per injected argument: the body is
//! [`Bytes`] and the named-route table is shared.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use url::form_urlencoded;

use crate::extract::State;
use crate::method::Method;
use crate::router::{NamedRoutes, PathParams};

/// A file received in a `multipart/form-data` body.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize { self.data.len() }
}

/// An incoming HTTP request.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: String,
    headers: HeaderMap,
    body: Bytes,
    fields: HashMap<String, String>,
    query_fields: HashMap<String, String>,
    files: Vec<UploadedFile>,
    remote_addr: Option<SocketAddr>,
    params: PathParams,
    routes: Arc<NamedRoutes>,
    state: Arc<State>,
    controllers: Arc<State>,
    extensions: http::Extensions,
}

impl Request {
    /// Builder for requests that did not come off the wire.
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            method: Method::Get,
            uri: "/".to_owned(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    pub(crate) fn from_parts(
        method: Method,
        uri: &http::Uri,
        headers: HeaderMap,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let path = uri.path().to_owned();
        let query = uri.query().unwrap_or_default().to_owned();
        let query_fields = form_urlencoded::parse(query.as_bytes()).into_owned().collect();
        let (fields, files) = decode_body(&headers, &body);

        Self {
            method,
            path,
            query,
            headers,
            body,
            fields,
            query_fields,
            files,
            remote_addr,
            params: PathParams::default(),
            routes: Arc::default(),
            state: Arc::default(),
            controllers: Arc::default(),
            extensions: http::Extensions::new(),
        }
    }

    pub(crate) fn set_method(&mut self, method: Method) { self.method = method; }
    pub(crate) fn set_params(&mut self, params: PathParams) { self.params = params; }
    pub(crate) fn set_routes(&mut self, routes: Arc<NamedRoutes>) { self.routes = routes; }
    pub(crate) fn set_state(&mut self, state: Arc<State>) { self.state = state; }
    pub(crate) fn state(&self) -> &State { &self.state }
    pub(crate) fn set_controllers(&mut self, controllers: Arc<State>) { self.controllers = controllers; }
    pub(crate) fn controllers(&self) -> &State { &self.controllers }

    /// The method the client actually sent, before any override.
    pub fn method(&self) -> Method { self.method }
    /// Path without the query string, e.g. `/users/42`.
    pub fn path(&self) -> &str { &self.path }
    /// Raw query string without the leading `?`.
    pub fn query_string(&self) -> &str { &self.query }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn files(&self) -> &[UploadedFile] { &self.files }
    pub fn params(&self) -> &PathParams { &self.params }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn named_routes(&self) -> &NamedRoutes { &self.routes }

    /// Per-request values attached by middleware.
    pub fn extensions(&self) -> &http::Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut http::Extensions { &mut self.extensions }

    pub fn is_method(&self, method: Method) -> bool { self.method == method }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// A decoded body field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &HashMap<String, String> { &self.fields }

    /// A decoded query-string field.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query_fields.get(key).map(String::as_str)
    }

    pub fn query_fields(&self) -> &HashMap<String, String> { &self.query_fields }

    /// Body field first, then query field.
    pub fn input(&self, key: &str) -> Option<&str> {
        self.field(key).or_else(|| self.query(key))
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    /// The bearer token from the `Authorization` header, if any.
    pub fn token(&self) -> Option<&str> {
        let value = self.header("authorization")?;
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        (!token.is_empty()).then_some(token)
    }

    /// The method a `POST` asks to be treated as, raw and unvalidated.
    pub fn method_override(&self) -> Option<&str> {
        self.field("_method").or_else(|| self.header("x-http-method-override"))
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    pub fn is_ajax(&self) -> bool {
        self.header("x-requested-with") == Some("XMLHttpRequest")
    }

    pub fn accepts_json(&self) -> bool {
        self.header("accept")
            .is_some_and(|a| a.to_ascii_lowercase().contains("application/json"))
    }

    pub fn user_agent(&self) -> &str { self.header("user-agent").unwrap_or_default() }
    pub fn referer(&self) -> &str { self.header("referer").unwrap_or_default() }

    /// Client address, preferring the first hop of `X-Forwarded-For` since
    /// kiln expects to sit behind a proxy.
    pub fn client_ip(&self) -> Option<String> {
        self.header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_owned())
            .or_else(|| self.remote_addr.map(|a| a.ip().to_string()))
    }

    /// Reverse-generates the URI of a named route.
    ///
    /// ```rust
    /// # use kiln::Request;
    /// # let req = Request::builder().build();
    /// // with `users.show → /users/:id` registered:
    /// let _ = req.route("users.show", &[("id", "42")]); // Some("/users/42")
    /// ```
    pub fn route(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        self.routes.url(name, params)
    }

    /// Whether the current path matches the named route. A trailing `.*`
    /// matches every route whose name starts with the prefix.
    pub fn route_is(&self, name: &str) -> bool {
        self.routes.is_current(name, &self.path)
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Request`]. Defaults to `GET /`.
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path with an optional query string, e.g. `/search?q=rust`.
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = uri.to_owned();
        self
    }

    /// Adds a header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(n, v);
        }
        self
    }

    /// URL-encoded form body.
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.header("content-type", "application/x-www-form-urlencoded")
            .body(body)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Finishes the request. An unparsable URI is treated as `/`.
    pub fn build(self) -> Request {
        let uri = self.uri.parse::<http::Uri>().unwrap_or_else(|_| http::Uri::from_static("/"));
        Request::from_parts(self.method, &uri, self.headers, self.body, self.remote_addr)
    }
}

// ── Body decoding ─────────────────────────────────────────────────────────────

type Decoded = (HashMap<String, String>, Vec<UploadedFile>);

fn decode_body(headers: &HeaderMap, body: &Bytes) -> Decoded {
    if body.is_empty() {
        return Decoded::default();
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

    match mime.as_str() {
        "application/x-www-form-urlencoded" => {
            (form_urlencoded::parse(body).into_owned().collect(), Vec::new())
        }
        "application/json" => (decode_json_object(body), Vec::new()),
        "multipart/form-data" => match boundary(content_type) {
            Some(b) => decode_multipart(body, &b),
            None => Decoded::default(),
        },
        _ => Decoded::default(),
    }
}

fn decode_json_object(body: &[u8]) -> HashMap<String, String> {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(body) else {
        return HashMap::new();
    };
    map.into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect()
}

fn boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| k.eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v.trim_matches('"').to_owned())
}

fn decode_multipart(body: &Bytes, boundary: &str) -> Decoded {
    let delimiter = format!("--{boundary}");
    let mut fields = HashMap::new();
    let mut files = Vec::new();

    let mut rest: &[u8] = body;
    // Skip the preamble up to the first delimiter.
    let Some(start) = find(rest, delimiter.as_bytes()) else { return (fields, files) };
    rest = &rest[start + delimiter.len()..];

    loop {
        if rest.starts_with(b"--") {
            break;
        }
        let Some(end) = find(rest, delimiter.as_bytes()) else { break };
        let part = strip_crlf(&rest[..end]);
        rest = &rest[end + delimiter.len()..];

        let Some(split) = find(part, b"\r\n\r\n") else { continue };
        let (head, data) = (&part[..split], &part[split + 4..]);
        let head = String::from_utf8_lossy(head);

        let mut name = None;
        let mut file_name = None;
        let mut content_type = None;
        for line in head.lines() {
            let Some((key, value)) = line.split_once(':') else { continue };
            if key.trim().eq_ignore_ascii_case("content-disposition") {
                for attr in value.split(';').filter_map(|a| a.trim().split_once('=')) {
                    let v = attr.1.trim_matches('"').to_owned();
                    match attr.0 {
                        "name" => name = Some(v),
                        "filename" => file_name = Some(v),
                        _ => {}
                    }
                }
            } else if key.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim().to_owned());
            }
        }

        let Some(name) = name else { continue };
        match file_name {
            Some(file_name) => files.push(UploadedFile {
                field: name,
                file_name,
                content_type,
                data: body.slice_ref(data),
            }),
            None => {
                fields.insert(name, String::from_utf8_lossy(data).into_owned());
            }
        }
    }

    (fields, files)
}

/// Drops the CRLF that opens a part and the CRLF that precedes the next delimiter.
fn strip_crlf(part: &[u8]) -> &[u8] {
    let part = part.strip_prefix(b"\r\n").unwrap_or(part);
    part.strip_suffix(b"\r\n").unwrap_or(part)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
