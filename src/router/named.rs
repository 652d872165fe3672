//! Named routes and reverse URL generation.

use std::collections::HashMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Captures;

use super::pattern::{PLACEHOLDER, Pattern};

/// Route name → full route URI, as registered (prefix included).
///
/// Filled while the [`Router`](super::Router) is built and shared read-only
/// with every request afterwards.
#[derive(Clone, Debug, Default)]
pub struct NamedRoutes {
    routes: HashMap<String, String>,
}

impl NamedRoutes {
    pub(crate) fn insert(&mut self, name: &str, uri: &str) {
        self.routes.insert(name.to_owned(), uri.to_owned());
    }

    /// The raw URI pattern bound to `name`, e.g. `/users/:id`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize { self.routes.len() }
    pub fn is_empty(&self) -> bool { self.routes.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Builds a URI for `name`, replacing each `:key` with the matching
    /// percent-encoded value. Placeholders without a value stay as they are.
    /// The result always has exactly one leading `/`.
    pub fn url(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        let uri = self.get(name)?;
        let filled = PLACEHOLDER.replace_all(uri, |caps: &Captures<'_>| {
            match params.iter().find(|(k, _)| *k == &caps[1]) {
                Some((_, v)) => encode_segment(v),
                None => caps[0].to_owned(),
            }
        });
        Some(format!("/{}", filled.trim_start_matches('/')))
    }

    /// Whether `path` has the shape of the route named `name`. A name ending
    /// in `.*` tests every route in that namespace (`users.*` covers
    /// `users.index`, `users.show`, …).
    pub fn is_current(&self, name: &str, path: &str) -> bool {
        let path = path.trim_matches('/');
        let fits = |uri: &str| Pattern::compile(uri).captures(path).is_some();

        match name.strip_suffix(".*") {
            Some(prefix) => self
                .routes
                .iter()
                .filter(|(n, _)| {
                    n.as_str() == prefix
                        || n.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.'))
                })
                .any(|(_, uri)| fits(uri.as_str())),
            None => self.get(name).is_some_and(fits),
        }
    }
}

/// RFC 3986 unreserved characters pass through; everything else is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Percent-encodes one path segment (spaces as `%20`, not `+`).
fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> NamedRoutes {
        let mut named = NamedRoutes::default();
        named.insert("index", "/");
        named.insert("users.index", "/users");
        named.insert("users.show", "/users/:id");
        named.insert("posts.show", "/users/:user/posts/:post");
        named
    }

    #[test]
    fn reverse_lookup_of_root() {
        assert_eq!(table().url("index", &[]).as_deref(), Some("/"));
    }

    #[test]
    fn substitutes_and_encodes_params() {
        let named = table();
        assert_eq!(named.url("users.show", &[("id", "42")]).as_deref(), Some("/users/42"));
        assert_eq!(
            named.url("posts.show", &[("post", "a b/c"), ("user", "7")]).as_deref(),
            Some("/users/7/posts/a%20b%2Fc"),
        );
        assert_eq!(named.url("users.show", &[]).as_deref(), Some("/users/:id"));
        assert_eq!(named.url("missing", &[]), None);
    }

    #[test]
    fn unreserved_characters_stay_literal() {
        assert_eq!(encode_segment("v1.0_beta-2~rc"), "v1.0_beta-2~rc");
        assert_eq!(encode_segment("a+b&c=d"), "a%2Bb%26c%3Dd");
        assert_eq!(encode_segment("café"), "caf%C3%A9");
    }

    #[test]
    fn placeholder_names_do_not_prefix_match() {
        let mut named = NamedRoutes::default();
        named.insert("pair", "/:id/:idx");
        assert_eq!(
            named.url("pair", &[("id", "1"), ("idx", "2")]).as_deref(),
            Some("/1/2"),
        );
    }

    #[test]
    fn current_route_checks() {
        let named = table();
        assert!(named.is_current("users.show", "/users/42"));
        assert!(!named.is_current("users.show", "/users/42/edit"));
        assert!(named.is_current("users.*", "/users"));
        assert!(named.is_current("users.*", "/users/9/"));
        assert!(!named.is_current("posts.*", "/users/9"));
        assert!(!named.is_current("nope", "/"));
    }
}
