//! Route pattern compilation.
//!
//! A route URI like `users/:id/posts/:post` compiles to one anchored regex
//! where each `:name` placeholder captures exactly one path segment
//! (`[^/]+`). Everything else is literal: regex metacharacters in the URI
//! are escaped, so `/files/v1.0` does not match `/files/v1x0`.

use std::sync::LazyLock;

use regex::Regex;

pub(crate) static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder regex is valid")
});

/// A compiled route URI.
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    regex: Regex,
    names: Vec<String>,
}

impl Pattern {
    /// Compiles a route URI. Leading and trailing `/` are ignored, matching
    /// how request paths are normalised before lookup.
    pub fn compile(uri: &str) -> Self {
        let source = uri.trim_matches('/').to_owned();
        let mut expr = String::with_capacity(source.len() + 8);
        let mut names = Vec::new();
        let mut last = 0;

        expr.push('^');
        for caps in PLACEHOLDER.captures_iter(&source) {
            let whole = caps.get(0).expect("group 0 always participates");
            expr.push_str(&regex::escape(&source[last..whole.start()]));
            expr.push_str("([^/]+)");
            names.push(caps[1].to_owned());
            last = whole.end();
        }
        expr.push_str(&regex::escape(&source[last..]));
        expr.push('$');

        // Every fragment above is either escaped literal text or a fixed
        // group, so the expression always compiles.
        let regex = Regex::new(&expr).expect("escaped route pattern is valid");
        Self { source, regex, names }
    }

    /// The normalised URI this pattern was compiled from.
    pub fn source(&self) -> &str { &self.source }

    /// Placeholder names in textual order.
    pub fn names(&self) -> &[String] { &self.names }

    pub fn is_static(&self) -> bool { self.names.is_empty() }

    /// Captured segment values in placeholder order, or `None` when the
    /// path does not have this shape. `path` must already be trimmed of `/`.
    pub fn captures(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(path)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_owned()).unwrap_or_default())
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_single_segment_per_placeholder() {
        let p = Pattern::compile("/users/:id");
        assert_eq!(p.captures("users/42"), Some(vec!["42".to_owned()]));
        assert_eq!(p.captures("users/42/edit"), None);
        assert_eq!(p.captures("users/"), None);
        assert_eq!(p.names(), ["id"]);
    }

    #[test]
    fn captures_follow_textual_order() {
        let p = Pattern::compile("/teams/:team/members/:member");
        assert_eq!(
            p.captures("teams/core/members/ana"),
            Some(vec!["core".to_owned(), "ana".to_owned()]),
        );
        assert_eq!(p.names(), ["team", "member"]);
    }

    #[test]
    fn root_matches_only_empty_path() {
        let p = Pattern::compile("/");
        assert!(p.is_static());
        assert_eq!(p.captures(""), Some(vec![]));
        assert_eq!(p.captures("abc"), None);
    }

    #[test]
    fn literal_metacharacters_are_escaped() {
        let p = Pattern::compile("/files/v1.0/:name");
        assert!(p.captures("files/v1.0/readme").is_some());
        assert!(p.captures("files/v1x0/readme").is_none());

        let p = Pattern::compile("/a+b");
        assert!(p.captures("a+b").is_some());
        assert!(p.captures("aab").is_none());
    }

    #[test]
    fn placeholder_inside_a_segment() {
        let p = Pattern::compile("/report-:year.csv");
        assert_eq!(p.captures("report-2024.csv"), Some(vec!["2024".to_owned()]));
    }
}
