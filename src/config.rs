//! Application configuration.
//!
//! Loaded once at startup from a TOML file. Every section has defaults, so
//! an empty file (or [`Config::default`]) is a valid configuration.
//!
//! ```toml
//! [app]
//! env = "local"
//!
//! [middleware]
//! default = ["cors", "csrf"]
//! exclude_prefixes = ["/api"]
//!
//! [cors]
//! paths = ["api/*"]
//! allowed_origins = ["https://app.example"]
//! ```

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Deployment environment. Controls how much error detail reaches clients.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    #[default]
    Production,
}

/// Root configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub middleware: MiddlewareConfig,
    pub cors: CorsConfig,
    pub server: ServerConfig,

    /// The raw document, kept for [`Config::get`].
    #[serde(skip)]
    raw: toml::Table,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub env: Environment,
    pub url: String,
    pub locale: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "kiln".to_owned(),
            env: Environment::Production,
            url: "http://localhost".to_owned(),
            locale: "en".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Middleware names appended to every route's own list.
    pub default: Vec<String>,
    /// Path prefixes exempt from CSRF verification.
    pub exclude_prefixes: Vec<String>,
}

/// Settings for the `cors` middleware.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Paths handled, without the leading `/`. A trailing `*` matches any rest.
    pub paths: Vec<String>,
    pub allowed_methods: Vec<String>,
    /// Exact origins, or `*` for any.
    pub allowed_origins: Vec<String>,
    /// Regexes matched against the whole `Origin` header.
    pub allowed_origins_patterns: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    /// Seconds a preflight answer may be cached.
    pub max_age: u32,
    pub supports_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            paths: vec!["api/*".to_owned()],
            allowed_methods: vec!["*".to_owned()],
            allowed_origins: vec!["*".to_owned()],
            allowed_origins_patterns: Vec::new(),
            allowed_headers: vec!["*".to_owned()],
            exposed_headers: Vec::new(),
            max_age: 0,
            supports_credentials: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_owned() }
    }
}

impl Config {
    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: toml::Table = toml::from_str(content)?;
        let mut config: Config = toml::Value::Table(raw.clone()).try_into()?;
        config.raw = raw;
        Ok(config)
    }

    pub fn is_local(&self) -> bool {
        self.app.env == Environment::Local
    }

    /// Dotted-key lookup into the raw document, e.g. `get("cache.ttl", 60)`.
    ///
    /// Returns `default` when the key is absent or has the wrong shape.
    /// Typed sections like [`Config::app`] are the first choice; this covers
    /// keys the framework itself does not know about.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let mut parts = key.split('.');
        let Some(first) = parts.next() else { return default };
        let mut cursor = match self.raw.get(first) {
            Some(v) => v,
            None => return default,
        };
        for part in parts {
            cursor = match cursor.get(part) {
                Some(v) => v,
                None => return default,
            };
        }
        cursor.clone().try_into().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [app]
        name = "shortener"
        env = "local"

        [middleware]
        default = ["csrf", "trace"]
        exclude_prefixes = ["/api"]

        [cache]
        ttl = 120
    "#;

    #[test]
    fn parses_typed_sections() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.app.name, "shortener");
        assert!(config.is_local());
        assert_eq!(config.middleware.default, vec!["csrf", "trace"]);
        assert_eq!(config.middleware.exclude_prefixes, vec!["/api"]);
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn cors_section_overrides_only_what_it_names() {
        let config =
            Config::from_toml("[cors]\nallowed_origins = [\"https://app.example\"]\nmax_age = 600").unwrap();
        assert_eq!(config.cors.allowed_origins, vec!["https://app.example"]);
        assert_eq!(config.cors.max_age, 600);
        assert_eq!(config.cors.paths, vec!["api/*"]);
        assert!(!config.cors.supports_credentials);
    }

    #[test]
    fn empty_document_is_production_with_no_middleware() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.app.env, Environment::Production);
        assert!(config.middleware.default.is_empty());
    }

    #[test]
    fn dotted_get_falls_back_to_default() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.get("cache.ttl", 60_i64), 120);
        assert_eq!(config.get("cache.missing", 60_i64), 60);
        assert_eq!(config.get("app.name", String::new()), "shortener");
        assert_eq!(config.get("app.name", 7_i64), 7);
    }

    #[test]
    fn rejects_unknown_environment() {
        assert!(matches!(
            Config::from_toml("[app]\nenv = \"staging\""),
            Err(ConfigError::Parse(_)),
        ));
    }
}
