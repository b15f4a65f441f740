//! Configuration lookup.
//!
//! Keys are dotted paths into a TOML document, `server.address` reads `address` from
//! the `[server]` table. Every key can be overridden from the environment: `server.address`
//! is overridden by `MICRO_API_SERVER_ADDRESS`.
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:8080"
//! dispatch_timeout_ms = 5000
//!
//! [auth]
//! secret = "change-me"
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use std::{env, fs};

use thiserror::Error;
use toml::{Table, Value};
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "MICRO_API_";

const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("can't parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing config key '{key}'")]
    Missing { key: String },

    #[error("invalid value for config key '{key}': '{value}'")]
    Invalid { key: String, value: String },
}

impl ConfigError {
    pub fn missing<S: ToString>(key: S) -> Self {
        Self::Missing { key: key.to_string() }
    }

    pub fn invalid<S: ToString, V: ToString>(key: S, value: V) -> Self {
        Self::Invalid { key: key.to_string(), value: value.to_string() }
    }
}

/// Read access to configuration values by dotted key.
pub trait ConfigLookup: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Configuration loaded from a TOML file with environment overrides.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    table: Table,
    overrides: HashMap<String, String>,
}

impl AppConfig {
    /// Loads `path`, taking overrides from the process environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_with_env(&content, env::vars())?;
        info!(path = %path.display(), overrides = config.overrides.len(), "configuration loaded");
        Ok(config)
    }

    /// Parses `content`, taking overrides from the process environment.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Self::from_toml_with_env(content, env::vars())
    }

    /// Parses `content`, taking overrides from `vars`. Only variables starting with
    /// [`ENV_PREFIX`] are kept.
    pub fn from_toml_with_env<I>(content: &str, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let table = content.parse::<Table>()?;
        let overrides = vars.into_iter().filter(|(name, _)| name.starts_with(ENV_PREFIX)).collect();
        Ok(Self { table, overrides })
    }

    /// The address the server binds, `127.0.0.1:8080` unless configured.
    pub fn server_address(&self) -> Result<SocketAddr, ConfigError> {
        let key = "server.address";
        let value = self.get(key).unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_owned());
        value.parse().map_err(|_e| ConfigError::invalid(key, value))
    }

    /// The optional deadline around a whole dispatch.
    pub fn dispatch_timeout(&self) -> Result<Option<Duration>, ConfigError> {
        let key = "server.dispatch_timeout_ms";
        self.get(key)
            .map(|value| value.parse::<u64>().map(Duration::from_millis).map_err(|_e| ConfigError::invalid(key, value)))
            .transpose()
    }

    fn lookup_table(&self, key: &str) -> Option<String> {
        let mut segments = key.split('.');
        let first = segments.next()?;
        let mut current = self.table.get(first)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }

        match current {
            Value::String(value) => Some(value.clone()),
            Value::Integer(value) => Some(value.to_string()),
            Value::Float(value) => Some(value.to_string()),
            Value::Boolean(value) => Some(value.to_string()),
            Value::Datetime(value) => Some(value.to_string()),
            Value::Array(_) | Value::Table(_) => None,
        }
    }
}

impl ConfigLookup for AppConfig {
    fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(&env_name(key)) {
            debug!(key, "config value taken from environment");
            return Some(value.clone());
        }
        self.lookup_table(key)
    }
}

/// `server.dispatch_timeout_ms` becomes `MICRO_API_SERVER_DISPATCH_TIMEOUT_MS`.
fn env_name(key: &str) -> String {
    let mut name = String::with_capacity(ENV_PREFIX.len() + key.len());
    name.push_str(ENV_PREFIX);
    name.extend(key.chars().map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' }));
    name
}

/// In-memory configuration.
#[derive(Debug, Clone, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { values: iter.into_iter().map(|(key, value)| (key.into(), value.into())).collect() }
    }
}

impl ConfigLookup for MapConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const CONFIG: &str = indoc! {r#"
        [server]
        address = "0.0.0.0:9000"
        dispatch_timeout_ms = 250

        [auth]
        secret = "from-file"

        [features]
        enabled = true
        tags = ["a", "b"]
    "#};

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn dotted_lookup() {
        let config = AppConfig::from_toml_with_env(CONFIG, no_env()).unwrap();
        assert_eq!(config.get("auth.secret").as_deref(), Some("from-file"));
        assert_eq!(config.get("server.dispatch_timeout_ms").as_deref(), Some("250"));
        assert_eq!(config.get("features.enabled").as_deref(), Some("true"));
        assert_eq!(config.get("features.tags"), None);
        assert_eq!(config.get("features"), None);
        assert_eq!(config.get("auth.secret.deeper"), None);
        assert_eq!(config.get("missing.key"), None);
    }

    #[test]
    fn environment_overrides_file() {
        let env = vec![
            ("MICRO_API_AUTH_SECRET".to_owned(), "from-env".to_owned()),
            ("OTHER_AUTH_SECRET".to_owned(), "ignored".to_owned()),
        ];
        let config = AppConfig::from_toml_with_env(CONFIG, env).unwrap();
        assert_eq!(config.get("auth.secret").as_deref(), Some("from-env"));
        assert_eq!(config.get("server.address").as_deref(), Some("0.0.0.0:9000"));
    }

    #[test]
    fn typed_accessors() {
        let config = AppConfig::from_toml_with_env(CONFIG, no_env()).unwrap();
        assert_eq!(config.server_address().unwrap(), "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.dispatch_timeout().unwrap(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn defaults_when_absent() {
        let config = AppConfig::from_toml_with_env("", no_env()).unwrap();
        assert_eq!(config.server_address().unwrap(), "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.dispatch_timeout().unwrap(), None);
    }

    #[test]
    fn invalid_values() {
        let env = vec![("MICRO_API_SERVER_DISPATCH_TIMEOUT_MS".to_owned(), "soon".to_owned())];
        let config = AppConfig::from_toml_with_env("[server]\naddress = \"nowhere\"", env).unwrap();
        assert!(matches!(config.server_address(), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config.dispatch_timeout(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn parse_error() {
        let result = AppConfig::from_toml_with_env("[server\naddress =", no_env());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file() {
        let result = AppConfig::load("/definitely/not/here/micro-api.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn env_names() {
        assert_eq!(env_name("server.address"), "MICRO_API_SERVER_ADDRESS");
        assert_eq!(env_name("auth.secret"), "MICRO_API_AUTH_SECRET");
    }

    #[test]
    fn map_config() {
        let mut config = MapConfig::from_iter([("auth.secret", "s")]);
        config.insert("server.address", "127.0.0.1:1");
        assert_eq!(config.get("auth.secret").as_deref(), Some("s"));
        assert_eq!(config.get("server.address").as_deref(), Some("127.0.0.1:1"));
        assert_eq!(config.get("nope"), None);
    }
}
