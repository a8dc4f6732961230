//! Configuration
//!
//! [`ConfigService`] is a key/value view over the process environment that
//! can be injected like any other provider once [`ConfigModule::for_root`]
//! is imported. [`ApplicationOptions`] tunes the bootstrap itself.

use crate::di::Provider;
use crate::module::{ModuleDeclaration, ModuleRef};
use dashmap::DashMap;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration service
///
/// ```
/// use trellis::ConfigService;
///
/// let config = ConfigService::with_values([("PORT", "8080")]);
/// assert_eq!(config.get_parsed::<u16>("PORT"), Some(8080));
/// assert_eq!(config.get("MISSING"), None);
/// ```
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// Snapshot of the current environment variables.
    pub fn new() -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    /// Only the given values; the environment is not read.
    pub fn with_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let service = Self::default();
        for (key, value) in values {
            service.set(key.as_ref(), value.as_ref());
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a value; unparseable values are logged and treated as missing.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable configuration value");
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.config.len()
    }

    pub fn is_empty(&self) -> bool {
        self.config.is_empty()
    }
}

/// Module that exports a [`ConfigService`].
pub struct ConfigModule;

impl ConfigModule {
    /// A module providing a service loaded from the environment.
    pub fn for_root() -> ModuleRef {
        Self::for_service("root", ConfigService::new())
    }

    /// A module providing `service`; `key` distinguishes it from other config modules.
    pub fn for_service(key: &'static str, service: ConfigService) -> ModuleRef {
        ModuleRef::dynamic::<ConfigModule>(key, move |module: &mut ModuleDeclaration| {
            module.provider(Provider::instance(service.clone()));
            module.export::<ConfigService>();
        })
    }
}

/// Bootstrap options
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApplicationOptions {
    /// Prepended to every route, e.g. `api`.
    pub global_prefix: String,
    /// Send internal error messages to clients instead of a generic message.
    pub expose_error_details: bool,
    /// Maximum request body size in bytes.
    pub body_limit: usize,
    pub host: String,
    /// Upper bound on the startup lifecycle hooks.
    pub init_timeout_ms: Option<u64>,
}

impl Default for ApplicationOptions {
    fn default() -> Self {
        Self {
            global_prefix: String::new(),
            expose_error_details: false,
            body_limit: 2 * 1024 * 1024,
            host: "0.0.0.0".to_string(),
            init_timeout_ms: None,
        }
    }
}

impl ApplicationOptions {
    /// Read `TRELLIS_*` keys, falling back to the defaults.
    pub fn from_config(config: &ConfigService) -> Self {
        let defaults = Self::default();
        Self {
            global_prefix: config
                .get("TRELLIS_GLOBAL_PREFIX")
                .unwrap_or(defaults.global_prefix),
            expose_error_details: config
                .get_parsed("TRELLIS_EXPOSE_ERRORS")
                .unwrap_or(defaults.expose_error_details),
            body_limit: config
                .get_parsed("TRELLIS_BODY_LIMIT")
                .unwrap_or(defaults.body_limit),
            host: config.get("TRELLIS_HOST").unwrap_or(defaults.host),
            init_timeout_ms: config
                .get_parsed("TRELLIS_INIT_TIMEOUT_MS")
                .or(defaults.init_timeout_ms),
        }
    }

    pub fn from_env() -> Self {
        Self::from_config(&ConfigService::new())
    }

    pub fn global_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.global_prefix = prefix.into();
        self
    }

    pub fn expose_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    pub fn init_timeout(&self) -> Option<Duration> {
        self.init_timeout_ms.map(Duration::from_millis)
    }
}
