//! Server and dispatch configuration.
//!
//! Every field has a default so an empty file is a valid config:
//!
//! ```toml
//! bind_addr = "0.0.0.0:8080"
//! shutdown_grace_period_ms = 10000
//! request_timeout_ms = 5000
//!
//! [default_headers]
//! x-content-type-options = "nosniff"
//!
//! [dispatch]
//! redirect_trailing_slash = false
//!
//! [log]
//! filter = "switchyard=debug,info"
//! json = true
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `host:port` to listen on. Port `0` picks a free port.
    pub bind_addr: String,

    /// How long in-flight requests may run after a stop before their
    /// connections are force-closed.
    pub shutdown_grace_period_ms: u64,

    /// Deadline attached to every request. Forwarded, not enforced.
    pub request_timeout_ms: Option<u64>,

    /// Headers added to every routed response that does not set them.
    pub default_headers: BTreeMap<String, String>,

    pub dispatch: DispatchConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_owned(),
            shutdown_grace_period_ms: 30_000,
            request_timeout_ms: None,
            default_headers: BTreeMap::new(),
            dispatch: DispatchConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Miss-handling policy of the [`Dispatcher`](crate::Dispatcher).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Redirect `/x` ↔ `/x/` when only the other form is registered.
    pub redirect_trailing_slash: bool,
    /// Answer OPTIONS requests with an `Allow` header.
    pub handle_options: bool,
    /// Answer 405 (rather than 404) when another method matches the path.
    pub handle_method_not_allowed: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            redirect_trailing_slash: true,
            handle_options: true,
            handle_method_not_allowed: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: "info".to_owned(), json: false }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Applies `BIND_ADDR` and `PORT` from the process environment.
    /// `BIND_ADDR` wins when both are set.
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    fn apply_env_with(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = var("PORT") {
            self.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Some(addr) = var("BIND_ADDR") {
            self.bind_addr = addr;
        }
        self
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_period_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
