//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the route server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind host and port).
    pub listener: ListenerConfig,

    /// Route tree location and compile settings.
    pub routes: RoutesConfig,

    /// Request and script execution limits.
    pub limits: LimitsConfig,

    /// Error exposure policy.
    pub errors: ErrorsConfig,

    /// Background unit watcher.
    pub watcher: WatcherConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Built-in CORS middleware.
    pub cors: CorsConfig,
}

impl ServerConfig {
    /// Config rooted at the given route directory, everything else defaulted.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.routes.root = root.into();
        config
    }

    /// Socket address string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listener.host, self.listener.port)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind host (e.g., "0.0.0.0").
    pub host: String,

    /// Bind port.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Route tree configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Directory holding the route tree.
    pub root: PathBuf,

    /// Source extension of unit files, without the dot.
    pub extension: String,

    /// Where compiled generations are written. Defaults to a directory
    /// under the system temp dir.
    pub cache_dir: Option<PathBuf>,

    /// Compile every unit at startup even when the watcher is disabled.
    pub precompile: bool,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("routes"),
            extension: "rhai".to_string(),
            cache_dir: None,
            precompile: true,
        }
    }
}

impl RoutesConfig {
    /// Resolved artifact directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("hotroute-unit-cache"))
    }
}

/// Request and execution limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes (0 = unlimited).
    pub max_body_bytes: usize,

    /// Maximum script operations per call (0 = unlimited).
    pub max_operations: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024, // 1MB
            max_operations: 0,
        }
    }
}

/// Error exposure configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ErrorsConfig {
    /// Include internal error messages in 500 responses.
    pub expose_internal: bool,
}

/// Unit watcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Enable the background watcher.
    pub enabled: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// CORS middleware configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Install the CORS middleware.
    pub enabled: bool,

    /// Value of `Access-Control-Allow-Origin`.
    pub allow_origin: String,

    /// Allowed headers when the preflight does not request any.
    pub allow_headers: String,

    /// Preflight cache lifetime.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_origin: "*".to_string(),
            allow_headers: "content-type, authorization".to_string(),
            max_age_secs: 86_400,
        }
    }
}
