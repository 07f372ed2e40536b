//! Configuration loading for push-relay.
//!
//! Configuration is loaded from a TOML file (default: `bridge.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for push-relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// FCM credentials.
    pub fcm: FcmConfig,
    /// Text of the forwarded notification.
    pub notification: NotificationConfig,
    /// Rate limiting configuration.
    pub limits: LimitsConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
    /// Cleanup task configuration.
    pub cleanup: CleanupConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP server (default: 0.0.0.0:8080).
    pub bind_address: String,
    /// Public base URL used to build webhook endpoints.
    ///
    /// When unset, `https://<Host header>` of the subscribe request is used.
    pub public_url: Option<String>,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    pub database: PathBuf,
    /// Lifetime of subscription records in seconds (default: 30 days).
    pub retention_secs: u64,
}

/// FCM credentials configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FcmConfig {
    /// Path to a service-account JSON file. Takes precedence over the env var.
    pub service_account_path: Option<PathBuf>,
    /// Environment variable holding base64-encoded service-account JSON.
    pub service_account_env: String,
}

/// Notification text configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Title of every forwarded notification.
    pub title: String,
    /// Body used when the decrypted payload has no title.
    pub fallback_body: String,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Webhook deliveries allowed per subscription per minute (default: 120).
    pub webhook_per_minute: u32,
    /// Requests allowed per second across all clients (default: 200).
    pub global_requests_per_second: u32,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    pub metrics_enabled: bool,
}

/// Cleanup task configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Cleanup interval in seconds (default: 3600 = 1 hour).
    pub interval_secs: u64,
    /// Enable cleanup task (default: true).
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            public_url: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("bridge.db"),
            retention_secs: 30 * 24 * 60 * 60,
        }
    }
}

impl Default for FcmConfig {
    fn default() -> Self {
        Self {
            service_account_path: None,
            service_account_env: "FIREBASE_SERVICE_ACCOUNT_BASE64".to_string(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "Patchwork".to_string(),
            fallback_body: "You have a new notification".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            webhook_per_minute: 120,
            global_requests_per_second: 200,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or holds
    /// out-of-range values.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the bridge misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.retention_secs == 0 {
            return Err(ConfigError::invalid("storage.retention_secs", "must be > 0"));
        }
        if self.limits.webhook_per_minute == 0 {
            return Err(ConfigError::invalid("limits.webhook_per_minute", "must be > 0"));
        }
        if self.limits.global_requests_per_second == 0 {
            return Err(ConfigError::invalid(
                "limits.global_requests_per_second",
                "must be > 0",
            ));
        }
        if self.cleanup.interval_secs == 0 {
            return Err(ConfigError::invalid("cleanup.interval_secs", "must be > 0"));
        }
        if let Some(url) = &self.server.public_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid(
                    "server.public_url",
                    "must start with http:// or https://",
                ));
            }
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid config value {field}: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}
