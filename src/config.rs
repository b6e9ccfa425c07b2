//! Configuration loading and types for blob-quickstart.
//!
//! Configuration is read once from the process environment into the
//! [`Config`] struct and is immutable afterwards.  Each subsection governs
//! a different part of the service: networking, the managed identity,
//! the blob container, logging and metrics.
//!
//! The three core settings (`AZURE_CLIENT_ID`, `BLOB_ACCOUNT_NAME`,
//! `BLOB_CONTAINER_NAME`) are passed through as-is, empty when unset.
//! Problems with them surface on the first storage call.

use anyhow::Context;

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Managed identity settings.
    pub identity: IdentityConfig,

    /// Blob storage settings.
    pub storage: StorageConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host address.
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Upper bound on the time spent handling a single request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Managed identity configuration.
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    /// Client id of the user-assigned managed identity (`AZURE_CLIENT_ID`).
    /// Empty selects the host's default identity.
    pub client_id: String,

    /// Token endpoint override (`IDENTITY_ENDPOINT`).  IMDS when unset.
    pub endpoint: Option<String>,

    /// Secret sent as `X-IDENTITY-HEADER` to `endpoint` (`IDENTITY_HEADER`).
    pub identity_header: Option<String>,
}

/// Blob storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Backend type: `azure` or `memory`.
    pub backend: String,

    /// Azure storage account name (`BLOB_ACCOUNT_NAME`).
    pub account_name: String,

    /// Target container name (`BLOB_CONTAINER_NAME`).
    pub container_name: String,

    /// Blob service endpoint override (`BLOB_ENDPOINT`).
    pub endpoint: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            account_name: String::new(),
            container_name: String::new(),
            endpoint: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    pub level: String,

    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Environment variable names -------------------------------------------------

pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const ENV_ACCOUNT_NAME: &str = "BLOB_ACCOUNT_NAME";
pub const ENV_CONTAINER_NAME: &str = "BLOB_CONTAINER_NAME";
pub const ENV_BLOB_ENDPOINT: &str = "BLOB_ENDPOINT";
pub const ENV_BLOB_BACKEND: &str = "BLOB_BACKEND";
pub const ENV_IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
pub const ENV_IDENTITY_HEADER: &str = "IDENTITY_HEADER";
pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT_SECS";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
pub const ENV_METRICS_ENABLED: &str = "METRICS_ENABLED";

// -- Defaults ----------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    60
}

fn default_storage_backend() -> String {
    "azure".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty optional overrides count as unset.
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server = ServerConfig {
            host: non_empty(ENV_HOST).unwrap_or_else(default_host),
            port: match non_empty(ENV_PORT) {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("{ENV_PORT} must be a port number, got '{v}'"))?,
                None => default_port(),
            },
            request_timeout_secs: match non_empty(ENV_REQUEST_TIMEOUT) {
                Some(v) => {
                    let secs: u64 = v.trim().parse().with_context(|| {
                        format!("{ENV_REQUEST_TIMEOUT} must be a number of seconds, got '{v}'")
                    })?;
                    if secs == 0 {
                        anyhow::bail!("{ENV_REQUEST_TIMEOUT} must be at least 1 second");
                    }
                    secs
                }
                None => default_request_timeout(),
            },
        };

        let identity = IdentityConfig {
            client_id: lookup(ENV_CLIENT_ID).unwrap_or_default(),
            endpoint: non_empty(ENV_IDENTITY_ENDPOINT),
            identity_header: non_empty(ENV_IDENTITY_HEADER),
        };

        let storage = StorageConfig {
            backend: non_empty(ENV_BLOB_BACKEND)
                .map(|v| v.trim().to_lowercase())
                .unwrap_or_else(default_storage_backend),
            account_name: lookup(ENV_ACCOUNT_NAME).unwrap_or_default(),
            container_name: lookup(ENV_CONTAINER_NAME).unwrap_or_default(),
            endpoint: non_empty(ENV_BLOB_ENDPOINT),
        };

        let logging = LoggingConfig {
            level: non_empty(ENV_LOG_LEVEL).unwrap_or_else(default_log_level),
            format: non_empty(ENV_LOG_FORMAT)
                .map(|v| v.trim().to_lowercase())
                .unwrap_or_else(default_log_format),
        };

        let observability = ObservabilityConfig {
            metrics: match non_empty(ENV_METRICS_ENABLED) {
                Some(v) => parse_bool(&v).with_context(|| {
                    format!("{ENV_METRICS_ENABLED} must be true or false, got '{v}'")
                })?,
                None => true,
            },
        };

        Ok(Self {
            server,
            identity,
            storage,
            logging,
            observability,
        })
    }

    /// The `host:port` pair to listen on.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a boolean: {other}"),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_core_settings_read_from_environment() {
        let config = load(&[
            ("AZURE_CLIENT_ID", "00000000-1111-2222-3333-444444444444"),
            ("BLOB_ACCOUNT_NAME", "mystorage"),
            ("BLOB_CONTAINER_NAME", "quickstart"),
        ])
        .unwrap();

        assert_eq!(
            config.identity.client_id,
            "00000000-1111-2222-3333-444444444444"
        );
        assert_eq!(config.storage.account_name, "mystorage");
        assert_eq!(config.storage.container_name, "quickstart");
    }

    #[test]
    fn test_missing_core_settings_pass_through_empty() {
        let config = load(&[]).unwrap();
        assert_eq!(config.identity.client_id, "");
        assert_eq!(config.storage.account_name, "");
        assert_eq!(config.storage.container_name, "");
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.request_timeout_secs, 60);
        assert_eq!(config.storage.backend, "azure");
        assert_eq!(config.storage.endpoint, None);
        assert_eq!(config.identity.endpoint, None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert!(config.observability.metrics);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("BLOB_BACKEND", "Memory"),
            ("BLOB_ENDPOINT", "http://127.0.0.1:10000/devstoreaccount1"),
            ("IDENTITY_ENDPOINT", "http://localhost:42356/msi/token"),
            ("IDENTITY_HEADER", "secret"),
            ("LOG_FORMAT", "JSON"),
            ("METRICS_ENABLED", "false"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(config.server.request_timeout_secs, 5);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(
            config.storage.endpoint.as_deref(),
            Some("http://127.0.0.1:10000/devstoreaccount1")
        );
        assert_eq!(
            config.identity.endpoint.as_deref(),
            Some("http://localhost:42356/msi/token")
        );
        assert_eq!(config.identity.identity_header.as_deref(), Some("secret"));
        assert_eq!(config.logging.format, "json");
        assert!(!config.observability.metrics);
    }

    #[test]
    fn test_empty_overrides_are_ignored() {
        let config = load(&[("PORT", ""), ("BLOB_ENDPOINT", "  ")]).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.endpoint, None);
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_zero_request_timeout_is_an_error() {
        let err = load(&[("REQUEST_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("REQUEST_TIMEOUT_SECS"));
    }

    #[test]
    fn test_invalid_metrics_flag_is_an_error() {
        assert!(load(&[("METRICS_ENABLED", "maybe")]).is_err());
    }
}
