//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `WRPGW_LISTEN`, `WRPGW_XMIDT_URL`,
//!    `WRPGW_ACQUIRER_BASIC`
//! 2. **Config file**: path via `--config <path>`, or `wrp-gateway.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:6100"
//! max_body_size = 1048576
//!
//! [logging]
//! level = "info"
//!
//! [xmidt]
//! url = "http://xmidt.example.com:6000"
//! wrp_source = "dns:wrp-gateway.example.com"
//! request_timeout = "40s"
//! retries = 2
//! retry_interval = "2s"
//! supported_services = ["config"]
//!
//! # Either a fixed credential...
//! [acquirer]
//! basic = "Basic dXNlcjpwYXNz"
//!
//! # ...or a remote bearer token endpoint (wins when both are set)
//! [acquirer.remote]
//! auth_url = "https://auth.example.com/token"
//! timeout = "10s"
//! buffer = "1m"
//! request_headers = { "X-Client-Id" = "wrp-gateway" }
//!
//! [[auth.keys]]
//! key = "inbound-secret"
//! partner_ids = ["comcast"]
//!
//! [webhook]
//! max_ttl = "5m"
//! jitter = "10s"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "wrp-gateway.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub xmidt: XmidtConfig,
    #[serde(default)]
    pub acquirer: AcquirerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:6100`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Largest accepted request body in bytes (default 1 MiB).
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Device cluster (XMiDT) settings shared by the stat and translation paths.
#[derive(Debug, Clone, Deserialize)]
pub struct XmidtConfig {
    /// Cluster base URL, without trailing slash.
    #[serde(default = "default_xmidt_url")]
    pub url: String,
    /// WRP source prefix; the service name is appended.
    #[serde(default = "default_wrp_source")]
    pub wrp_source: String,
    /// Deadline for one outbound attempt (default 40s).
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Overall reqwest client timeout (default 2m).
    #[serde(default = "default_client_timeout", with = "humantime_serde")]
    pub client_timeout: Duration,
    /// Extra attempts after an unreachable-upstream failure (default 0).
    #[serde(default)]
    pub retries: u32,
    /// Pause between attempts (default 2s).
    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,
    /// Services the translation endpoint accepts (default `["config"]`).
    #[serde(default = "default_supported_services")]
    pub supported_services: Vec<String>,
    /// Qualify the WRP source with the caller's first partner id.
    #[serde(default)]
    pub partner_source: bool,
}

/// Outbound `Authorization` source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcquirerConfig {
    /// Fixed credential sent verbatim.
    pub basic: Option<String>,
    /// Remote bearer token endpoint.
    pub remote: Option<RemoteAcquirerConfig>,
}

/// Remote bearer-token endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAcquirerConfig {
    pub auth_url: String,
    /// HTTP timeout for the token request (default 10s).
    #[serde(default = "default_acquirer_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Refresh this long before the token expires (default 1m).
    #[serde(default = "default_acquirer_buffer", with = "humantime_serde")]
    pub buffer: Duration,
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    /// JSON field holding the token (default `serviceAccessToken`).
    #[serde(default = "default_token_field")]
    pub token_field: String,
    /// JSON field holding the expiry (default `expires_in`).
    #[serde(default = "default_expiration_field")]
    pub expiration_field: String,
    #[serde(default)]
    pub expiration: ExpirationFormat,
}

/// How the expiry field is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpirationFormat {
    /// Seconds from now.
    #[default]
    Relative,
    /// Unix timestamp in seconds.
    Absolute,
}

/// Inbound authentication.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub keys: Vec<ApiKeyConfig>,
}

/// One accepted inbound bearer key.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    pub key: String,
    #[serde(default)]
    pub partner_ids: Vec<String>,
}

/// Webhook registration TTL limits.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WebhookConfig {
    /// Longest registration lifetime (default 5m).
    #[serde(default = "default_max_ttl", with = "humantime_serde")]
    pub max_ttl: Duration,
    /// Slack allowed on `until` beyond `now + max_ttl` (default 10s).
    #[serde(default = "default_jitter", with = "humantime_serde")]
    pub jitter: Duration,
}

fn default_listen() -> String {
    "0.0.0.0:6100".to_string()
}
fn default_max_body_size() -> usize {
    1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_xmidt_url() -> String {
    "http://localhost:6000".to_string()
}
fn default_wrp_source() -> String {
    "dns:wrp-gateway".to_string()
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(40)
}
fn default_client_timeout() -> Duration {
    Duration::from_secs(120)
}
fn default_retry_interval() -> Duration {
    Duration::from_secs(2)
}
fn default_supported_services() -> Vec<String> {
    vec!["config".to_string()]
}
fn default_acquirer_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_acquirer_buffer() -> Duration {
    Duration::from_secs(60)
}
fn default_token_field() -> String {
    "serviceAccessToken".to_string()
}
fn default_expiration_field() -> String {
    "expires_in".to_string()
}
fn default_max_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}
fn default_jitter() -> Duration {
    Duration::from_secs(10)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for XmidtConfig {
    fn default() -> Self {
        Self {
            url: default_xmidt_url(),
            wrp_source: default_wrp_source(),
            request_timeout: default_request_timeout(),
            client_timeout: default_client_timeout(),
            retries: 0,
            retry_interval: default_retry_interval(),
            supported_services: default_supported_services(),
            partner_source: false,
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_ttl: default_max_ttl(),
            jitter: default_jitter(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `wrp-gateway.toml`
    /// in the current directory is used when present.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        if let Ok(listen) = std::env::var("WRPGW_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(url) = std::env::var("WRPGW_XMIDT_URL") {
            config.xmidt.url = url;
        }
        if let Ok(basic) = std::env::var("WRPGW_ACQUIRER_BASIC") {
            config.acquirer.basic = Some(basic);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.xmidt.url.trim().is_empty() {
            return Err(ConfigError::Invalid("xmidt.url is required".into()));
        }
        if self.xmidt.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "xmidt.request_timeout must be positive".into(),
            ));
        }
        match (&self.acquirer.remote, &self.acquirer.basic) {
            (Some(remote), _) if remote.auth_url.trim().is_empty() => {
                return Err(ConfigError::Invalid("acquirer.remote.auth_url is required".into()));
            }
            (None, Some(basic)) if basic.trim().is_empty() => {
                return Err(ConfigError::Invalid("acquirer.basic must not be empty".into()));
            }
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "set acquirer.basic or [acquirer.remote]".into(),
                ));
            }
            _ => {}
        }
        if self.webhook.max_ttl.is_zero() {
            return Err(ConfigError::Invalid("webhook.max_ttl must be positive".into()));
        }
        if self
            .auth
            .keys
            .iter()
            .any(|k| k.key.trim().is_empty())
        {
            return Err(ConfigError::Invalid("auth.keys entries need a key".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_basic() -> Config {
        let mut config = Config::default();
        config.acquirer.basic = Some("Basic Z3c6Z3c=".into());
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("", "inline").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:6100");
        assert_eq!(config.xmidt.request_timeout, Duration::from_secs(40));
        assert_eq!(config.xmidt.supported_services, vec!["config".to_string()]);
        assert_eq!(config.webhook.max_ttl, Duration::from_secs(300));
        assert!(config.acquirer.basic.is_none());
        assert!(config.acquirer.remote.is_none());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml(
            r#"
            [xmidt]
            url = "http://xmidt:6000"
            request_timeout = "5s"
            retries = 3
            retry_interval = "250ms"
            supported_services = ["config", "iot"]

            [acquirer.remote]
            auth_url = "http://auth/token"
            buffer = "30s"
            expiration = "absolute"
            request_headers = { "X-Client-Id" = "gw" }

            [[auth.keys]]
            key = "k1"
            partner_ids = ["comcast"]

            [webhook]
            max_ttl = "10m"
            "#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.xmidt.request_timeout, Duration::from_secs(5));
        assert_eq!(config.xmidt.retries, 3);
        assert_eq!(config.xmidt.retry_interval, Duration::from_millis(250));
        let remote = config.acquirer.remote.unwrap();
        assert_eq!(remote.buffer, Duration::from_secs(30));
        assert_eq!(remote.expiration, ExpirationFormat::Absolute);
        assert_eq!(remote.token_field, "serviceAccessToken");
        assert_eq!(remote.request_headers["X-Client-Id"], "gw");
        assert_eq!(config.auth.keys[0].partner_ids, vec!["comcast".to_string()]);
        assert_eq!(config.webhook.max_ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_parse_error_names_path() {
        let err = Config::from_toml("[xmidt]\nretries = \"many\"", "gw.toml").unwrap_err();
        assert!(err.to_string().contains("gw.toml"));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = with_basic();
        assert!(config.validate().is_ok());
        config.webhook.max_ttl = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_acquirer() {
        let mut config = with_basic();
        config.acquirer.basic = Some("  ".into());
        assert!(config.validate().is_err());

        config.acquirer.remote = Some(RemoteAcquirerConfig {
            auth_url: String::new(),
            timeout: Duration::from_secs(1),
            buffer: Duration::from_secs(1),
            request_headers: HashMap::new(),
            token_field: "t".into(),
            expiration_field: "e".into(),
            expiration: ExpirationFormat::Relative,
        });
        assert!(config.validate().is_err());

        if let Some(remote) = config.acquirer.remote.as_mut() {
            remote.auth_url = "http://auth/token".into();
        }
        assert!(config.validate().is_ok());
    }
}
