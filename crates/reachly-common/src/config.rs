//! Configuration for Reachly

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Tracking configuration (token signing, webhook secret, base URL)
    pub tracking: TrackingConfig,

    /// Outbound SMTP relay configuration
    pub smtp: Option<SmtpConfig>,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (PostgreSQL)
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Tracking configuration
///
/// Two distinct secrets protect two distinct trust boundaries: the signing
/// secret authenticates recipient-facing tracking tokens, the webhook
/// secret authenticates the provider-to-server webhook. They must not be
/// conflated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Secret for signing tracking tokens. Must be non-empty; startup
    /// fails otherwise rather than signing with an empty key.
    pub signing_secret: String,

    /// Shared secret for the provider webhook. When unset, the provider
    /// webhook rejects every call.
    pub webhook_secret: Option<String>,

    /// Public base URL for pixel/redirect links embedded in outbound mail
    pub public_base_url: String,

    /// Budget for the status-update step of the pixel/redirect handlers;
    /// a timed-out update is logged and dropped, never retried inline
    #[serde(default = "default_update_timeout_ms")]
    pub update_timeout_ms: u64,

    /// Optional replay window: tokens older than this are rejected.
    /// Absent means tokens never expire and `issued_at` is advisory.
    pub token_max_age_secs: Option<u64>,
}

fn default_update_timeout_ms() -> u64 {
    2000
}

/// Outbound SMTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay hostname
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Relay username
    pub username: Option<String>,

    /// Relay password
    pub password: Option<String>,

    /// Default From address when a message has none
    pub from_address: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Master switch
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Broad policy for general API traffic
    #[serde(default = "RatePolicyConfig::default_api")]
    pub default: RatePolicyConfig,

    /// Policy for outbound send actions
    #[serde(default = "RatePolicyConfig::default_send")]
    pub send: RatePolicyConfig,

    /// Strict policy for authentication attempts (counts only failures)
    #[serde(default = "RatePolicyConfig::default_auth")]
    pub auth: RatePolicyConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default: RatePolicyConfig::default_api(),
            send: RatePolicyConfig::default_send(),
            auth: RatePolicyConfig::default_auth(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A single named rate-limit policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatePolicyConfig {
    /// Window length in seconds
    pub window_secs: u64,

    /// Maximum requests per window
    pub max: u32,

    /// Do not count requests that ended in success (2xx)
    #[serde(default)]
    pub skip_successful: bool,

    /// Do not count requests that ended in failure (4xx/5xx)
    #[serde(default)]
    pub skip_failed: bool,
}

impl RatePolicyConfig {
    fn default_api() -> Self {
        Self {
            window_secs: 60,
            max: 120,
            skip_successful: false,
            skip_failed: false,
        }
    }

    fn default_send() -> Self {
        Self {
            window_secs: 60,
            max: 30,
            skip_successful: false,
            skip_failed: false,
        }
    }

    fn default_auth() -> Self {
        Self {
            window_secs: 900,
            max: 5,
            skip_successful: true,
            skip_failed: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
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

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/reachly/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }

    /// Validate invariants the rest of the system relies on.
    ///
    /// A missing or empty signing secret must fail here, at startup, rather
    /// than silently signing tokens with an empty key.
    pub fn validate(&self) -> crate::Result<()> {
        if self.tracking.signing_secret.trim().is_empty() {
            return Err(crate::Error::Config(
                "tracking.signing_secret must be set and non-empty".to_string(),
            ));
        }

        if self.tracking.public_base_url.trim().is_empty() {
            return Err(crate::Error::Config(
                "tracking.public_base_url must be set".to_string(),
            ));
        }

        if let Some(ref webhook_secret) = self.tracking.webhook_secret {
            if webhook_secret == &self.tracking.signing_secret {
                return Err(crate::Error::Config(
                    "tracking.webhook_secret must differ from tracking.signing_secret".to_string(),
                ));
            }
        }

        Ok(())
    }
}
