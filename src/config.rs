//! Configuration loading and types for gcs-store.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every field has a default, so an empty file (or no
//! file at all, see [`Config::default`]) yields a working client that
//! talks to the public Cloud Storage JSON API.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Storage client settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Transport type: `http` or `memory`.
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Base URL for JSON API calls (metadata, listing).
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Base URL for media uploads.
    #[serde(default = "default_upload_base")]
    pub upload_base: String,

    /// OAuth2 bearer token.  Falls back to `GOOGLE_OAUTH_ACCESS_TOKEN`.
    #[serde(default)]
    pub access_token: String,

    /// Timeout in seconds for metadata requests (0 = none).  Uploads are
    /// bounded only by the caller's context deadline.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            access_token: String::new(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
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

// -- Defaults ----------------------------------------------------------------

fn default_transport() -> String {
    "http".to_string()
}

fn default_api_base() -> String {
    "https://storage.googleapis.com/storage/v1".to_string()
}

fn default_upload_base() -> String {
    "https://storage.googleapis.com/upload/storage/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("gcs-store/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
