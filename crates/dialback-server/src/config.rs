//! Server configuration loading from file and environment variables.

use dialback_core::{normalize_domain, DialbackConfig, DomainError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Dialback policy.
    #[serde(default)]
    pub dialback: DialbackConfig,

    /// Hosted domains, keyed by domain name.
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConfig>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Client authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Settings for one hosted domain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    /// Shared dialback secret. A random one is generated at startup when
    /// absent, which means keys do not survive a restart.
    #[serde(default)]
    pub secret: Option<Secret>,
}

/// A dialback secret. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "dialback_core=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Client authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Offer SASL ANONYMOUS with random usernames.
    #[serde(default)]
    pub allow_anonymous: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A `[hosts]` entry is not a valid domain name.
    #[error("invalid hosted domain '{domain}': {source}")]
    InvalidHost {
        domain: String,
        #[source]
        source: DomainError,
    },

    /// Two `[hosts]` entries normalize to the same domain.
    #[error("hosted domain '{0}' is configured more than once")]
    DuplicateHost(String),
}

impl Config {
    /// Normalized hosted domains mapped to their secrets.
    ///
    /// Hosts configured without a secret get a random one.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a domain does not normalize or two entries
    /// collide after normalization.
    pub fn host_secrets(&self) -> Result<HashMap<String, String>, ConfigError> {
        let mut secrets = HashMap::with_capacity(self.hosts.len());
        for (raw, host) in &self.hosts {
            let domain = normalize_domain(raw).map_err(|source| ConfigError::InvalidHost {
                domain: raw.clone(),
                source,
            })?;
            let secret = match &host.secret {
                Some(secret) => secret.expose().to_string(),
                None => {
                    tracing::info!(%domain, "no dialback secret configured, generating one");
                    Uuid::new_v4().simple().to_string()
                }
            };
            if secrets.insert(domain.clone(), secret).is_some() {
                return Err(ConfigError::DuplicateHost(domain));
            }
        }
        Ok(secrets)
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `DIALBACK_REQUIRE_ENCRYPTION` overrides `dialback.require_encryption`
/// - `DIALBACK_STRICT` overrides `dialback.strict_interop`
/// - `DIALBACK_LOG_LEVEL` overrides `logging.level`
/// - `DIALBACK_LOG_JSON` overrides `logging.json`
/// - `DIALBACK_ALLOW_ANONYMOUS` overrides `auth.allow_anonymous`
///
/// Boolean overrides accept "true" or "1".
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Config file used when neither an argument nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "dialback.toml";

/// Where the config file path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Argument,
    Environment,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Argument => "argument",
            Self::Environment => "environment",
            Self::Default => "default",
        }
    }
}

/// Picks the config file: `arg`, then `DIALBACK_CONFIG_PATH`, then
/// [`DEFAULT_CONFIG_PATH`]. Blank values are skipped.
pub fn config_path(
    arg: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> (String, ConfigSource) {
    let present = |path: &String| !path.trim().is_empty();
    if let Some(path) = arg.filter(present) {
        return (path, ConfigSource::Argument);
    }
    if let Some(path) = lookup("DIALBACK_CONFIG_PATH").filter(present) {
        return (path, ConfigSource::Environment);
    }
    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}

/// Applies `DIALBACK_*` overrides read through `lookup`.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let flag = |key: &str| lookup(key).map(|v| v == "true" || v == "1");

    if let Some(v) = flag("DIALBACK_REQUIRE_ENCRYPTION") {
        config.dialback.require_encryption = v;
    }
    if let Some(v) = flag("DIALBACK_STRICT") {
        config.dialback.strict_interop = v;
    }
    if let Some(level) = lookup("DIALBACK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(v) = flag("DIALBACK_LOG_JSON") {
        config.logging.json = v;
    }
    if let Some(v) = flag("DIALBACK_ALLOW_ANONYMOUS") {
        config.auth.allow_anonymous = v;
    }
}
