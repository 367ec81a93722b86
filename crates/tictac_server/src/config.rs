//! Server configuration.

use crate::session::SessionSettings;
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Longest accepted device token lifetime (100 years).
pub const MAX_TOKEN_TTL_DAYS: i64 = 36_500;

/// Environment variable that overrides the signing secret.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

/// HMAC key for device identity tokens.
///
/// Never printed. `Debug` is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningSecret(String);

impl SigningSecret {
    /// Wraps a secret, rejecting empty values.
    #[track_caller]
    pub fn new(secret: impl Into<String>) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(ConfigError::new("Signing secret must not be empty".to_string()));
        }
        Ok(Self(secret))
    }

    /// Raw key bytes.
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Configuration for the match server.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    port: u16,

    /// Match ticks per second.
    #[serde(default = "default_tick_rate")]
    tick_rate: u32,

    /// Ticks a finished match lingers before disposal.
    #[serde(default = "default_linger_ticks")]
    linger_ticks: u64,

    /// Device token lifetime in days.
    #[serde(default = "default_token_ttl_days")]
    token_ttl_days: i64,

    /// Upper bound on matches returned by a matchmaking lookup.
    #[serde(default = "default_list_limit")]
    list_limit: usize,

    /// Token signing secret. Required.
    #[serde(default)]
    #[getter(skip)]
    jwt_secret: Option<SigningSecret>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7350
}

fn default_tick_rate() -> u32 {
    1
}

fn default_linger_ticks() -> u64 {
    5
}

fn default_token_ttl_days() -> i64 {
    30
}

fn default_list_limit() -> usize {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tick_rate: default_tick_rate(),
            linger_ticks: default_linger_ticks(),
            token_ttl_days: default_token_ttl_days(),
            list_limit: default_list_limit(),
            jwt_secret: None,
        }
    }
}

impl ServerConfig {
    /// Parses configuration from TOML text. Does not validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))
    }

    /// Loads configuration from a TOML file. Does not validate.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&content)
    }

    /// Loads the optional file, applies the `JWT_SECRET` override, and
    /// validates.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_secret_override(std::env::var(JWT_SECRET_ENV).ok())?;
        config.validate()?;
        info!(host = %config.host, port = config.port, "Config loaded");
        Ok(config)
    }

    /// Replaces the signing secret when `secret` is set.
    pub fn with_secret_override(mut self, secret: Option<String>) -> Result<Self, ConfigError> {
        if let Some(secret) = secret {
            debug!("Signing secret taken from environment");
            self.jwt_secret = Some(SigningSecret::new(secret)?);
        }
        Ok(self)
    }

    /// Overrides the bind address.
    pub fn with_bind(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    /// Checks every field. A missing or empty secret is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signing_secret()?;
        if self.tick_rate == 0 {
            return Err(ConfigError::new("tick_rate must be at least 1".to_string()));
        }
        if self.token_ttl_days <= 0 || self.token_ttl_days > MAX_TOKEN_TTL_DAYS {
            return Err(ConfigError::new(format!(
                "token_ttl_days must be between 1 and {}",
                MAX_TOKEN_TTL_DAYS
            )));
        }
        if self.list_limit == 0 {
            warn!("list_limit is 0, matchmaking will always create matches");
        }
        Ok(())
    }

    /// The signing secret, or an error when unset or empty.
    pub fn signing_secret(&self) -> Result<&SigningSecret, ConfigError> {
        match &self.jwt_secret {
            Some(secret) if !secret.0.trim().is_empty() => Ok(secret),
            Some(_) => Err(ConfigError::new("jwt_secret must not be empty".to_string())),
            None => Err(ConfigError::new(format!(
                "jwt_secret is not configured; set it in the config file or {}",
                JWT_SECRET_ENV
            ))),
        }
    }

    /// Session tunables derived from this configuration.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            tick_rate: self.tick_rate,
            linger_ticks: self.linger_ticks,
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_secret_are_fatal() {
        let config = ServerConfig::default();
        assert_eq!(config.port(), &7350);
        assert_eq!(config.list_limit(), &10);
        let err = config.validate().unwrap_err();
        assert!(err.message.contains("jwt_secret"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(SigningSecret::new("  ").is_err());
        let config = ServerConfig::from_toml_str("jwt_secret = \"\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_values_and_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9000\ntick_rate = 2\njwt_secret = \"from-file\"").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port(), &9000);
        assert_eq!(config.session_settings().tick_rate, 2);
        assert_eq!(config.signing_secret().unwrap().expose(), b"from-file");

        let config = config
            .with_secret_override(Some("from-env".to_string()))
            .unwrap();
        assert_eq!(config.signing_secret().unwrap().expose(), b"from-env");
        config.validate().unwrap();
    }

    #[test]
    fn test_token_ttl_bounds() {
        let config =
            ServerConfig::from_toml_str("jwt_secret = \"s\"\ntoken_ttl_days = 100000000").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.message.contains("token_ttl_days"));

        let config = ServerConfig::from_toml_str("jwt_secret = \"s\"\ntoken_ttl_days = 0").unwrap();
        assert!(config.validate().is_err());

        let config = ServerConfig::from_toml_str("jwt_secret = \"s\"\ntoken_ttl_days = 36500").unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = SigningSecret::new("hunter2").unwrap();
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }

    #[test]
    fn test_error_records_location() {
        let err = ConfigError::new("boom".to_string());
        assert!(err.file.ends_with("config.rs"));
    }
}
