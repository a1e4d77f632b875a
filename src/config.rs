use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

/// Save Page Now API credentials.
///
/// Missing credentials are a fatal configuration error for the whole run,
/// reported once before any per-link attempt is made.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

/// Application configuration loaded from environment variables.
///
/// The settings *profile* (patterns, pacing, capture flags) lives in a TOML
/// file and is loaded separately; this covers credentials and paths.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the Markdown vault.
    pub vault_dir: PathBuf,
    /// Durable failure ledger location.
    pub ledger_path: PathBuf,
    /// Optional profile file; the built-in default profile is used when absent.
    pub profile_path: Option<PathBuf>,
    /// Profile to activate, overriding the file's own `active` selector.
    pub profile_name: Option<String>,

    pub access_key: String,
    pub secret_key: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            vault_dir: PathBuf::from(env_or_default("VAULT_DIR", ".")),
            ledger_path: PathBuf::from(env_or_default(
                "LEDGER_PATH",
                "./.vault-link-archiver/failed-archives.json",
            )),
            profile_path: optional_env("PROFILE_PATH").map(PathBuf::from),
            profile_name: optional_env("PROFILE_NAME"),
            access_key: required_env("SPN_ACCESS_KEY")?,
            secret_key: required_env("SPN_SECRET_KEY")?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "SPN_ACCESS_KEY".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.secret_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "SPN_SECRET_KEY".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.vault_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "VAULT_DIR".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}
