//! Runtime configuration loaded from the environment.
//!
//! A `.env` file in the working directory is honored outside of tests.

use std::path::PathBuf;

use ecomops_api::RetryPolicy;

use crate::is_https_endpoint;
use crate::poller::PollPolicy;

/// Backend used when `ECOMOPS_API_BASE` is unset.
pub const DEFAULT_API_BASE: &str = "https://ecomops-sarar20225.onrender.com";
/// Password recovery landing page used when `ECOMOPS_RESET_REDIRECT` is unset.
pub const DEFAULT_RESET_REDIRECT: &str =
    "https://sarar-git.github.io/ecomops_frontend/forgot-password.html";
/// Token cache file used when `ECOMOPS_TOKEN_FILE` is unset.
pub const DEFAULT_TOKEN_FILE: &str = ".ecomops-session.json";

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required variable is unset or blank.
    #[error("missing environment variable {0}")]
    MissingVar(String),
    /// Variable is set but unusable.
    #[error("invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings shared by the binary and its controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// REST backend base URL.
    pub api_base: String,
    /// Auth provider project URL.
    pub auth_url: Option<String>,
    /// Auth provider public (anon) key.
    pub auth_anon_key: Option<String>,
    /// Landing page linked from recovery emails.
    pub reset_redirect: String,
    /// Token cache location.
    pub token_file: PathBuf,
    /// Per-request HTTP timeout.
    pub http_timeout_ms: u64,
    /// Upload and rebuild progress polling.
    pub poll: PollPolicy,
}

impl AppConfig {
    /// Loads configuration from process environment (and `.env`).
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for malformed values.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for malformed values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        let api_base = read("ECOMOPS_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        require_https("ECOMOPS_API_BASE", &api_base)?;

        let auth_url = read("ECOMOPS_AUTH_URL");
        if let Some(url) = &auth_url {
            require_https("ECOMOPS_AUTH_URL", url)?;
        }

        let reset_redirect =
            read("ECOMOPS_RESET_REDIRECT").unwrap_or_else(|| DEFAULT_RESET_REDIRECT.to_string());
        require_https("ECOMOPS_RESET_REDIRECT", &reset_redirect)?;

        let defaults = PollPolicy::default();
        let poll = PollPolicy {
            interval_ms: parse_number(&read, "ECOMOPS_POLL_INTERVAL_MS", defaults.interval_ms)?,
            max_polls: parse_number(&read, "ECOMOPS_POLL_MAX", defaults.max_polls)?,
            retry: RetryPolicy {
                max_retries: parse_number(
                    &read,
                    "ECOMOPS_POLL_MAX_RETRIES",
                    defaults.retry.max_retries,
                )?,
                ..defaults.retry
            },
        };
        let http_timeout_ms = parse_number(&read, "ECOMOPS_HTTP_TIMEOUT_MS", 30_000)?;
        for (key, value) in [
            ("ECOMOPS_POLL_INTERVAL_MS", poll.interval_ms),
            ("ECOMOPS_HTTP_TIMEOUT_MS", http_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
        }

        Ok(Self {
            api_base,
            auth_url,
            auth_anon_key: read("ECOMOPS_AUTH_ANON_KEY"),
            reset_redirect,
            token_file: read("ECOMOPS_TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE)),
            http_timeout_ms,
            poll,
        })
    }

    /// Auth provider URL and key, both required by the real provider adapter.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingVar`] naming the first unset variable.
    pub fn auth_settings(&self) -> Result<(&str, &str), ConfigError> {
        let url = self
            .auth_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("ECOMOPS_AUTH_URL".to_string()))?;
        let key = self
            .auth_anon_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("ECOMOPS_AUTH_ANON_KEY".to_string()))?;
        Ok((url, key))
    }
}

fn require_https(key: &str, value: &str) -> Result<(), ConfigError> {
    if is_https_endpoint(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{value}' is not an https url"),
        ))
    }
}

fn parse_number<T, R>(read: &R, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    R: Fn(&str) -> Option<String>,
{
    match read(key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("'{raw}' is not a number"))
        }),
    }
}
