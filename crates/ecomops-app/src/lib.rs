#![warn(missing_docs)]
//! # ecomops-app
//!
//! ## Purpose
//! Orchestrates auth, backend access, rendering and page state for ecomops.
//!
//! ## Responsibilities
//! - Bootstrap page sessions and leave for login at most once per page.
//! - Load dashboard widgets concurrently, isolating failures per widget.
//! - Drive the signup, login, password, upload and rebuild forms.
//! - Poll long-running jobs with bounded, cancellable backoff.
//! - Provide the real HTTP, provider and token-file adapters plus config.
//!
//! ## Data flow
//! [`AppConfig`] -> adapters -> [`AppServices`] -> [`PageController`] ->
//! backend responses -> renderer fragments -> [`ecomops_ui::PageView`].
//!
//! ## Ownership and lifetimes
//! A [`PageController`] borrows its view for one page load and owns the
//! page's session context. Services are cheap clones over shared adapters.
//!
//! ## Error model
//! Controllers turn failures into view effects (inline status, alert,
//! redirect) per failure class. Wiring and command failures surface as
//! [`AppError`].
//!
//! ## Security and privacy notes
//! - Every endpoint must be HTTPS.
//! - Tokens travel only in `Authorization` headers and the token cache.
//! - [`redact_sensitive`] strips token and credential values from strings
//!   before they are logged.

pub mod config;
pub mod controller;
pub mod poller;
pub mod provider;
pub mod store;
pub mod transport;

use ecomops_api::ApiError;
use ecomops_auth::AuthError;
use ecomops_core::CoreError;
use thiserror::Error;
use url::Url;

pub use config::{AppConfig, ConfigError};
pub use controller::{
    ACCESS_DENIED, AppServices, LoadOutcome, PageController, PageOpen, UploadOutcome,
};
pub use poller::{
    CancellationToken, PollOutcome, PollPolicy, PollStep, ProgressPoller, RecordingSleeper,
    Sleeper, ThreadSleeper,
};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("ECOMOPS_VERSION");

const SENSITIVE_KEYS: [&str; 7] = [
    "access_token",
    "refresh_token",
    "password",
    "authorization",
    "apikey",
    "bearer",
    "token",
];

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Returns `true` when endpoint URL is HTTPS.
pub fn is_https_endpoint(endpoint: &str) -> bool {
    Url::parse(endpoint)
        .map(|url| url.scheme() == "https")
        .unwrap_or(false)
}

/// Redacts values that follow secret markers in log-safe output.
///
/// The text after a marker and its separators (`=`, `:`, spaces, quotes)
/// up to the next delimiter is replaced. A `Bearer`/`Basic` scheme word
/// is redacted together with the credential after it.
pub fn redact_sensitive(input: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;

    while cursor < input.len() {
        let next = SENSITIVE_KEYS
            .iter()
            .filter_map(|key| lower[cursor..].find(key).map(|at| (cursor + at, key.len())))
            .min_by_key(|(at, len)| (*at, usize::MAX - len));
        let Some((at, len)) = next else {
            output.push_str(&input[cursor..]);
            break;
        };

        let key_end = at + len;
        output.push_str(&input[cursor..key_end]);
        let separators = input[key_end..]
            .find(|c: char| !matches!(c, '=' | ':' | ' ' | '"' | '\''))
            .unwrap_or(input.len() - key_end);
        output.push_str(&input[key_end..key_end + separators]);

        let value_start = key_end + separators;
        let mut value_end = value_start + value_len(&input[value_start..]);
        let word = &input[value_start..value_end];
        if word.eq_ignore_ascii_case("bearer") || word.eq_ignore_ascii_case("basic") {
            let gap = input[value_end..]
                .find(|c: char| c != ' ')
                .unwrap_or(input.len() - value_end);
            value_end += gap;
            value_end += value_len(&input[value_end..]);
        }
        if value_end > value_start {
            output.push_str("<redacted>");
        }
        cursor = value_end;
    }
    output
}

fn value_len(rest: &str) -> usize {
    rest.find(|c: char| c.is_whitespace() || matches!(c, '&' | ',' | '"' | '\'' | ';' | '}'))
        .unwrap_or(rest.len())
}

/// Extracts the access and refresh tokens from a recovery link fragment.
pub fn recovery_tokens_from_link(link: &str) -> Option<(String, String)> {
    let url = Url::parse(link).ok()?;
    let fragment = url.fragment()?;
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(fragment.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let find = |name: &str| {
        pairs
            .iter()
            .find(|(key, value)| key == name && !value.is_empty())
            .map(|(_, value)| value.clone())
    };
    Some((find("access_token")?, find("refresh_token")?))
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// Auth subsystem error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    /// Backend client error.
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    /// Core model error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    /// Local file error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Command-line misuse.
    #[error("usage: {0}")]
    Usage(String),
    /// Command ran but did not succeed.
    #[error("{0}")]
    Failed(String),
}
