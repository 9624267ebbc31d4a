//! Client configuration.
//!
//! Defaults point at the public ReBase server; every value can be
//! overridden from the environment with `ClientConfig::from_env`.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://projetorastreamento.com.br:3030";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_BASE_URL: &str = "REBASE_URL";
pub const ENV_USER_EMAIL: &str = "REBASE_USER_EMAIL";
pub const ENV_USER_TOKEN: &str = "REBASE_USER_TOKEN";
pub const ENV_TIMEOUT_SECS: &str = "REBASE_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_email: Option<String>,
    pub user_token: Option<String>,
    /// Applied to each whole request by `UreqTransport`.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_email: None,
            user_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, user_email: &str, user_token: &str) -> Self {
        self.user_email = Some(user_email.to_string());
        self.user_token = Some(user_token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the process environment; unset or unparseable values keep
    /// their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup(ENV_BASE_URL).unwrap_or(defaults.base_url),
            user_email: lookup(ENV_USER_EMAIL),
            user_token: lookup(ENV_USER_TOKEN),
            timeout: lookup(ENV_TIMEOUT_SECS)
                .and_then(|secs| secs.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}
