//! Backend connection configuration.

use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use nexdesk_identity::types::DEFAULT_FEDERATED_PROVIDER;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Backend request timeout applied when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the hosted auth and row APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct BackendConfig {
    /// Base URL of the backend project
    #[cfg_attr(feature = "config", arg(long = "backend-url", env = "BACKEND_URL"))]
    pub backend_url: Url,

    /// Public (anonymous) API key of the backend project
    #[cfg_attr(
        feature = "config",
        arg(long = "backend-anon-key", env = "BACKEND_ANON_KEY", hide_env_values = true)
    )]
    pub anon_key: String,

    /// Seconds before a backend request is abandoned
    #[cfg_attr(
        feature = "config",
        arg(long = "http-timeout", env = "HTTP_TIMEOUT", default_value = "30")
    )]
    #[serde(default = "default_timeout_secs")]
    pub http_timeout: u64,

    /// Overrides the User-Agent sent to the backend
    #[cfg_attr(
        feature = "config",
        arg(long = "http-user-agent", env = "HTTP_USER_AGENT")
    )]
    #[serde(default)]
    pub user_agent: Option<String>,

    /// File the session is persisted to between runs
    #[cfg_attr(feature = "config", arg(long = "session-file", env = "SESSION_FILE"))]
    #[serde(default)]
    pub session_file: Option<PathBuf>,

    /// Where the browser is sent back to after sign-up confirmation or
    /// federated sign-in
    #[cfg_attr(feature = "config", arg(long = "redirect-to", env = "AUTH_REDIRECT_TO"))]
    #[serde(default)]
    pub redirect_to: Option<Url>,

    /// Federated identity provider used by default
    #[cfg_attr(
        feature = "config",
        arg(
            long = "federated-provider",
            env = "AUTH_FEDERATED_PROVIDER",
            default_value = DEFAULT_FEDERATED_PROVIDER
        )
    )]
    #[serde(default = "default_federated_provider")]
    pub federated_provider: String,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_federated_provider() -> String {
    DEFAULT_FEDERATED_PROVIDER.to_owned()
}

impl BackendConfig {
    /// Creates a configuration with defaults for everything but the
    /// project URL and key.
    pub fn new(backend_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            backend_url,
            anon_key: anon_key.into(),
            http_timeout: DEFAULT_TIMEOUT_SECS,
            user_agent: None,
            session_file: None,
            redirect_to: None,
            federated_provider: default_federated_provider(),
        }
    }

    /// Persists the session to `path`.
    #[must_use]
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// Sets the redirect target for confirmation and federated flows.
    #[must_use]
    pub fn with_redirect_to(mut self, redirect_to: Url) -> Self {
        self.redirect_to = Some(redirect_to);
        self
    }

    /// Sets the HTTP timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.http_timeout = timeout_secs;
        self
    }

    /// Timeout for backend requests. Zero falls back to the default.
    pub fn effective_timeout(&self) -> Duration {
        if self.http_timeout == 0 {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.http_timeout)
        }
    }

    /// User agent for backend requests, `nexdesk/<version>` unless overridden.
    pub fn effective_user_agent(&self) -> String {
        self.user_agent
            .clone()
            .filter(|user_agent| !user_agent.is_empty())
            .unwrap_or_else(Self::default_user_agent)
    }

    fn default_user_agent() -> String {
        format!("nexdesk/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Rejects URLs and keys the backend client cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.backend_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "backend url must use http or https, got '{}'",
                self.backend_url.scheme()
            )));
        }
        if self.backend_url.cannot_be_a_base() {
            return Err(Error::Config("backend url cannot be a base url".into()));
        }
        if self.anon_key.trim().is_empty() {
            return Err(Error::Config("anon key cannot be empty".into()));
        }
        if self.federated_provider.trim().is_empty() {
            return Err(Error::Config("federated provider cannot be empty".into()));
        }
        Ok(())
    }
}
