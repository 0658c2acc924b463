//! Shared HTTP client for the backend project.

use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::BackendConfig;
use crate::error::{ApiErrorBody, Error, Result};

/// Tracing target for raw backend requests.
pub const TRACING_TARGET: &str = "nexdesk_reqwest::client";

/// Header carrying the project key on every request.
const API_KEY_HEADER: &str = "apikey";

struct BackendClientInner {
    http: Client,
    config: BackendConfig,
}

impl std::fmt::Debug for BackendClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClientInner")
            .field("backend_url", &self.config.backend_url.as_str())
            .field("timeout", &self.config.effective_timeout())
            .finish_non_exhaustive()
    }
}

/// HTTP client bound to one backend project.
///
/// Cheap to clone. The auth client and the profile repository share one.
#[derive(Clone, Debug)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

impl BackendClient {
    /// Creates a client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: BackendConfig) -> Result<Self> {
        tracing::debug!(
            target: TRACING_TARGET,
            backend_url = %config.backend_url,
            timeout_ms = config.effective_timeout().as_millis(),
            "Creating backend client"
        );

        config.validate()?;

        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&config.anon_key)
            .map_err(|_| Error::Config("anon key is not a valid header value".into()))?;
        headers.insert(API_KEY_HEADER, api_key);

        let http = Client::builder()
            .timeout(config.effective_timeout())
            .user_agent(config.effective_user_agent())
            .default_headers(headers)
            .build()?;

        let inner = BackendClientInner { http, config };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.inner.config
    }

    /// Resolves `path` against the project URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.inner.config.backend_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(path.trim_start_matches('/'))?)
    }

    /// Starts a request, authorized with `bearer` or with the project key.
    pub(crate) fn request(&self, method: Method, url: Url, bearer: Option<&str>) -> RequestBuilder {
        let token = bearer.unwrap_or(&self.inner.config.anon_key);
        self.inner
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Sends a request and decodes a JSON response.
    pub(crate) async fn send_json<T>(&self, request: RequestBuilder) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }

    /// Sends a request, turning non-success statuses into errors.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let started_at = Instant::now();
        let response = request.send().await?;
        let status = response.status();

        tracing::debug!(
            target: TRACING_TARGET,
            url = %response.url().path(),
            status = status.as_u16(),
            elapsed_ms = started_at.elapsed().as_millis(),
            "Backend request completed"
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiErrorBody::into_error(&body, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> BackendClient {
        BackendClient::new(BackendConfig::new(Url::parse(url).unwrap(), "anon")).unwrap()
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let client = client("https://project.example.com");
        let url = client.endpoint("/auth/v1/token").unwrap();
        assert_eq!(url.as_str(), "https://project.example.com/auth/v1/token");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("https://example.com/project");
        let url = client.endpoint("rest/v1/profiles").unwrap();
        assert_eq!(url.as_str(), "https://example.com/project/rest/v1/profiles");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = BackendConfig::new(Url::parse("https://example.com").unwrap(), "");
        assert!(BackendClient::new(config).is_err());
    }
}
