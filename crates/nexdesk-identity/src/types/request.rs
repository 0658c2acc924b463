//! Inputs and outcomes of the credential operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::IdentityMetadata;

/// Default federated provider.
pub const DEFAULT_FEDERATED_PROVIDER: &str = "github";

/// Email and password pair.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Password sign-up with the metadata that seeds the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(rename = "data")]
    pub metadata: IdentityMetadata,
}

impl SignUpRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(email, password),
            metadata: IdentityMetadata::default(),
        }
    }

    /// Sets the profile seed.
    #[must_use]
    pub fn with_metadata(mut self, metadata: IdentityMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of a successful sign-up.
///
/// Whether a session is established immediately depends on the provider's
/// email confirmation policy. Both outcomes are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The provider established a session right away.
    SignedIn,
    /// The account must confirm its email before signing in.
    ConfirmationRequired,
}

/// Request to start a redirect-based federated sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedSignIn {
    /// Provider name, e.g. `github`.
    pub provider: String,
    /// Where the provider sends the browser back to.
    pub redirect_to: Option<Url>,
}

impl FederatedSignIn {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            redirect_to: None,
        }
    }

    /// Sets the redirect target.
    #[must_use]
    pub fn with_redirect_to(mut self, redirect_to: Url) -> Self {
        self.redirect_to = Some(redirect_to);
        self
    }
}

impl Default for FederatedSignIn {
    fn default() -> Self {
        Self::new(DEFAULT_FEDERATED_PROVIDER)
    }
}

/// Where to send the user to continue a federated sign-in.
///
/// Control leaves the process after this. The flow resumes through the
/// event stream once the callback is handed back to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedRedirect {
    pub url: Url,
}
