//! Provider-issued sessions.

use std::fmt;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use super::Identity;

/// Margin subtracted from the expiry so a token is refreshed before the
/// provider starts rejecting it.
pub const EXPIRY_MARGIN: SignedDuration = SignedDuration::from_secs(10);

/// A token plus the identity it authenticates.
///
/// Sessions are values: whenever the provider emits a new one, the old one
/// is replaced wholesale.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    #[serde(rename = "user")]
    pub identity: Identity,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

impl Session {
    /// Creates a bearer session without refresh token or expiry.
    pub fn new(access_token: impl Into<String>, identity: Identity) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
            identity,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the expiry.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns true if the access token is expired, or about to be.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Timestamp::now())
    }

    /// Returns true if the access token is expired at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at.duration_since(now) <= EXPIRY_MARGIN,
            None => false,
        }
    }

    /// Returns the value for an `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("identity", &self.identity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn identity() -> Identity {
        Identity::new(Uuid::now_v7(), "a@b.com")
    }

    #[test]
    fn test_expiry() {
        let now = Timestamp::now();
        let session = Session::new("token", identity());
        assert!(!session.is_expired_at(now));

        let session = session.with_expires_at(now + SignedDuration::from_secs(3600));
        assert!(!session.is_expired_at(now));

        let session = session.with_expires_at(now + SignedDuration::from_secs(5));
        assert!(session.is_expired_at(now));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let session = Session::new("secret-access", identity()).with_refresh_token("secret-refresh");
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_authorization_header() {
        let session = Session::new("abc", identity());
        assert_eq!(session.authorization(), "Bearer abc");
    }
}
