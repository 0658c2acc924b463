//! Authenticated user identity as issued by the auth provider.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated user as issued by the external auth provider.
///
/// Identities are never mutated by this crate. A refreshed session carries
/// a fresh copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider-issued user identifier.
    pub id: Uuid,
    /// Primary email address, if the provider knows one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Metadata supplied at sign-up or by a federated provider.
    #[serde(default, rename = "user_metadata")]
    pub metadata: IdentityMetadata,
}

impl Identity {
    /// Creates a new identity without metadata.
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: Some(email.into()),
            metadata: IdentityMetadata::default(),
        }
    }

    /// Sets the identity metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: IdentityMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the part of the email address before the `@`.
    pub fn email_local_part(&self) -> Option<&str> {
        let email = self.email.as_deref()?;
        let local = email.split('@').next().unwrap_or(email);
        (!local.is_empty()).then_some(local)
    }
}

/// Free-form metadata attached to an identity.
///
/// Only the fields this application reads are typed, everything else the
/// provider sends is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IdentityMetadata {
    /// Sets the first name.
    #[must_use]
    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    /// Sets the last name.
    #[must_use]
    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    /// Sets the username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.username.is_none()
            && self.extra.is_empty()
    }
}
