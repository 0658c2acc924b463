//! Durable per-user profile rows.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Identity;

/// Profile row maintained by this application, keyed by identity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub two_factor_enabled: Option<bool>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

impl Profile {
    /// Returns `first last`, or the username when no name is known.
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            self.username.clone()
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Insert shape for a profile created on first sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

impl NewProfile {
    /// Builds the insert row from identity metadata.
    ///
    /// The username falls back to the local part of the email address and
    /// names fall back to empty strings.
    pub fn from_identity(identity: &Identity) -> Self {
        let metadata = &identity.metadata;
        let username = metadata
            .username
            .as_deref()
            .filter(|username| !username.is_empty())
            .or_else(|| identity.email_local_part())
            .map(str::to_owned);

        Self {
            id: identity.id,
            email: identity.email.clone(),
            username,
            first_name: metadata.first_name.clone().unwrap_or_default(),
            last_name: metadata.last_name.clone().unwrap_or_default(),
        }
    }

    /// Converts the insert row into the stored row.
    pub fn into_profile(self, created_at: Timestamp) -> Profile {
        Profile {
            id: self.id,
            email: self.email,
            username: self.username,
            first_name: Some(self.first_name),
            last_name: Some(self.last_name),
            avatar_url: None,
            role: None,
            two_factor_enabled: None,
            created_at: Some(created_at),
            updated_at: Some(created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdentityMetadata;

    #[test]
    fn test_username_defaults_to_local_part() {
        let identity = Identity::new(Uuid::now_v7(), "a@b.com");
        let profile = NewProfile::from_identity(&identity);

        assert_eq!(profile.username.as_deref(), Some("a"));
        assert_eq!(profile.email.as_deref(), Some("a@b.com"));
        assert_eq!(profile.first_name, "");
        assert_eq!(profile.last_name, "");
    }

    #[test]
    fn test_metadata_wins_over_email() {
        let metadata = IdentityMetadata::default()
            .with_first_name("Ada")
            .with_last_name("Lovelace")
            .with_username("ada");
        let identity = Identity::new(Uuid::now_v7(), "countess@example.com").with_metadata(metadata);
        let profile = NewProfile::from_identity(&identity);

        assert_eq!(profile.username.as_deref(), Some("ada"));
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(profile.last_name, "Lovelace");
    }

    #[test]
    fn test_empty_username_falls_back() {
        let metadata = IdentityMetadata::default().with_username("");
        let identity = Identity::new(Uuid::now_v7(), "bob@example.com").with_metadata(metadata);
        let profile = NewProfile::from_identity(&identity);
        assert_eq!(profile.username.as_deref(), Some("bob"));
    }

    #[test]
    fn test_display_name() {
        let identity = Identity::new(Uuid::now_v7(), "a@b.com");
        let profile = NewProfile::from_identity(&identity).into_profile(Timestamp::now());
        assert_eq!(profile.display_name().as_deref(), Some("a"));

        let profile = Profile {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            ..profile
        };
        assert_eq!(profile.display_name().as_deref(), Some("Ada Lovelace"));
    }
}
