//! Profile rows over the hosted row API.

use nexdesk_identity::{AuthError, NewProfile, Profile, ProfileRepository, Result};
use reqwest::Method;
use uuid::Uuid;

use crate::auth::ReqwestAuthClient;
use crate::client::BackendClient;

/// Tracing target for profile row operations.
pub const TRACING_TARGET: &str = "nexdesk_reqwest::profiles";

const PROFILES_PATH: &str = "rest/v1/profiles";

/// [`ProfileRepository`] over `/rest/v1/profiles`.
///
/// Requests are authorized with the signed-in user's access token when an
/// auth client is attached, so row-level security applies, and with the
/// project key otherwise.
#[derive(Clone, Debug)]
pub struct ReqwestProfileRepository {
    backend: BackendClient,
    auth: Option<ReqwestAuthClient>,
}

impl ReqwestProfileRepository {
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            auth: None,
        }
    }

    /// Authorizes requests as the auth client's current user.
    #[must_use]
    pub fn with_auth(mut self, auth: ReqwestAuthClient) -> Self {
        self.auth = Some(auth);
        self
    }

    async fn bearer(&self) -> Option<String> {
        match &self.auth {
            Some(auth) => auth.access_token().await,
            None => None,
        }
    }
}

#[async_trait::async_trait]
impl ProfileRepository for ReqwestProfileRepository {
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        let mut url = self.backend.endpoint(PROFILES_PATH)?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{id}"))
            .append_pair("select", "*");

        let bearer = self.bearer().await;
        let request = self.backend.request(Method::GET, url, bearer.as_deref());
        let rows: Vec<Profile> = self.backend.send_json(request).await?;

        tracing::trace!(
            target: TRACING_TARGET,
            user_id = %id,
            found = !rows.is_empty(),
            "Profile lookup"
        );

        Ok(rows.into_iter().next())
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile> {
        let url = self.backend.endpoint(PROFILES_PATH)?;
        let bearer = self.bearer().await;
        let request = self
            .backend
            .request(Method::POST, url, bearer.as_deref())
            .header("Prefer", "return=representation")
            .json(profile);

        let rows: Vec<Profile> = self.backend.send_json(request).await?;
        let inserted = rows
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::serialization("insert returned no row"))?;

        tracing::debug!(
            target: TRACING_TARGET,
            user_id = %inserted.id,
            "Profile row inserted"
        );

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use nexdesk_identity::Identity;
    use url::Url;

    use super::*;
    use crate::config::BackendConfig;

    #[test]
    fn test_profile_row_deserializes() {
        let body = r#"[{
            "id": "0190a1b2-0000-7000-8000-000000000001",
            "email": "a@b.com",
            "username": "a",
            "first_name": "",
            "last_name": "",
            "avatar_url": null,
            "role": "user",
            "two_factor_enabled": false,
            "created_at": "2024-05-01T12:00:00.123456+00:00",
            "updated_at": "2024-05-01T12:00:00.123456+00:00"
        }]"#;

        let rows: Vec<Profile> = serde_json::from_str(body).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].username.as_deref(), Some("a"));
        assert!(rows[0].created_at.is_some());
    }

    #[test]
    fn test_insert_body() {
        let identity = Identity::new(Uuid::now_v7(), "jane@example.com");
        let body = serde_json::to_value(NewProfile::from_identity(&identity)).unwrap();
        assert_eq!(body["username"], "jane");
        assert_eq!(body["first_name"], "");
        assert_eq!(body["email"], "jane@example.com");
    }

    #[tokio::test]
    async fn test_bearer_falls_back_to_project_key() {
        let url = Url::parse("https://project.example.com").unwrap();
        let backend = BackendClient::new(BackendConfig::new(url, "anon")).unwrap();
        let auth = ReqwestAuthClient::new(backend.clone());

        let repository = ReqwestProfileRepository::new(backend).with_auth(auth);
        assert!(repository.bearer().await.is_none());
    }
}
