//! Credential operations against the auth provider.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;

use crate::provider::AuthProvider;
use crate::store::SessionStore;
use crate::types::{
    Credentials, FederatedRedirect, FederatedSignIn, IdentityMetadata, SignUpOutcome,
    SignUpRequest,
};
use crate::{AuthError, Result};

/// Tracing target for credential operations.
pub const TRACING_TARGET: &str = "nexdesk_identity::gateway";

/// Resets `loading` when dropped unless disarmed.
pub(crate) struct LoadingGuard<'a> {
    store: &'a SessionStore,
    armed: bool,
}

impl<'a> LoadingGuard<'a> {
    pub(crate) fn engage(store: &'a SessionStore) -> Self {
        store.set_loading(true);
        Self { store, armed: true }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.set_loading(false);
        }
    }
}

/// Runs a provider call, turning a panic inside it into a generic error.
pub(crate) async fn guarded<T, F>(operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                target: TRACING_TARGET,
                operation,
                "Provider call panicked"
            );
            Err(AuthError::unexpected())
        }
    }
}

/// Password and federated sign-in, and sign-up.
///
/// Session changes caused by these calls reach the store through the
/// provider's event stream, not through the return values.
#[derive(Clone)]
pub struct CredentialGateway {
    provider: Arc<dyn AuthProvider>,
    store: SessionStore,
}

impl CredentialGateway {
    pub(crate) fn new(provider: Arc<dyn AuthProvider>, store: SessionStore) -> Self {
        Self { provider, store }
    }

    /// Signs in with email and password.
    ///
    /// The provider's rejection reason is returned unchanged.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        let _loading = LoadingGuard::engage(&self.store);
        let started_at = Instant::now();
        let credentials = Credentials::new(email, password);

        let result = guarded(
            "sign_in",
            self.provider.sign_in_with_password(&credentials),
        )
        .await;

        match &result {
            Ok(()) => tracing::info!(
                target: TRACING_TARGET,
                elapsed_ms = started_at.elapsed().as_millis(),
                "Password sign-in accepted"
            ),
            Err(error) => tracing::warn!(
                target: TRACING_TARGET,
                kind = %error.kind,
                reason = %error.reason,
                elapsed_ms = started_at.elapsed().as_millis(),
                "Password sign-in rejected"
            ),
        }

        result
    }

    /// Registers a new account seeded with `metadata`.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: IdentityMetadata,
    ) -> Result<SignUpOutcome> {
        let _loading = LoadingGuard::engage(&self.store);
        let request = SignUpRequest::new(email, password).with_metadata(metadata);

        let result = guarded("sign_up", self.provider.sign_up(&request)).await;

        match &result {
            Ok(SignUpOutcome::SignedIn) => tracing::info!(
                target: TRACING_TARGET,
                "Account created and signed in"
            ),
            Ok(SignUpOutcome::ConfirmationRequired) => tracing::info!(
                target: TRACING_TARGET,
                "Account created, email confirmation required"
            ),
            Err(error) => tracing::warn!(
                target: TRACING_TARGET,
                kind = %error.kind,
                reason = %error.reason,
                "Sign-up rejected"
            ),
        }

        result
    }

    /// Starts a federated sign-in.
    ///
    /// On success `loading` stays set: the user is about to leave for the
    /// provider and the flow resumes through the event stream.
    pub async fn sign_in_with_federated(
        &self,
        request: &FederatedSignIn,
    ) -> Result<FederatedRedirect> {
        let loading = LoadingGuard::engage(&self.store);

        let result = guarded(
            "sign_in_with_federated",
            self.provider.sign_in_with_federated(request),
        )
        .await;

        match &result {
            Ok(redirect) => {
                loading.disarm();
                tracing::info!(
                    target: TRACING_TARGET,
                    provider = %request.provider,
                    url = %redirect.url,
                    "Federated sign-in initiated"
                );
            }
            Err(error) => tracing::warn!(
                target: TRACING_TARGET,
                provider = %request.provider,
                reason = %error.reason,
                "Federated sign-in could not be initiated"
            ),
        }

        result
    }

    /// Hands the provider's callback URL back to resume a federated sign-in.
    pub async fn complete_federated_sign_in(&self, callback: &url::Url) -> Result<()> {
        let _loading = LoadingGuard::engage(&self.store);

        let result = guarded(
            "complete_federated_sign_in",
            self.provider.complete_federated_sign_in(callback),
        )
        .await;

        if let Err(error) = &result {
            tracing::warn!(
                target: TRACING_TARGET,
                reason = %error.reason,
                "Federated callback rejected"
            );
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::mock::MockAuthProvider;

    fn gateway(provider: MockAuthProvider) -> (CredentialGateway, SessionStore) {
        let store = SessionStore::new();
        store.resolve();
        let gateway = CredentialGateway::new(Arc::new(provider), store.clone());
        (gateway, store)
    }

    #[tokio::test]
    async fn test_rejected_sign_in_resets_loading() {
        let provider = MockAuthProvider::new().with_user("good@x.com", "rightpass");
        let (gateway, store) = gateway(provider);

        let error = gateway.sign_in("bad@x.com", "wrongpass").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidCredentials);
        assert!(error.reason.contains("Invalid login credentials"));
        assert!(!store.reader().is_loading());
    }

    #[tokio::test]
    async fn test_accepted_sign_in_resets_loading() {
        let provider = MockAuthProvider::new().with_user("good@x.com", "rightpass");
        let (gateway, store) = gateway(provider);

        gateway.sign_in("good@x.com", "rightpass").await.unwrap();
        assert!(!store.reader().is_loading());
    }

    #[tokio::test]
    async fn test_panic_becomes_generic_error() {
        let provider = MockAuthProvider::new().panic_on_calls();
        let (gateway, store) = gateway(provider);

        let error = gateway.sign_in("a@b.com", "secret1").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Unknown);
        assert!(!store.reader().is_loading());

        let error = gateway
            .sign_up("a@b.com", "secret1", IdentityMetadata::default())
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Unknown);
        assert!(!store.reader().is_loading());
    }

    #[tokio::test]
    async fn test_weak_password_sign_up_leaves_store_untouched() {
        let provider = MockAuthProvider::new();
        let (gateway, store) = gateway(provider);
        let before = store.reader().snapshot();

        let error = gateway
            .sign_up("new@x.com", "12345", IdentityMetadata::default())
            .await
            .unwrap_err();
        assert_eq!(error.hint(), Some(crate::AuthErrorHint::WeakPassword));

        let after = store.reader().snapshot();
        assert_eq!(after.identity, before.identity);
        assert_eq!(after.state, before.state);
        assert!(!after.loading);
    }

    #[tokio::test]
    async fn test_federated_success_keeps_loading() {
        let provider = MockAuthProvider::new();
        let (gateway, store) = gateway(provider);

        let redirect = gateway
            .sign_in_with_federated(&FederatedSignIn::default())
            .await
            .unwrap();
        assert!(redirect.url.as_str().contains("provider=github"));
        assert!(store.reader().is_loading());
    }

    #[tokio::test]
    async fn test_federated_failure_resets_loading() {
        let provider = MockAuthProvider::new().block_federated_redirect();
        let (gateway, store) = gateway(provider);

        let error = gateway
            .sign_in_with_federated(&FederatedSignIn::default())
            .await
            .unwrap_err();
        assert_eq!(error.hint(), Some(crate::AuthErrorHint::PopupBlocked));
        assert!(!store.reader().is_loading());
    }
}
