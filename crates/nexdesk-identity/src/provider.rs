//! Seams to the hosted backend.
//!
//! [`AuthProvider`] covers the auth service, [`ProfileRepository`] the
//! profile table. Implementations live outside this crate, see
//! `nexdesk-reqwest` for the HTTP ones.

use std::fmt;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{
    AuthEvent, Credentials, FederatedRedirect, FederatedSignIn, NewProfile, Profile, Session,
    SignUpOutcome, SignUpRequest,
};
use crate::{AuthError, Result};

/// Remote auth service.
///
/// Successful calls change the provider's own session and announce the
/// change on the event stream returned by [`AuthProvider::subscribe`].
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Looks up the session the provider currently holds.
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Signs in with email and password.
    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<()>;

    /// Registers a new account.
    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome>;

    /// Starts a redirect-based federated sign-in.
    async fn sign_in_with_federated(&self, request: &FederatedSignIn)
    -> Result<FederatedRedirect>;

    /// Resumes a federated sign-in from the URL the provider redirected to.
    async fn complete_federated_sign_in(&self, callback: &url::Url) -> Result<()> {
        let _ = callback;
        Err(AuthError::configuration(
            "provider does not support federated callbacks",
        ))
    }

    /// Signs the current session out.
    async fn sign_out(&self) -> Result<()>;

    /// Attaches a listener to the provider's auth event stream.
    fn subscribe(&self) -> Subscription;
}

/// Profile table access.
#[async_trait::async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Reads a profile by identity id. `Ok(None)` means no row exists.
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>>;

    /// Inserts a new profile row.
    ///
    /// Returns an error of kind [`Conflict`](crate::ErrorKind::Conflict) if
    /// the row already exists.
    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile>;
}

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// Live listener on a provider's event stream.
///
/// The release hook runs exactly once, either on
/// [`Subscription::unsubscribe`] or when the subscription is dropped.
pub struct Subscription {
    receiver: broadcast::Receiver<AuthEvent>,
    release: Option<ReleaseHook>,
}

impl Subscription {
    /// Wraps a broadcast receiver.
    pub fn new(receiver: broadcast::Receiver<AuthEvent>) -> Self {
        Self {
            receiver,
            release: None,
        }
    }

    /// Registers a callback run when the listener is released.
    #[must_use]
    pub fn with_release(mut self, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// Waits for the next event.
    pub async fn recv(&mut self) -> Result<AuthEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Releases the listener.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("pending", &self.receiver.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_release_runs_once() {
        let (sender, receiver) = broadcast::channel(4);
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();

        let mut subscription = Subscription::new(receiver).with_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sender.send(AuthEvent::signed_out()).unwrap();
        let event = subscription.recv().await.unwrap();
        assert_eq!(event.kind, crate::types::AuthEventKind::SignedOut);

        subscription.unsubscribe();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(sender.receiver_count(), 0);
    }
}
