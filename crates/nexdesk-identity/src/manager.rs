//! Session identity manager.
//!
//! The manager owns the provider subscription and is the only writer of the
//! session store. Provider events and the result of the one-off initial
//! session lookup are applied by a single background task, one at a time:
//!
//! ```text
//! Initializing ──initial lookup / first event──▶ Authenticated | Anonymous
//! Authenticated ◀──────────── events ───────────▶ Anonymous
//! ```
//!
//! If an event has already been applied when the initial lookup resolves,
//! the lookup's session is discarded: it was read before the event happened.

use std::sync::Arc;

use futures::future::OptionFuture;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::gateway::{CredentialGateway, LoadingGuard, guarded};
use crate::provider::{AuthProvider, ProfileRepository, Subscription};
use crate::provisioner::ProfileProvisioner;
use crate::store::{AuthSnapshot, SessionReader, SessionStore};
use crate::types::{
    AuthEvent, AuthEventKind, FederatedRedirect, FederatedSignIn, IdentityMetadata, Session,
    SignUpOutcome,
};
use crate::{AuthError, Result};

/// Tracing target for the session state machine.
pub const TRACING_TARGET: &str = "nexdesk_identity::manager";

type InitialLookup = oneshot::Receiver<Result<Option<Session>>>;

/// Tracks the authenticated identity and mediates every auth operation.
///
/// Create one per application with [`SessionManager::start`], hand
/// [`SessionReader`]s to whoever needs to observe the state, and call
/// [`SessionManager::shutdown`] when done. Dropping the manager stops the
/// background task as well, without waiting for it.
pub struct SessionManager {
    provider: Arc<dyn AuthProvider>,
    store: SessionStore,
    gateway: CredentialGateway,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    initial_lookup: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("snapshot", &self.snapshot())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Subscribes to the provider, starts the initial session lookup and
    /// the event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<P, R>(provider: P, repository: R) -> Self
    where
        P: AuthProvider + 'static,
        R: ProfileRepository + 'static,
    {
        Self::from_shared(Arc::new(provider), Arc::new(repository))
    }

    /// Same as [`start`](Self::start) for providers that are already shared.
    pub fn from_shared(
        provider: Arc<dyn AuthProvider>,
        repository: Arc<dyn ProfileRepository>,
    ) -> Self {
        let store = SessionStore::new();
        let gateway = CredentialGateway::new(provider.clone(), store.clone());
        let provisioner = ProfileProvisioner::new(repository);
        let cancel = CancellationToken::new();

        // Subscribe before the lookup so no event can slip in between.
        let subscription = provider.subscribe();

        let (sender, receiver) = oneshot::channel();
        let lookup_provider = provider.clone();
        let initial_lookup = tokio::spawn(async move {
            let result = lookup_provider.current_session().await;
            let _ = sender.send(result);
        });

        let event_loop = EventLoop {
            subscription,
            store: store.clone(),
            provisioner,
            cancel: cancel.clone(),
            event_applied: false,
        };
        let worker = tokio::spawn(event_loop.run(receiver));

        tracing::debug!(target: TRACING_TARGET, "Session manager started");

        Self {
            provider,
            store,
            gateway,
            cancel,
            worker: Some(worker),
            initial_lookup: Some(initial_lookup),
        }
    }

    /// Returns a read-only handle on the session state.
    pub fn reader(&self) -> SessionReader {
        self.store.reader()
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.store.reader().snapshot()
    }

    /// Returns the credential gateway.
    pub fn gateway(&self) -> &CredentialGateway {
        &self.gateway
    }

    /// Signs in with email and password.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        self.gateway.sign_in(email, password).await
    }

    /// Registers a new account.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: IdentityMetadata,
    ) -> Result<SignUpOutcome> {
        self.gateway.sign_up(email, password, metadata).await
    }

    /// Starts a federated sign-in.
    pub async fn sign_in_with_federated(
        &self,
        request: &FederatedSignIn,
    ) -> Result<FederatedRedirect> {
        self.gateway.sign_in_with_federated(request).await
    }

    /// Resumes a federated sign-in from the provider's callback URL.
    pub async fn complete_federated_sign_in(&self, callback: &Url) -> Result<()> {
        self.gateway.complete_federated_sign_in(callback).await
    }

    /// Signs out.
    ///
    /// On success the store is cleared right away instead of waiting for
    /// the provider's signed-out event.
    pub async fn sign_out(&self) -> Result<()> {
        let _loading = LoadingGuard::engage(&self.store);

        let result = guarded("sign_out", self.provider.sign_out()).await;
        match &result {
            Ok(()) => {
                self.store.clear();
                tracing::info!(target: TRACING_TARGET, "Signed out");
            }
            Err(error) => tracing::warn!(
                target: TRACING_TARGET,
                kind = %error.kind,
                reason = %error.reason,
                "Sign-out failed"
            ),
        }

        result
    }

    /// Stops the event loop and releases the provider subscription.
    ///
    /// Nothing writes to the store after this returns.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();

        if let Some(lookup) = self.initial_lookup.take() {
            lookup.abort();
        }

        if let Some(worker) = self.worker.take()
            && let Err(error) = worker.await
            && error.is_panic()
        {
            tracing::error!(
                target: TRACING_TARGET,
                error = %error,
                "Session event loop panicked"
            );
        }

        tracing::debug!(target: TRACING_TARGET, "Session manager shut down");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(lookup) = self.initial_lookup.take() {
            lookup.abort();
        }
    }
}

/// Serialized handler for provider events.
struct EventLoop {
    subscription: Subscription,
    store: SessionStore,
    provisioner: ProfileProvisioner,
    cancel: CancellationToken,
    event_applied: bool,
}

impl EventLoop {
    async fn run(mut self, initial: InitialLookup) {
        let mut initial = Some(initial);
        let mut stream_open = true;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    tracing::debug!(target: TRACING_TARGET, "Event loop cancelled");
                    break;
                }

                received = self.subscription.recv(), if stream_open => match received {
                    Ok(event) => self.apply_event(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            target: TRACING_TARGET,
                            skipped,
                            "Auth event listener lagged behind"
                        );
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!(
                            target: TRACING_TARGET,
                            lookup_pending = initial.is_some(),
                            "Auth event stream closed"
                        );
                        stream_open = false;
                        if initial.is_none() {
                            break;
                        }
                    }
                },

                Some(result) = OptionFuture::from(initial.as_mut()), if initial.is_some() => {
                    initial = None;
                    let result = result.unwrap_or_else(|_| Err(AuthError::unexpected()));
                    self.apply_initial(result);
                    if !stream_open {
                        break;
                    }
                }
            }
        }

        // Releases the listener. Dropping `self` would too, this makes the
        // point where it happens explicit.
        self.subscription.unsubscribe();
    }

    fn apply_initial(&mut self, result: Result<Option<Session>>) {
        match result {
            Ok(session) if !self.event_applied => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    has_session = session.is_some(),
                    "Initial session resolved"
                );
                self.store.set_from_provider(session);
            }
            Ok(_) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    "Initial session superseded by a provider event"
                );
                self.store.resolve();
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    error = %error,
                    "Failed to get initial session"
                );
                self.store.resolve();
            }
        }
    }

    fn apply_event(&mut self, event: AuthEvent) {
        self.event_applied = true;

        tracing::info!(
            target: TRACING_TARGET,
            event = %event.kind,
            has_session = event.session.is_some(),
            issued_at = %event.issued_at,
            "Auth state changed"
        );

        match (event.kind, event.session) {
            (AuthEventKind::SignedIn, Some(session)) => {
                let identity = session.identity.clone();
                self.store.set_from_provider(Some(session));
                // Fire and forget: provisioning never blocks the transition.
                drop(self.provisioner.spawn(identity));
            }
            (AuthEventKind::SignedOut, _) | (_, None) => self.store.clear(),
            (_, Some(session)) => self.store.set_from_provider(Some(session)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::ErrorKind;
    use crate::mock::{MockAuthProvider, MockProfileRepository};
    use crate::store::AuthState;
    use crate::types::{Credentials, Identity, SignUpRequest};

    /// Lets the event loop drain every queued event.
    async fn settle(provider: &MockAuthProvider) {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        for _ in 0..64 {
            if provider.pending_events() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
    }

    fn session(email: &str) -> Session {
        MockAuthProvider::session_for(Identity::new(Uuid::now_v7(), email))
    }

    async fn ready(manager: &SessionManager) -> AuthSnapshot {
        let mut reader = manager.reader();
        tokio::time::timeout(Duration::from_secs(1), reader.wait_until_ready())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initial_lookup_without_session() {
        let provider = MockAuthProvider::new();
        let manager = SessionManager::start(provider, MockProfileRepository::new());

        let snapshot = ready(&manager).await;
        assert_eq!(snapshot.state, AuthState::Anonymous);
        assert!(!snapshot.loading);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_initial_lookup_with_session() {
        let restored = session("a@b.com");
        let provider = MockAuthProvider::new().with_session(restored.clone());
        let manager = SessionManager::start(provider, MockProfileRepository::new());

        let snapshot = ready(&manager).await;
        assert_eq!(snapshot.state, AuthState::Authenticated);
        assert_eq!(snapshot.identity, Some(restored.identity));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_initial_lookup_failure_still_resolves() {
        let provider = MockAuthProvider::new().fail_session_lookup();
        let manager = SessionManager::start(provider, MockProfileRepository::new());

        let snapshot = ready(&manager).await;
        assert_eq!(snapshot.state, AuthState::Anonymous);
        assert!(!snapshot.loading);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_state_follows_last_event() {
        let sequences: Vec<Vec<Option<&str>>> = vec![
            vec![Some("a@b.com")],
            vec![None],
            vec![Some("a@b.com"), None],
            vec![None, Some("c@d.com")],
            vec![Some("a@b.com"), Some("c@d.com")],
            vec![Some("a@b.com"), None, Some("c@d.com"), None],
            vec![None, None, Some("e@f.com")],
        ];

        for sequence in sequences {
            let provider = MockAuthProvider::new();
            let manager = SessionManager::start(provider.clone(), MockProfileRepository::new());
            ready(&manager).await;

            let mut last = None;
            for email in &sequence {
                let event = match email {
                    Some(email) => AuthEvent::signed_in(session(email)),
                    None => AuthEvent::signed_out(),
                };
                last = event.session.clone();
                provider.emit(event);
            }
            settle(&provider).await;

            let snapshot = manager.snapshot();
            assert_eq!(
                snapshot.state == AuthState::Authenticated,
                last.is_some(),
                "{sequence:?}"
            );
            assert_eq!(snapshot.session, last, "{sequence:?}");
            manager.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_other_events_follow_session_presence() {
        let provider = MockAuthProvider::new();
        let manager = SessionManager::start(provider.clone(), MockProfileRepository::new());
        ready(&manager).await;

        let refreshed = session("a@b.com");
        provider.emit(AuthEvent::token_refreshed(refreshed.clone()));
        settle(&provider).await;
        assert_eq!(manager.snapshot().session, Some(refreshed));

        provider.emit(AuthEvent::new(AuthEventKind::UserUpdated, None));
        settle(&provider).await;
        assert_eq!(manager.snapshot().state, AuthState::Anonymous);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_event_before_initial_lookup_wins() {
        let stale = session("stale@b.com");
        let provider = MockAuthProvider::new().with_session(stale);
        let gate = provider.hold_session_lookup();
        let manager = SessionManager::start(provider.clone(), MockProfileRepository::new());
        tokio::task::yield_now().await;

        provider.emit(AuthEvent::signed_out());
        settle(&provider).await;
        assert_eq!(manager.snapshot().state, AuthState::Anonymous);

        gate.send(()).unwrap();
        settle(&provider).await;

        let snapshot = ready(&manager).await;
        assert_eq!(snapshot.state, AuthState::Anonymous);
        assert!(snapshot.identity.is_none());
        assert!(!snapshot.loading);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_event_after_initial_lookup_applies() {
        let provider = MockAuthProvider::new().with_session(session("first@b.com"));
        let manager = SessionManager::start(provider.clone(), MockProfileRepository::new());
        assert!(ready(&manager).await.is_authenticated());

        provider.emit(AuthEvent::signed_out());
        settle(&provider).await;
        assert_eq!(manager.snapshot().state, AuthState::Anonymous);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_sign_in_flows_through_events() {
        let provider = MockAuthProvider::new().with_user("a@b.com", "secret1");
        let repository = MockProfileRepository::new();
        let manager = SessionManager::start(provider.clone(), repository.clone());
        ready(&manager).await;

        manager.sign_in("a@b.com", "secret1").await.unwrap();
        settle(&provider).await;

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.state, AuthState::Authenticated);
        assert_eq!(
            snapshot.identity.and_then(|identity| identity.email).as_deref(),
            Some("a@b.com")
        );
        assert!(!snapshot.loading);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_sign_in() {
        let provider = MockAuthProvider::new();
        let manager = SessionManager::start(provider, MockProfileRepository::new());
        ready(&manager).await;

        let error = manager.sign_in("bad@x.com", "wrongpass").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidCredentials);
        assert!(!manager.snapshot().loading);
        assert!(manager.snapshot().identity.is_none());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_weak_password_sign_up_keeps_identity() {
        let current = session("a@b.com");
        let provider = MockAuthProvider::new().with_session(current.clone());
        let manager = SessionManager::start(provider, MockProfileRepository::new());
        ready(&manager).await;

        let error = manager
            .sign_up("new@x.com", "abc", IdentityMetadata::default())
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidInput);
        assert_eq!(manager.snapshot().identity, Some(current.identity));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_sign_out_clears_before_event() {
        let provider = MockAuthProvider::new()
            .with_session(session("a@b.com"))
            .silent();
        let manager = SessionManager::start(provider, MockProfileRepository::new());
        assert!(ready(&manager).await.is_authenticated());

        manager.sign_out().await.unwrap();
        let snapshot = manager.snapshot();
        assert!(snapshot.identity.is_none());
        assert_eq!(snapshot.state, AuthState::Anonymous);
        assert!(!snapshot.loading);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_sign_out_keeps_session() {
        let current = session("a@b.com");
        let provider = MockAuthProvider::new()
            .with_session(current.clone())
            .fail_sign_out();
        let manager = SessionManager::start(provider, MockProfileRepository::new());
        ready(&manager).await;

        assert!(manager.sign_out().await.is_err());
        assert_eq!(manager.snapshot().identity, Some(current.identity));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_signed_in_event_provisions_profile() {
        let provider = MockAuthProvider::new();
        let repository = MockProfileRepository::new();
        let manager = SessionManager::start(provider.clone(), repository.clone());
        ready(&manager).await;

        let signed_in = session("a@b.com");
        let id = signed_in.identity.id;
        provider.emit(AuthEvent::signed_in(signed_in));
        settle(&provider).await;

        tokio::time::timeout(Duration::from_secs(1), async {
            while repository.insert_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(repository.insert_count(), 1);
        let profile = repository.get(id).unwrap();
        assert_eq!(profile.username.as_deref(), Some("a"));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_does_not_provision() {
        let provider = MockAuthProvider::new();
        let repository = MockProfileRepository::new();
        let manager = SessionManager::start(provider.clone(), repository.clone());
        ready(&manager).await;

        provider.emit(AuthEvent::token_refreshed(session("a@b.com")));
        settle(&provider).await;
        settle(&provider).await;

        assert!(repository.is_empty());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_unsubscribes_once() {
        let provider = MockAuthProvider::new();
        let manager = SessionManager::start(provider.clone(), MockProfileRepository::new());
        let reader = manager.reader();
        ready(&manager).await;
        assert_eq!(provider.subscribe_count(), 1);

        manager.shutdown().await;
        assert_eq!(provider.unsubscribe_count(), 1);

        provider.emit(AuthEvent::signed_in(session("late@b.com")));
        tokio::task::yield_now().await;
        assert_eq!(reader.state(), AuthState::Anonymous);
        assert!(reader.identity().is_none());
        assert_eq!(provider.unsubscribe_count(), 1);
    }

    /// Provider whose event stream is already closed when subscribed.
    struct ClosedStreamProvider {
        session: Session,
    }

    #[async_trait::async_trait]
    impl AuthProvider for ClosedStreamProvider {
        async fn current_session(&self) -> Result<Option<Session>> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Some(self.session.clone()))
        }

        async fn sign_in_with_password(&self, _: &Credentials) -> Result<()> {
            Ok(())
        }

        async fn sign_up(&self, _: &SignUpRequest) -> Result<SignUpOutcome> {
            Ok(SignUpOutcome::ConfirmationRequired)
        }

        async fn sign_in_with_federated(&self, _: &FederatedSignIn) -> Result<FederatedRedirect> {
            Err(AuthError::configuration("no federated sign-in"))
        }

        async fn sign_out(&self) -> Result<()> {
            Ok(())
        }

        fn subscribe(&self) -> Subscription {
            let (_, receiver) = tokio::sync::broadcast::channel(1);
            Subscription::new(receiver)
        }
    }

    #[tokio::test]
    async fn test_closed_stream_still_applies_initial_lookup() {
        let restored = session("a@b.com");
        let provider = ClosedStreamProvider {
            session: restored.clone(),
        };
        let manager = SessionManager::start(provider, MockProfileRepository::new());

        let snapshot = ready(&manager).await;
        assert_eq!(snapshot.state, AuthState::Authenticated);
        assert_eq!(snapshot.session, Some(restored));
        assert!(!snapshot.loading);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let provider = MockAuthProvider::new();
        let manager = SessionManager::start(provider.clone(), MockProfileRepository::new());
        ready(&manager).await;

        drop(manager);
        tokio::time::timeout(Duration::from_secs(1), async {
            while provider.unsubscribe_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(provider.unsubscribe_count(), 1);
    }
}
