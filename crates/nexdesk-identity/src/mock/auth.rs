//! Mock auth provider for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, oneshot};
use url::Url;
use uuid::Uuid;

use crate::provider::{AuthProvider, Subscription};
use crate::types::{
    AuthEvent, Credentials, FederatedRedirect, FederatedSignIn, Identity, IdentityMetadata,
    Session, SignUpOutcome, SignUpRequest,
};
use crate::{AuthError, Result};

const EVENT_CAPACITY: usize = 64;
const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone)]
struct MockUser {
    password: String,
    identity: Identity,
    confirmed: bool,
}

#[derive(Debug)]
struct MockAuthInner {
    users: Mutex<HashMap<String, MockUser>>,
    current: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    session_gate: Mutex<Option<oneshot::Receiver<()>>>,
    subscribed: AtomicUsize,
    released: AtomicUsize,
    sign_in_calls: AtomicUsize,
    emit_events: AtomicBool,
    panic_on_calls: AtomicBool,
    block_federated: AtomicBool,
    require_confirmation: AtomicBool,
    fail_session_lookup: AtomicBool,
    fail_sign_out: AtomicBool,
}

/// Mock auth provider.
///
/// Successful calls update the provider's own session and broadcast the
/// matching event, like a hosted auth client does.
#[derive(Debug, Clone)]
pub struct MockAuthProvider {
    inner: Arc<MockAuthInner>,
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthProvider {
    /// Creates a provider with no users and no session.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = MockAuthInner {
            users: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            events,
            session_gate: Mutex::new(None),
            subscribed: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            sign_in_calls: AtomicUsize::new(0),
            emit_events: AtomicBool::new(true),
            panic_on_calls: AtomicBool::new(false),
            block_federated: AtomicBool::new(false),
            require_confirmation: AtomicBool::new(false),
            fail_session_lookup: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Registers a confirmed user.
    #[must_use]
    pub fn with_user(self, email: &str, password: &str) -> Self {
        self.insert_user(email, password, IdentityMetadata::default(), true);
        self
    }

    /// Starts with an existing session, as if restored from storage.
    #[must_use]
    pub fn with_session(self, session: Session) -> Self {
        *lock(&self.inner.current) = Some(session);
        self
    }

    /// Stops broadcasting events for successful calls.
    #[must_use]
    pub fn silent(self) -> Self {
        self.inner.emit_events.store(false, Ordering::SeqCst);
        self
    }

    /// Makes every credential call panic.
    #[must_use]
    pub fn panic_on_calls(self) -> Self {
        self.inner.panic_on_calls.store(true, Ordering::SeqCst);
        self
    }

    /// Makes federated sign-in fail before the redirect.
    #[must_use]
    pub fn block_federated_redirect(self) -> Self {
        self.inner.block_federated.store(true, Ordering::SeqCst);
        self
    }

    /// Requires email confirmation after sign-up.
    #[must_use]
    pub fn require_confirmation(self) -> Self {
        self.inner.require_confirmation.store(true, Ordering::SeqCst);
        self
    }

    /// Makes the session lookup fail.
    #[must_use]
    pub fn fail_session_lookup(self) -> Self {
        self.inner.fail_session_lookup.store(true, Ordering::SeqCst);
        self
    }

    /// Makes sign-out fail.
    #[must_use]
    pub fn fail_sign_out(self) -> Self {
        self.inner.fail_sign_out.store(true, Ordering::SeqCst);
        self
    }

    /// Holds the next session lookup until the returned sender fires or is
    /// dropped.
    pub fn hold_session_lookup(&self) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        *lock(&self.inner.session_gate) = Some(receiver);
        sender
    }

    /// Pushes an event to every listener and adopts its session.
    pub fn emit(&self, event: AuthEvent) {
        *lock(&self.inner.current) = event.session.clone();
        let _ = self.inner.events.send(event);
    }

    /// Number of events not yet received by every listener.
    pub fn pending_events(&self) -> usize {
        self.inner.events.len()
    }

    /// Number of listeners ever attached.
    pub fn subscribe_count(&self) -> usize {
        self.inner.subscribed.load(Ordering::SeqCst)
    }

    /// Number of listeners released.
    pub fn unsubscribe_count(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Number of password sign-in attempts.
    pub fn sign_in_calls(&self) -> usize {
        self.inner.sign_in_calls.load(Ordering::SeqCst)
    }

    /// Builds a session for `identity` with a random token.
    pub fn session_for(identity: Identity) -> Session {
        Session::new(format!("mock-{}", Uuid::new_v4()), identity)
            .with_refresh_token(format!("mock-refresh-{}", Uuid::new_v4()))
    }

    fn insert_user(
        &self,
        email: &str,
        password: &str,
        metadata: IdentityMetadata,
        confirmed: bool,
    ) -> Identity {
        let identity = Identity::new(Uuid::now_v7(), email).with_metadata(metadata);
        let user = MockUser {
            password: password.to_owned(),
            identity: identity.clone(),
            confirmed,
        };
        lock(&self.inner.users).insert(email.to_owned(), user);
        identity
    }

    fn establish(&self, identity: Identity) {
        let session = Self::session_for(identity);
        *lock(&self.inner.current) = Some(session.clone());
        if self.inner.emit_events.load(Ordering::SeqCst) {
            let _ = self.inner.events.send(AuthEvent::signed_in(session));
        }
    }

    fn check_panic(&self) {
        if self.inner.panic_on_calls.load(Ordering::SeqCst) {
            panic!("mock provider configured to panic");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait::async_trait]
impl AuthProvider for MockAuthProvider {
    async fn current_session(&self) -> Result<Option<Session>> {
        // Read first: a held lookup answers with what it saw when it started.
        let session = lock(&self.inner.current).clone();
        let gate = lock(&self.inner.session_gate).take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if self.inner.fail_session_lookup.load(Ordering::SeqCst) {
            return Err(AuthError::network_error("session storage unavailable"));
        }

        Ok(session)
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<()> {
        self.inner.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.check_panic();

        let user = lock(&self.inner.users).get(&credentials.email).cloned();
        let user = match user {
            Some(user) if user.password == credentials.password => user,
            _ => return Err(AuthError::invalid_credentials("Invalid login credentials")),
        };

        if !user.confirmed {
            return Err(AuthError::invalid_credentials("Email not confirmed"));
        }

        self.establish(user.identity);
        Ok(())
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome> {
        self.check_panic();
        let credentials = &request.credentials;

        if !credentials.email.contains('@') {
            return Err(AuthError::invalid_input("Invalid email"));
        }
        if credentials.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::invalid_input(
                "Password should be at least 6 characters",
            ));
        }
        if lock(&self.inner.users).contains_key(&credentials.email) {
            return Err(AuthError::conflict("User already registered"));
        }

        let confirmed = !self.inner.require_confirmation.load(Ordering::SeqCst);
        let identity = self.insert_user(
            &credentials.email,
            &credentials.password,
            request.metadata.clone(),
            confirmed,
        );

        if !confirmed {
            return Ok(SignUpOutcome::ConfirmationRequired);
        }

        self.establish(identity);
        Ok(SignUpOutcome::SignedIn)
    }

    async fn sign_in_with_federated(
        &self,
        request: &FederatedSignIn,
    ) -> Result<FederatedRedirect> {
        self.check_panic();

        if self.inner.block_federated.load(Ordering::SeqCst) {
            return Err(AuthError::external("Redirect blocked: popup window closed"));
        }

        let mut url = Url::parse("https://auth.mock.invalid/authorize")
            .map_err(|error| AuthError::configuration(error.to_string()))?;
        url.query_pairs_mut()
            .append_pair("provider", &request.provider);
        if let Some(redirect_to) = &request.redirect_to {
            url.query_pairs_mut()
                .append_pair("redirect_to", redirect_to.as_str());
        }

        Ok(FederatedRedirect { url })
    }

    async fn complete_federated_sign_in(&self, callback: &Url) -> Result<()> {
        self.check_panic();

        let fragment = callback.fragment().unwrap_or_default();
        let email = url::form_urlencoded::parse(fragment.as_bytes())
            .find(|(key, _)| key == "email")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| AuthError::invalid_input("callback carries no session"))?;

        let existing = lock(&self.inner.users)
            .get(&email)
            .map(|user| user.identity.clone());
        let identity = match existing {
            Some(identity) => identity,
            None => self.insert_user(&email, "", IdentityMetadata::default(), true),
        };

        self.establish(identity);
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        if self.inner.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AuthError::network_error("sign out request failed"));
        }

        *lock(&self.inner.current) = None;
        if self.inner.emit_events.load(Ordering::SeqCst) {
            let _ = self.inner.events.send(AuthEvent::signed_out());
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        self.inner.subscribed.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        Subscription::new(self.inner.events.subscribe()).with_release(move || {
            inner.released.fetch_add(1, Ordering::SeqCst);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::types::AuthEventKind;

    #[tokio::test]
    async fn test_sign_in_broadcasts_session() {
        let provider = MockAuthProvider::new().with_user("a@b.com", "secret1");
        let mut subscription = provider.subscribe();

        provider
            .sign_in_with_password(&Credentials::new("a@b.com", "secret1"))
            .await
            .unwrap();

        let event = subscription.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedIn);
        assert!(provider.current_session().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unconfirmed_user_cannot_sign_in() {
        let provider = MockAuthProvider::new().require_confirmation();
        let outcome = provider
            .sign_up(&SignUpRequest::new("a@b.com", "secret1"))
            .await
            .unwrap();
        assert_eq!(outcome, SignUpOutcome::ConfirmationRequired);

        let error = provider
            .sign_in_with_password(&Credentials::new("a@b.com", "secret1"))
            .await
            .unwrap_err();
        assert_eq!(error.reason, "Email not confirmed");
    }

    #[tokio::test]
    async fn test_duplicate_sign_up() {
        let provider = MockAuthProvider::new().with_user("a@b.com", "secret1");
        let error = provider
            .sign_up(&SignUpRequest::new("a@b.com", "another1"))
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_subscription_release_is_counted() {
        let provider = MockAuthProvider::new();
        let subscription = provider.subscribe();
        assert_eq!(provider.subscribe_count(), 1);
        assert_eq!(provider.unsubscribe_count(), 0);

        subscription.unsubscribe();
        assert_eq!(provider.unsubscribe_count(), 1);
    }
}
