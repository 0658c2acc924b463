//! Current identity, session and loading flag.
//!
//! The store is written only from inside this crate. Everything else gets a
//! [`SessionReader`], which can read the latest [`AuthSnapshot`] and wait
//! for changes.

use serde::Serialize;
use strum::{AsRefStr, Display, IntoStaticStr};
use tokio::sync::watch;

use crate::types::{Identity, Session};

/// Tracing target for session store updates.
pub const TRACING_TARGET: &str = "nexdesk_identity::store";

/// Where the manager's state machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[derive(AsRefStr, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AuthState {
    /// The initial session lookup has not resolved yet.
    #[default]
    Initializing,
    /// A session is present.
    Authenticated,
    /// No session.
    Anonymous,
}

/// Read model handed to the rest of the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub identity: Option<Identity>,
    #[serde(skip)]
    pub session: Option<Session>,
    /// Advisory flag, true while an operation or the initial lookup runs.
    pub loading: bool,
}

impl AuthSnapshot {
    fn initializing() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    /// Returns true if a session is present.
    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }
}

/// Process-wide session state.
#[derive(Debug, Clone)]
pub(crate) struct SessionStore {
    sender: watch::Sender<AuthSnapshot>,
}

impl SessionStore {
    /// Creates a store in the `Initializing` state with `loading` set.
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(AuthSnapshot::initializing());
        Self { sender }
    }

    /// Replaces identity and session from a provider session and clears
    /// `loading`, in a single update.
    pub(crate) fn set_from_provider(&self, session: Option<Session>) {
        self.sender.send_modify(|snapshot| {
            snapshot.identity = session.as_ref().map(|session| session.identity.clone());
            snapshot.state = if session.is_some() {
                AuthState::Authenticated
            } else {
                AuthState::Anonymous
            };
            snapshot.session = session;
            snapshot.loading = false;
        });

        let snapshot = self.sender.borrow();
        tracing::debug!(
            target: TRACING_TARGET,
            state = %snapshot.state,
            user_id = ?snapshot.identity.as_ref().map(|identity| identity.id),
            "Session store updated"
        );
    }

    /// Leaves `Initializing` without touching identity or session.
    pub(crate) fn resolve(&self) {
        self.sender.send_modify(|snapshot| {
            if snapshot.state == AuthState::Initializing {
                snapshot.state = if snapshot.session.is_some() {
                    AuthState::Authenticated
                } else {
                    AuthState::Anonymous
                };
            }
            snapshot.loading = false;
        });
    }

    /// Drops identity and session.
    pub(crate) fn clear(&self) {
        self.set_from_provider(None);
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.sender.send_if_modified(|snapshot| {
            let changed = snapshot.loading != loading;
            snapshot.loading = loading;
            changed
        });
    }

    pub(crate) fn reader(&self) -> SessionReader {
        SessionReader {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Read-only view on the session store.
///
/// Cheap to clone. Every clone observes the same state.
#[derive(Debug, Clone)]
pub struct SessionReader {
    receiver: watch::Receiver<AuthSnapshot>,
}

impl SessionReader {
    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.receiver.borrow().clone()
    }

    pub fn state(&self) -> AuthState {
        self.receiver.borrow().state
    }

    pub fn identity(&self) -> Option<Identity> {
        self.receiver.borrow().identity.clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.receiver.borrow().session.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.receiver.borrow().loading
    }

    /// Waits until the state changes and returns the new snapshot.
    ///
    /// Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<AuthSnapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Waits until the initial session lookup resolved.
    pub async fn wait_until_ready(&mut self) -> AuthSnapshot {
        if let Ok(snapshot) = self
            .receiver
            .wait_for(|snapshot| snapshot.state != AuthState::Initializing)
            .await
        {
            return snapshot.clone();
        }

        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn session() -> Session {
        Session::new("token", Identity::new(Uuid::now_v7(), "a@b.com"))
    }

    #[test]
    fn test_initial_state() {
        let store = SessionStore::new();
        let snapshot = store.reader().snapshot();

        assert_eq!(snapshot.state, AuthState::Initializing);
        assert!(snapshot.loading);
        assert!(snapshot.identity.is_none());
        assert!(snapshot.session.is_none());
    }

    #[test]
    fn test_set_from_provider() {
        let store = SessionStore::new();
        let reader = store.reader();
        let session = session();

        store.set_from_provider(Some(session.clone()));
        let snapshot = reader.snapshot();
        assert_eq!(snapshot.state, AuthState::Authenticated);
        assert_eq!(snapshot.identity, Some(session.identity.clone()));
        assert_eq!(snapshot.session, Some(session));
        assert!(!snapshot.loading);

        store.clear();
        let snapshot = reader.snapshot();
        assert_eq!(snapshot.state, AuthState::Anonymous);
        assert!(snapshot.identity.is_none());
        assert!(snapshot.session.is_none());
    }

    #[test]
    fn test_resolve_keeps_session() {
        let store = SessionStore::new();
        store.resolve();
        assert_eq!(store.reader().state(), AuthState::Anonymous);
        assert!(!store.reader().is_loading());

        store.set_from_provider(Some(session()));
        store.set_loading(true);
        store.resolve();
        assert_eq!(store.reader().state(), AuthState::Authenticated);
        assert!(!store.reader().is_loading());
    }

    #[tokio::test]
    async fn test_wait_until_ready() {
        let store = SessionStore::new();
        let mut reader = store.reader();

        let handle = tokio::spawn(async move { reader.wait_until_ready().await });
        store.set_from_provider(Some(session()));

        let snapshot = handle.await.unwrap();
        assert!(snapshot.is_authenticated());
    }
}
