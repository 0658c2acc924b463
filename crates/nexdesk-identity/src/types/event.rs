//! Auth events pushed by the provider.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

use super::Session;

/// Kind of an auth state change reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString, IntoStaticStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    /// The session found when the listener attached.
    InitialSession,
    /// A user signed in.
    SignedIn,
    /// The user signed out or the session was revoked.
    SignedOut,
    /// The access token was refreshed.
    TokenRefreshed,
    /// Identity attributes changed.
    UserUpdated,
    /// The user followed a password recovery link.
    PasswordRecovery,
}

/// A single auth state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
    /// When the provider issued the event.
    pub issued_at: Timestamp,
}

impl AuthEvent {
    /// Creates an event stamped with the current time.
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self {
            kind,
            session,
            issued_at: Timestamp::now(),
        }
    }

    /// Creates a signed-in event.
    pub fn signed_in(session: Session) -> Self {
        Self::new(AuthEventKind::SignedIn, Some(session))
    }

    /// Creates a signed-out event.
    pub fn signed_out() -> Self {
        Self::new(AuthEventKind::SignedOut, None)
    }

    /// Creates a token-refreshed event.
    pub fn token_refreshed(session: Session) -> Self {
        Self::new(AuthEventKind::TokenRefreshed, Some(session))
    }
}
