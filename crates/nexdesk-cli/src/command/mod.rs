//! Auth commands.

mod federated;
mod interrupt;
mod sign_in;
mod sign_out;
mod sign_up;
mod watch;
mod whoami;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use nexdesk_identity::{
    AuthError, AuthSnapshot, Identity, ProfileProvisioner, ProvisionOutcome, Session,
    SessionManager, SessionReader,
};
use nexdesk_reqwest::{BackendConfig, ReqwestProfileRepository};

pub use self::federated::FederatedArgs;
pub use self::sign_in::SignInArgs;
pub use self::sign_up::SignUpArgs;

use crate::TRACING_TARGET_COMMAND;

/// How long to wait for the provider's session event after a successful call.
const SESSION_WAIT: Duration = Duration::from_secs(10);

/// Available commands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sign in with email and password
    SignIn(SignInArgs),
    /// Create an account
    SignUp(SignUpArgs),
    /// Sign in with the federated provider (GitHub by default)
    Github(FederatedArgs),
    /// Sign out and forget the stored session
    SignOut,
    /// Show the signed-in user and their profile
    Whoami,
    /// Print session state changes until interrupted
    Watch,
}

impl Command {
    /// Returns the command name as typed on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignIn(_) => "sign-in",
            Self::SignUp(_) => "sign-up",
            Self::Github(_) => "github",
            Self::SignOut => "sign-out",
            Self::Whoami => "whoami",
            Self::Watch => "watch",
        }
    }

    /// Runs the command.
    pub async fn execute(self, context: &CommandContext<'_>) -> anyhow::Result<()> {
        tracing::debug!(
            target: TRACING_TARGET_COMMAND,
            command = self.name(),
            "Running command"
        );

        match self {
            Self::SignIn(args) => sign_in::run(args, context).await,
            Self::SignUp(args) => sign_up::run(args, context).await,
            Self::Github(args) => federated::run(args, context).await,
            Self::SignOut => sign_out::run(context).await,
            Self::Whoami => whoami::run(context).await,
            Self::Watch => watch::run(context).await,
        }
    }
}

/// Everything a command needs.
pub struct CommandContext<'a> {
    pub manager: &'a SessionManager,
    pub profiles: &'a ReqwestProfileRepository,
    pub config: &'a BackendConfig,
}

impl<'a> CommandContext<'a> {
    pub fn new(
        manager: &'a SessionManager,
        profiles: &'a ReqwestProfileRepository,
        config: &'a BackendConfig,
    ) -> Self {
        Self {
            manager,
            profiles,
            config,
        }
    }

    /// Session held before a sign-in call, to tell the new one apart.
    fn current_session(&self) -> Option<Session> {
        self.manager.snapshot().session
    }

    /// Waits for the session event that follows a successful sign-in, then
    /// makes sure the profile row exists before the process exits.
    ///
    /// `previous` is the session held before the call. A restored session
    /// for another account must not be mistaken for the new one.
    async fn finish_sign_in(&self, previous: Option<Session>) -> anyhow::Result<Identity> {
        let mut reader = self.manager.reader();
        let identity = wait_for_new_session(&mut reader, previous.as_ref(), SESSION_WAIT)
            .await
            .context("signed in, but the session never arrived")?;

        // The manager provisions in the background. The process may exit
        // before that finishes, so check again here. It is idempotent.
        let provisioner = ProfileProvisioner::new(Arc::new(self.profiles.clone()));
        if provisioner.ensure_profile(&identity).await == ProvisionOutcome::Failed {
            eprintln!("Warning: your profile could not be created, it will be retried next time");
        }

        Ok(identity)
    }
}

/// Waits until the reader holds a session other than `previous` and
/// returns its identity.
async fn wait_for_new_session(
    reader: &mut SessionReader,
    previous: Option<&Session>,
    timeout: Duration,
) -> Option<Identity> {
    let wait = async {
        loop {
            if let Some(session) = reader.session()
                && previous.is_none_or(|previous| previous.access_token != session.access_token)
            {
                return Some(session.identity);
            }
            reader.changed().await?;
        }
    };

    tokio::time::timeout(timeout, wait).await.ok().flatten()
}

/// Wraps an [`AuthError`] with a message fit for the terminal.
fn user_error(error: AuthError) -> anyhow::Error {
    let message = error.describe();
    anyhow::Error::new(error).context(message)
}

/// Renders a snapshot as one line.
fn describe_snapshot(snapshot: &AuthSnapshot) -> String {
    let who = snapshot
        .identity
        .as_ref()
        .map(|identity| match &identity.email {
            Some(email) => format!(" as {email} ({})", identity.id),
            None => format!(" as {}", identity.id),
        })
        .unwrap_or_default();
    let loading = if snapshot.loading { " (loading)" } else { "" };

    format!("{}{who}{loading}", snapshot.state)
}

#[cfg(test)]
mod tests {
    use nexdesk_identity::mock::{MockAuthProvider, MockProfileRepository};
    use nexdesk_identity::{AuthEvent, AuthState};
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_wait_for_new_session_sees_event() {
        let provider = MockAuthProvider::new();
        let manager = SessionManager::start(provider.clone(), MockProfileRepository::new());
        let mut reader = manager.reader();
        reader.wait_until_ready().await;

        let identity = Identity::new(Uuid::now_v7(), "a@b.com");
        provider.emit(AuthEvent::signed_in(MockAuthProvider::session_for(
            identity.clone(),
        )));

        let seen = wait_for_new_session(&mut reader, None, Duration::from_secs(1)).await;
        assert_eq!(seen, Some(identity));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_for_new_session_skips_restored_account() {
        let restored = MockAuthProvider::session_for(Identity::new(Uuid::now_v7(), "old@x.com"));
        let provider = MockAuthProvider::new()
            .with_session(restored)
            .with_user("new@x.com", "secret1");
        let manager = SessionManager::start(provider.clone(), MockProfileRepository::new());
        let mut reader = manager.reader();
        let ready = reader.wait_until_ready().await;
        assert!(ready.identity.is_some());

        let previous = ready.session;
        manager.sign_in("new@x.com", "secret1").await.unwrap();

        let seen =
            wait_for_new_session(&mut reader, previous.as_ref(), Duration::from_secs(1)).await;
        let email = seen.and_then(|identity| identity.email);
        assert_eq!(email.as_deref(), Some("new@x.com"));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_for_new_session_times_out_on_unchanged_session() {
        let restored = MockAuthProvider::session_for(Identity::new(Uuid::now_v7(), "old@x.com"));
        let manager = SessionManager::start(
            MockAuthProvider::new().with_session(restored),
            MockProfileRepository::new(),
        );
        let mut reader = manager.reader();
        let previous = reader.wait_until_ready().await.session;

        let seen =
            wait_for_new_session(&mut reader, previous.as_ref(), Duration::from_millis(20)).await;
        assert!(seen.is_none());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_for_new_session_times_out() {
        let manager =
            SessionManager::start(MockAuthProvider::new(), MockProfileRepository::new());
        let mut reader = manager.reader();
        reader.wait_until_ready().await;

        let seen = wait_for_new_session(&mut reader, None, Duration::from_millis(20)).await;
        assert!(seen.is_none());
        manager.shutdown().await;
    }

    #[test]
    fn test_user_error_uses_hint() {
        let error = user_error(AuthError::invalid_credentials("Invalid login credentials"));
        assert_eq!(error.to_string(), "Incorrect email or password");
    }

    #[test]
    fn test_describe_snapshot() {
        let snapshot = AuthSnapshot {
            state: AuthState::Anonymous,
            ..AuthSnapshot::default()
        };
        assert_eq!(describe_snapshot(&snapshot), "anonymous");
    }
}
