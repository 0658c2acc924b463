//! Auth provider over the hosted auth REST API.

use std::sync::Arc;

use jiff::{SignedDuration, Timestamp};
use nexdesk_identity::{
    AuthError, AuthEvent, AuthEventKind, AuthProvider, Credentials, ErrorKind, FederatedRedirect,
    FederatedSignIn, Identity, Result, Session, SignUpOutcome, SignUpRequest, Subscription,
};
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use url::Url;

use crate::client::BackendClient;
use crate::error::Error;
use crate::session_file::SessionFile;

/// Tracing target for auth operations.
pub const TRACING_TARGET: &str = "nexdesk_reqwest::auth";

const EVENT_CAPACITY: usize = 32;

/// Token grant as returned by the token, sign-up and callback flows.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    user: Identity,
}

impl TokenResponse {
    fn into_session(self, now: Timestamp) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|second| Timestamp::from_second(second).ok())
            .or_else(|| {
                self.expires_in
                    .and_then(|secs| now.checked_add(SignedDuration::from_secs(secs)).ok())
            });

        let mut session = Session::new(self.access_token, self.user);
        if let Some(token_type) = self.token_type {
            session.token_type = token_type;
        }
        if let Some(refresh_token) = self.refresh_token {
            session = session.with_refresh_token(refresh_token);
        }
        if let Some(expires_at) = expires_at {
            session = session.with_expires_at(expires_at);
        }
        session
    }
}

/// Reads a sign-up response.
///
/// Without email confirmation the response is a full token grant, otherwise
/// it is the bare user and `None` is returned.
fn signup_session(response: serde_json::Value, now: Timestamp) -> Result<Option<Session>> {
    if response.get("access_token").is_none() {
        return Ok(None);
    }

    let grant: TokenResponse = serde_json::from_value(response).map_err(Error::from)?;
    Ok(Some(grant.into_session(now)))
}

/// Tokens carried back by a federated sign-in redirect.
#[derive(Debug)]
struct CallbackTokens {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
}

impl CallbackTokens {
    /// Reads the tokens from the URL fragment, or from the query string if
    /// the fragment is empty.
    fn parse(callback: &Url) -> Result<Self> {
        let params = match callback.fragment().filter(|fragment| !fragment.is_empty()) {
            Some(fragment) => fragment.to_owned(),
            None => callback.query().unwrap_or_default().to_owned(),
        };

        let mut access_token = None;
        let mut refresh_token = None;
        let mut token_type = None;
        let mut expires_in = None;
        let mut expires_at = None;
        let mut error = None;
        let mut error_description = None;

        for (key, value) in url::form_urlencoded::parse(params.as_bytes()) {
            let value = value.into_owned();
            match key.as_ref() {
                "access_token" => access_token = Some(value),
                "refresh_token" => refresh_token = Some(value),
                "token_type" => token_type = Some(value),
                "expires_in" => expires_in = value.parse().ok(),
                "expires_at" => expires_at = value.parse().ok(),
                "error" => error = Some(value),
                "error_description" => error_description = Some(value),
                _ => {}
            }
        }

        if let Some(reason) = error_description.or(error) {
            return Err(AuthError::external(reason));
        }

        let access_token = access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::invalid_input("callback carries no access token"))?;

        Ok(Self {
            access_token,
            refresh_token,
            token_type,
            expires_in,
            expires_at,
        })
    }

    fn into_session(self, user: Identity, now: Timestamp) -> Session {
        TokenResponse {
            access_token: self.access_token,
            token_type: self.token_type,
            expires_in: self.expires_in,
            expires_at: self.expires_at,
            refresh_token: self.refresh_token,
            user,
        }
        .into_session(now)
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    session: Option<Session>,
    loaded: bool,
}

struct AuthClientInner {
    backend: BackendClient,
    events: broadcast::Sender<AuthEvent>,
    slot: Mutex<SessionSlot>,
    storage: Option<SessionFile>,
}

impl std::fmt::Debug for AuthClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClientInner")
            .field("backend", &self.backend)
            .field("storage", &self.storage)
            .field("listeners", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

/// [`AuthProvider`] backed by the hosted auth API.
///
/// Keeps the current session in memory (and in the session file, when one
/// is configured) and broadcasts an [`AuthEvent`] whenever it changes.
#[derive(Clone, Debug)]
pub struct ReqwestAuthClient {
    inner: Arc<AuthClientInner>,
}

impl ReqwestAuthClient {
    /// Creates an auth client. The session file comes from the backend
    /// configuration.
    pub fn new(backend: BackendClient) -> Self {
        let storage = backend.config().session_file.clone().map(SessionFile::new);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = AuthClientInner {
            backend,
            events,
            slot: Mutex::new(SessionSlot::default()),
            storage,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Gets the backend client.
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// Returns the access token of the in-memory session, if any.
    pub async fn access_token(&self) -> Option<String> {
        let slot = self.inner.slot.lock().await;
        slot.session
            .as_ref()
            .map(|session| session.access_token.clone())
    }

    /// Locks the session slot, reading the session file on first use.
    async fn loaded_slot(&self) -> MutexGuard<'_, SessionSlot> {
        let mut slot = self.inner.slot.lock().await;
        if slot.loaded {
            return slot;
        }

        if let Some(storage) = &self.inner.storage {
            match storage.load().await {
                Ok(session) => slot.session = session,
                Err(error) => tracing::warn!(
                    target: TRACING_TARGET,
                    path = %storage.path().display(),
                    error = %error,
                    "Ignoring unreadable session file"
                ),
            }
        }

        slot.loaded = true;
        slot
    }

    async fn persist(&self, session: Option<&Session>) {
        let Some(storage) = &self.inner.storage else {
            return;
        };

        let result = match session {
            Some(session) => storage.save(session).await,
            None => storage.remove().await,
        };

        if let Err(error) = result {
            tracing::warn!(
                target: TRACING_TARGET,
                path = %storage.path().display(),
                error = %error,
                "Failed to persist session"
            );
        }
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        let listeners = self.inner.events.send(AuthEvent::new(kind, session)).unwrap_or(0);
        tracing::trace!(
            target: TRACING_TARGET,
            event = %kind,
            listeners,
            "Auth event broadcast"
        );
    }

    /// Replaces the session, persists it and broadcasts `kind`.
    ///
    /// The slot stays locked until the event is sent, so listeners see
    /// events in the order the slot changed.
    async fn replace(&self, slot: &mut SessionSlot, session: Option<Session>, kind: AuthEventKind) {
        self.persist(session.as_ref()).await;
        slot.session = session.clone();
        slot.loaded = true;
        self.emit(kind, session);
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, Error> {
        let backend = &self.inner.backend;
        let mut url = backend.endpoint("auth/v1/token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let request = backend
            .request(Method::POST, url, None)
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        let response: TokenResponse = backend.send_json(request).await?;
        Ok(response.into_session(Timestamp::now()))
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Identity, Error> {
        let backend = &self.inner.backend;
        let url = backend.endpoint("auth/v1/user")?;
        let request = backend.request(Method::GET, url, Some(access_token));
        backend.send_json(request).await
    }
}

/// Kinds that mean the server no longer accepts the session's tokens.
fn is_session_rejected(error: &AuthError) -> bool {
    matches!(
        error.kind,
        ErrorKind::InvalidCredentials | ErrorKind::InvalidInput | ErrorKind::NotFound
    )
}

#[async_trait::async_trait]
impl AuthProvider for ReqwestAuthClient {
    async fn current_session(&self) -> Result<Option<Session>> {
        let mut slot = self.loaded_slot().await;
        let Some(session) = slot.session.clone() else {
            return Ok(None);
        };

        if !session.is_expired() {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            tracing::info!(
                target: TRACING_TARGET,
                user_id = %session.identity.id,
                "Stored session expired"
            );
            self.replace(&mut slot, None, AuthEventKind::SignedOut).await;
            return Ok(None);
        };

        match self.refresh(&refresh_token).await.map_err(AuthError::from) {
            Ok(refreshed) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    user_id = %refreshed.identity.id,
                    "Session refreshed"
                );
                self.replace(&mut slot, Some(refreshed.clone()), AuthEventKind::TokenRefreshed)
                    .await;
                Ok(Some(refreshed))
            }
            Err(error) if is_session_rejected(&error) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    user_id = %session.identity.id,
                    reason = %error.reason,
                    "Refresh token rejected"
                );
                self.replace(&mut slot, None, AuthEventKind::SignedOut).await;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn sign_in_with_password(&self, credentials: &Credentials) -> Result<()> {
        let backend = &self.inner.backend;
        let mut url = backend.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let request = backend.request(Method::POST, url, None).json(credentials);
        let response: TokenResponse = backend.send_json(request).await?;
        let session = response.into_session(Timestamp::now());

        tracing::info!(
            target: TRACING_TARGET,
            user_id = %session.identity.id,
            "Password sign-in accepted"
        );

        let mut slot = self.inner.slot.lock().await;
        self.replace(&mut slot, Some(session), AuthEventKind::SignedIn)
            .await;
        Ok(())
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome> {
        let backend = &self.inner.backend;
        let mut url = backend.endpoint("auth/v1/signup")?;
        if let Some(redirect_to) = &backend.config().redirect_to {
            url.query_pairs_mut()
                .append_pair("redirect_to", redirect_to.as_str());
        }

        let http_request = backend.request(Method::POST, url, None).json(request);
        let response: serde_json::Value = backend.send_json(http_request).await?;

        let Some(session) = signup_session(response, Timestamp::now())? else {
            tracing::info!(
                target: TRACING_TARGET,
                "Sign-up accepted, email confirmation required"
            );
            return Ok(SignUpOutcome::ConfirmationRequired);
        };

        tracing::info!(
            target: TRACING_TARGET,
            user_id = %session.identity.id,
            "Sign-up accepted"
        );

        let mut slot = self.inner.slot.lock().await;
        self.replace(&mut slot, Some(session), AuthEventKind::SignedIn)
            .await;
        Ok(SignUpOutcome::SignedIn)
    }

    async fn sign_in_with_federated(
        &self,
        request: &FederatedSignIn,
    ) -> Result<FederatedRedirect> {
        let provider = request.provider.trim();
        if provider.is_empty() {
            return Err(AuthError::invalid_input("federated provider is required"));
        }

        let backend = &self.inner.backend;
        let mut url = backend.endpoint("auth/v1/authorize")?;
        url.query_pairs_mut().append_pair("provider", provider);

        let redirect_to = request
            .redirect_to
            .as_ref()
            .or(backend.config().redirect_to.as_ref());
        if let Some(redirect_to) = redirect_to {
            url.query_pairs_mut()
                .append_pair("redirect_to", redirect_to.as_str());
        }

        tracing::debug!(
            target: TRACING_TARGET,
            provider,
            "Federated sign-in redirect built"
        );

        Ok(FederatedRedirect { url })
    }

    async fn complete_federated_sign_in(&self, callback: &Url) -> Result<()> {
        let tokens = CallbackTokens::parse(callback)?;
        let user = self.fetch_user(&tokens.access_token).await?;
        let session = tokens.into_session(user, Timestamp::now());

        tracing::info!(
            target: TRACING_TARGET,
            user_id = %session.identity.id,
            "Federated sign-in completed"
        );

        let mut slot = self.inner.slot.lock().await;
        self.replace(&mut slot, Some(session), AuthEventKind::SignedIn)
            .await;
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        let mut slot = self.loaded_slot().await;

        if let Some(session) = &slot.session {
            let backend = &self.inner.backend;
            let url = backend.endpoint("auth/v1/logout")?;
            let request = backend.request(Method::POST, url, Some(&session.access_token));

            if let Err(error) = backend.send(request).await {
                let error = AuthError::from(error);
                if !is_session_rejected(&error) {
                    return Err(error);
                }
                tracing::debug!(
                    target: TRACING_TARGET,
                    reason = %error.reason,
                    "Session was already invalid on the server"
                );
            }
        }

        self.replace(&mut slot, None, AuthEventKind::SignedOut).await;
        tracing::info!(target: TRACING_TARGET, "Signed out");
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        let receiver = self.inner.events.subscribe();
        tracing::debug!(
            target: TRACING_TARGET,
            listeners = self.inner.events.receiver_count(),
            "Auth listener attached"
        );

        Subscription::new(receiver).with_release(|| {
            tracing::debug!(target: TRACING_TARGET, "Auth listener released");
        })
    }
}
