//! Structured error handling for identity operations.

use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with [`AuthError`].
pub type Result<T, E = AuthError> = std::result::Result<T, E>;

/// Reason reported when an operation fails for a reason nobody anticipated.
pub const UNEXPECTED_REASON: &str = "unexpected error";

/// Categories of errors that can occur in identity operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Input validation failed before or at the provider.
    InvalidInput,
    /// The provider rejected the supplied credentials.
    InvalidCredentials,
    /// The record already exists.
    Conflict,
    /// Network-related error occurred.
    NetworkError,
    /// Rate limit exceeded.
    RateLimited,
    /// Timeout occurred.
    Timeout,
    /// Resource not found.
    NotFound,
    /// Serialization/deserialization error.
    Serialization,
    /// Configuration error.
    Configuration,
    /// The provider reported an error that fits no other category.
    ExternalError,
    /// Unknown error occurred.
    #[default]
    Unknown,
}

impl ErrorKind {
    /// Check if this error kind is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError | Self::Timeout | Self::RateLimited)
    }
}

/// Error returned by every provider-facing identity operation.
///
/// The `reason` is provider-defined free text and is passed through
/// uninterpreted. Use [`AuthError::hint`] to classify well-known reasons
/// for display.
#[must_use]
#[derive(Debug, Error)]
#[error("[{kind}]: {reason}")]
pub struct AuthError {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Provider-defined reason.
    pub reason: String,
    /// Underlying source error, if any.
    #[source]
    pub source: Option<BoxedError>,
}

impl AuthError {
    /// Creates a new error with the given kind and reason.
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            source: None,
        }
    }

    /// Sets the source of the error.
    pub fn with_source(mut self, source: impl Into<BoxedError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Creates an invalid input error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, reason)
    }

    /// Creates an invalid credentials error.
    pub fn invalid_credentials(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCredentials, reason)
    }

    /// Creates a conflict error.
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, reason)
    }

    /// Creates a network error.
    pub fn network_error(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, reason)
    }

    /// Creates a rate limited error.
    pub fn rate_limited(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, reason)
    }

    /// Creates a timeout error.
    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, reason)
    }

    /// Creates a not found error.
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, reason)
    }

    /// Creates a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, reason)
    }

    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, reason)
    }

    /// Creates an external (provider-reported) error.
    pub fn external(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalError, reason)
    }

    /// Creates the generic error an unexpected failure is converted into.
    pub fn unexpected() -> Self {
        Self::new(ErrorKind::Unknown, UNEXPECTED_REASON)
    }

    /// Check if this error is retryable based on its kind.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Classifies the reason against well-known provider messages.
    #[must_use]
    pub fn hint(&self) -> Option<AuthErrorHint> {
        AuthErrorHint::classify(&self.reason)
    }

    /// Returns a message suitable for showing to a user.
    ///
    /// Known reasons are translated, anything else is returned verbatim.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.hint() {
            Some(hint) => hint.describe().to_owned(),
            None => self.reason.clone(),
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string()).with_source(error)
    }
}

/// Well-known provider reasons, matched by substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AuthErrorHint {
    /// Wrong email or password.
    InvalidCredentials,
    /// The account exists but its email address was never confirmed.
    EmailNotConfirmed,
    /// Too many attempts in a short period.
    TooManyRequests,
    /// Sign-up with an email that already has an account.
    AlreadyRegistered,
    /// Password rejected by the provider's strength policy.
    WeakPassword,
    /// Malformed email address.
    InvalidEmail,
    /// The federated redirect was blocked before it started.
    PopupBlocked,
}

impl AuthErrorHint {
    const PATTERNS: [(&'static str, Self); 7] = [
        ("Invalid login credentials", Self::InvalidCredentials),
        ("Email not confirmed", Self::EmailNotConfirmed),
        ("Too many requests", Self::TooManyRequests),
        ("User already registered", Self::AlreadyRegistered),
        ("Password should be at least", Self::WeakPassword),
        ("Invalid email", Self::InvalidEmail),
        ("popup", Self::PopupBlocked),
    ];

    /// Returns the hint matching the first known substring of `reason`.
    pub fn classify(reason: &str) -> Option<Self> {
        Self::PATTERNS
            .iter()
            .find(|(needle, _)| reason.contains(needle))
            .map(|(_, hint)| *hint)
    }

    /// Human readable description.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Incorrect email or password",
            Self::EmailNotConfirmed => "Please confirm your email before signing in",
            Self::TooManyRequests => "Too many attempts, please try again later",
            Self::AlreadyRegistered => "An account already exists with this email address",
            Self::WeakPassword => "The password must contain at least 6 characters",
            Self::InvalidEmail => "Invalid email address",
            Self::PopupBlocked => "Please allow popups to sign in with the external provider",
        }
    }
}
