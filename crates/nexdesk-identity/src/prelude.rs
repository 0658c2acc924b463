//! Convenient re-exports for common use.

pub use crate::error::{AuthError, ErrorKind, Result};
pub use crate::form::{SignInForm, SignUpForm};
pub use crate::manager::SessionManager;
pub use crate::provider::{AuthProvider, ProfileRepository, Subscription};
pub use crate::store::{AuthSnapshot, AuthState, SessionReader};
pub use crate::types::{
    AuthEvent, AuthEventKind, FederatedSignIn, Identity, IdentityMetadata, Session,
};
