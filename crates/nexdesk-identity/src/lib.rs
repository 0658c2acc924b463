#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod error;
pub mod form;
mod gateway;
mod manager;
#[doc(hidden)]
pub mod prelude;
mod provider;
mod provisioner;
mod store;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod mock;

pub use error::{AuthError, AuthErrorHint, BoxedError, ErrorKind, Result, UNEXPECTED_REASON};
pub use form::{SignInForm, SignUpForm};
pub use gateway::CredentialGateway;
pub use manager::SessionManager;
pub use provider::{AuthProvider, ProfileRepository, Subscription};
pub use provisioner::{ProfileProvisioner, ProvisionOutcome};
pub use store::{AuthSnapshot, AuthState, SessionReader};
pub use types::{
    AuthEvent, AuthEventKind, Credentials, FederatedRedirect, FederatedSignIn, Identity,
    IdentityMetadata, NewProfile, Profile, Session, SignUpOutcome, SignUpRequest,
};

/// Tracing targets used by this crate, for filter directives.
pub mod targets {
    pub use crate::gateway::TRACING_TARGET as GATEWAY;
    pub use crate::manager::TRACING_TARGET as MANAGER;
    pub use crate::provisioner::TRACING_TARGET as PROVISIONER;
    pub use crate::store::TRACING_TARGET as STORE;
}
