//! Data model shared by the identity components.
//!
//! - [`Identity`]: who the provider says the user is
//! - [`Session`]: token plus identity, replaced wholesale on every change
//! - [`Profile`]: the application's own per-user row
//! - [`AuthEvent`]: a state change pushed by the provider

mod event;
mod identity;
mod profile;
mod request;
mod session;

pub use event::{AuthEvent, AuthEventKind};
pub use identity::{Identity, IdentityMetadata};
pub use profile::{NewProfile, Profile};
pub use request::{
    Credentials, DEFAULT_FEDERATED_PROVIDER, FederatedRedirect, FederatedSignIn, SignUpOutcome,
    SignUpRequest,
};
pub use session::{EXPIRY_MARGIN, Session};
