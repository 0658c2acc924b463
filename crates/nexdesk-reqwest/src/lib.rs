//! Reqwest-based backends for nexdesk identity management.
//!
//! [`ReqwestAuthClient`] implements [`AuthProvider`] against the hosted auth
//! API and [`ReqwestProfileRepository`] implements [`ProfileRepository`]
//! against the row API. Both go through one [`BackendClient`].
//!
//! [`AuthProvider`]: nexdesk_identity::AuthProvider
//! [`ProfileRepository`]: nexdesk_identity::ProfileRepository

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod auth;
mod client;
mod config;
mod error;
mod profiles;
mod session_file;

pub use crate::auth::ReqwestAuthClient;
pub use crate::client::BackendClient;
pub use crate::config::{BackendConfig, DEFAULT_TIMEOUT_SECS};
pub use crate::error::{Error, Result};
pub use crate::profiles::ReqwestProfileRepository;
pub use crate::session_file::SessionFile;

/// Tracing targets used by this crate, for filter directives.
pub mod targets {
    pub use crate::auth::TRACING_TARGET as AUTH;
    pub use crate::client::TRACING_TARGET as CLIENT;
    pub use crate::profiles::TRACING_TARGET as PROFILES;
    pub use crate::session_file::TRACING_TARGET as SESSION_FILE;
}
