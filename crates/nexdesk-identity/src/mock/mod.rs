//! In-memory backends for testing.
//!
//! [`MockAuthProvider`] behaves like a hosted auth service with a fixed user
//! table, and [`MockProfileRepository`] like the profile table. Both are
//! cheap to clone and every clone shares state, so a test can keep a handle
//! to inspect counters or push events after handing one to the manager.

mod auth;
mod profiles;

pub use auth::MockAuthProvider;
pub use profiles::MockProfileRepository;
