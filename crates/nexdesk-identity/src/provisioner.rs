//! Lazy profile creation on sign-in.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ErrorKind;
use crate::provider::ProfileRepository;
use crate::types::{Identity, NewProfile};

/// Tracing target for profile provisioning.
pub const TRACING_TARGET: &str = "nexdesk_identity::provisioner";

/// What [`ProfileProvisioner::ensure_profile`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// A profile row already existed.
    Existing,
    /// A profile row was inserted.
    Created,
    /// Another call for the same identity was already running.
    Skipped,
    /// The lookup or the insert failed. The failure was logged.
    Failed,
}

/// Makes sure a profile row exists for an identity.
///
/// Provisioning is best effort. Failures are logged and never surfaced, so
/// they cannot hold up a sign-in.
#[derive(Clone)]
pub struct ProfileProvisioner {
    repository: Arc<dyn ProfileRepository>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// Removes an id from the in-flight set when the call finishes.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    id: Uuid,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        set.remove(&self.id);
    }
}

impl ProfileProvisioner {
    pub fn new(repository: Arc<dyn ProfileRepository>) -> Self {
        Self {
            repository,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn claim(&self, id: Uuid) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        set.insert(id).then(|| InFlight {
            set: &self.in_flight,
            id,
        })
    }

    /// Creates the profile for `identity` unless it already exists.
    ///
    /// Safe to call on every sign-in.
    pub async fn ensure_profile(&self, identity: &Identity) -> ProvisionOutcome {
        let Some(_claim) = self.claim(identity.id) else {
            tracing::debug!(
                target: TRACING_TARGET,
                user_id = %identity.id,
                "Profile provisioning already running"
            );
            return ProvisionOutcome::Skipped;
        };

        match self.repository.find_profile(identity.id).await {
            Ok(Some(_)) => {
                tracing::trace!(
                    target: TRACING_TARGET,
                    user_id = %identity.id,
                    "Profile already exists"
                );
                return ProvisionOutcome::Existing;
            }
            Ok(None) => {}
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    user_id = %identity.id,
                    error = %error,
                    "Failed to look up profile"
                );
                return ProvisionOutcome::Failed;
            }
        }

        let profile = NewProfile::from_identity(identity);
        match self.repository.insert_profile(&profile).await {
            Ok(_) => {
                tracing::info!(
                    target: TRACING_TARGET,
                    user_id = %identity.id,
                    username = ?profile.username,
                    "Created profile"
                );
                ProvisionOutcome::Created
            }
            Err(error) if error.kind == ErrorKind::Conflict => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    user_id = %identity.id,
                    "Profile was created concurrently"
                );
                ProvisionOutcome::Existing
            }
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    user_id = %identity.id,
                    error = %error,
                    "Failed to create profile"
                );
                ProvisionOutcome::Failed
            }
        }
    }

    /// Runs [`ensure_profile`](Self::ensure_profile) as a detached task.
    ///
    /// Nobody has to await the handle. The outcome is only interesting to
    /// tests.
    pub fn spawn(&self, identity: Identity) -> JoinHandle<ProvisionOutcome> {
        let provisioner = self.clone();
        tokio::spawn(async move { provisioner.ensure_profile(&identity).await })
    }
}
