//! Mock profile repository for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use jiff::Timestamp;
use uuid::Uuid;

use crate::provider::ProfileRepository;
use crate::types::{NewProfile, Profile};
use crate::{AuthError, Result};

#[derive(Debug, Default)]
struct MockProfilesInner {
    rows: Mutex<HashMap<Uuid, Profile>>,
    inserts: AtomicUsize,
    fail_lookups: AtomicBool,
    fail_inserts: AtomicBool,
}

/// In-memory profile table.
#[derive(Debug, Clone, Default)]
pub struct MockProfileRepository {
    inner: Arc<MockProfilesInner>,
}

impl MockProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every lookup fail.
    #[must_use]
    pub fn fail_lookups(self) -> Self {
        self.inner.fail_lookups.store(true, Ordering::SeqCst);
        self
    }

    /// Makes every insert fail.
    #[must_use]
    pub fn fail_inserts(self) -> Self {
        self.inner.fail_inserts.store(true, Ordering::SeqCst);
        self
    }

    /// Stores a row without counting it as an insert.
    pub fn seed(&self, profile: NewProfile) {
        let profile = profile.into_profile(Timestamp::now());
        self.rows().insert(profile.id, profile);
    }

    pub fn get(&self, id: Uuid) -> Option<Profile> {
        self.rows().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Number of successful inserts.
    pub fn insert_count(&self) -> usize {
        self.inner.inserts.load(Ordering::SeqCst)
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Profile>> {
        self.inner
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl ProfileRepository for MockProfileRepository {
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        if self.inner.fail_lookups.load(Ordering::SeqCst) {
            return Err(AuthError::network_error("profiles table unreachable"));
        }

        Ok(self.get(id))
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile> {
        if self.inner.fail_inserts.load(Ordering::SeqCst) {
            return Err(AuthError::external("permission denied for table profiles"));
        }

        let mut rows = self.rows();
        if rows.contains_key(&profile.id) {
            return Err(AuthError::conflict(
                "duplicate key value violates unique constraint \"profiles_pkey\"",
            ));
        }

        let stored = profile.clone().into_profile(Timestamp::now());
        rows.insert(stored.id, stored.clone());
        self.inner.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}
