use super::UserQuota;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Abstract storage for per-user quota records.
///
/// The ledger only ever reads a whole record, changes it, and writes it back,
/// while holding that user's lock; backends need no transactions of their own
/// as long as a single process owns the ledger for a given user.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a user's quota record; `Ok(None)` if the user was never enrolled.
    async fn load(&self, user_id: &str) -> Result<Option<UserQuota>, Self::Error>;

    /// Persist a user's quota record, replacing any previous value.
    async fn save(&self, user_id: &str, quota: &UserQuota) -> Result<(), Self::Error>;
}

/// Simple in-memory quota store.
#[derive(Default, Clone, Debug)]
pub struct InMemoryQuotaStore {
    data: Arc<Mutex<HashMap<String, UserQuota>>>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a record directly, bypassing the ledger.
    pub fn insert(&self, user_id: impl Into<String>, quota: UserQuota) {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).insert(user_id.into(), quota);
    }

    /// Read a record directly, bypassing the ledger.
    pub fn get(&self, user_id: &str) -> Option<UserQuota> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).get(user_id).cloned()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    type Error = std::convert::Infallible;

    async fn load(&self, user_id: &str) -> Result<Option<UserQuota>, Self::Error> {
        Ok(self.get(user_id))
    }

    async fn save(&self, user_id: &str, quota: &UserQuota) -> Result<(), Self::Error> {
        self.insert(user_id, quota.clone());
        Ok(())
    }
}

#[async_trait]
impl<S: QuotaStore + ?Sized> QuotaStore for Arc<S> {
    type Error = S::Error;

    async fn load(&self, user_id: &str) -> Result<Option<UserQuota>, Self::Error> {
        (**self).load(user_id).await
    }

    async fn save(&self, user_id: &str, quota: &UserQuota) -> Result<(), Self::Error> {
        (**self).save(user_id, quota).await
    }
}
