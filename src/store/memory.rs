//! In-memory store backends for tests and single-process development.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{CredentialStore, SessionKey, User, UserStore};
use crate::clock::Clock;
use crate::error::StoreError;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
}

/// User records keyed by normalized email
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(lock(&self.users)?.get(email).cloned())
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<Uuid, StoreError> {
        let mut users = lock(&self.users)?;
        if users.contains_key(email) {
            return Err(StoreError::Conflict);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
        };
        let id = user.id;
        users.insert(email.to_string(), user);
        Ok(id)
    }
}

const PRUNE_THRESHOLD: usize = 10_000;

struct Entry {
    value: String,
    expires_at: i64,
}

fn evict_expired(entries: &mut HashMap<SessionKey, Entry>, key: &SessionKey, now: i64) {
    let expired = matches!(entries.get(key), Some(entry) if entry.expires_at <= now);
    if expired {
        entries.remove(key);
    }
}

/// Refresh-token state with TTL evaluated against the injected clock.
///
/// The mutex makes `compare_and_put` a single atomic step.
///
/// Expired entries are dropped when their key is next touched, and swept
/// from the whole map on `put` once it holds more than `prune_threshold`
/// entries.
pub struct InMemoryCredentialStore {
    entries: Mutex<HashMap<SessionKey, Entry>>,
    clock: Arc<dyn Clock>,
    prune_threshold: usize,
}

impl InMemoryCredentialStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_prune_threshold(clock, PRUNE_THRESHOLD)
    }

    pub fn with_prune_threshold(clock: Arc<dyn Clock>, prune_threshold: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            prune_threshold,
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn put(&self, key: &SessionKey, value: &str, ttl_seconds: i64) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries)?;

        if entries.len() > self.prune_threshold {
            entries.retain(|_, entry| entry.expires_at > now);
        }

        entries.insert(
            key.clone(),
            Entry {
                value: value.to_string(),
                expires_at: now.saturating_add(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn compare_and_put(
        &self,
        key: &SessionKey,
        expected: &str,
        new_value: &str,
        ttl_seconds: i64,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries)?;
        evict_expired(&mut entries, key, now);

        match entries.get_mut(key) {
            Some(entry) if entry.value == expected => {
                entry.value = new_value.to_string();
                entry.expires_at = now.saturating_add(ttl_seconds);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries)?;
        evict_expired(&mut entries, key, now);

        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }
}
