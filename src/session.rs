//! TTL-bounded session state for multi-step conversational flows.
//!
//! A flow like "pick a chain, then a name, then confirm" needs transient
//! per-user state between messages. Keeping that in an explicit store with a
//! TTL (instead of a bare process-local map) bounds memory and makes the
//! expiry behavior testable; an implementation backed by a shared cache can
//! replace this one without touching callers.

use crate::shared::UserId;
use async_lock::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct SessionStore<T> {
    inner: Arc<RwLock<HashMap<UserId, (T, Instant)>>>,
    ttl: Duration,
}

impl<T: Clone> SessionStore<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Store (or replace) the session for `user`, resetting its TTL.
    pub async fn put(&self, user: UserId, value: T) {
        self.inner.write().await.insert(user, (value, Instant::now()));
    }

    /// Get the live session for `user`, if any.
    pub async fn get(&self, user: &UserId) -> Option<T> {
        let inner = self.inner.read().await;
        inner.get(user).and_then(|(value, stored_at)| {
            (stored_at.elapsed() < self.ttl).then(|| value.clone())
        })
    }

    /// Remove and return the live session for `user`.
    pub async fn take(&self, user: &UserId) -> Option<T> {
        let mut inner = self.inner.write().await;
        inner.remove(user).and_then(|(value, stored_at)| {
            (stored_at.elapsed() < self.ttl).then_some(value)
        })
    }

    /// Drop every expired session; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|_, (_, stored_at)| stored_at.elapsed() < self.ttl);
        before - inner.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
