//! Named exclusive locks for leader election.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::LockError;

/// Proof of holding a named lock. Dropping it releases the lock.
pub struct LockGuard {
    name: String,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl LockGuard {
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("name", &self.name).finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Cluster-wide named mutual exclusion.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Try to take `name` without waiting.
    ///
    /// `Ok(None)` means someone else holds it.
    async fn try_acquire(&self, name: &str) -> Result<Option<LockGuard>, LockError>;
}

/// Locks shared by everything holding the same service instance.
///
/// Several electors sharing one `LocalLockService` behave like processes
/// in a cluster.
#[derive(Clone, Default)]
pub struct LocalLockService {
    held: Arc<DashMap<String, u64>>,
    next_token: Arc<AtomicU64>,
}

impl LocalLockService {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_held(&self, name: &str) -> bool {
        self.held.contains_key(name)
    }

    /// Release `name` regardless of who holds it, as if the holder vanished.
    ///
    /// The old guard becomes inert: dropping it later will not release a
    /// newer holder.
    #[cfg(test)]
    pub fn force_release(&self, name: &str) -> bool {
        self.held.remove(name).is_some()
    }
}

#[async_trait]
impl LockService for LocalLockService {
    async fn try_acquire(&self, name: &str) -> Result<Option<LockGuard>, LockError> {
        if name.is_empty() {
            return Err(LockError::InvalidName(name.to_string()));
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        match self.held.entry(name.to_string()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(slot) => {
                slot.insert(token);
                let held = Arc::clone(&self.held);
                let owned = name.to_string();
                Ok(Some(LockGuard::new(name, move || {
                    held.remove_if(&owned, |_, holder| *holder == token);
                })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let locks = LocalLockService::new();
        let guard = locks.try_acquire("leader").await.unwrap().unwrap();
        assert_eq!(guard.name(), "leader");
        assert!(locks.try_acquire("leader").await.unwrap().is_none());
        assert!(locks.try_acquire("other").await.unwrap().is_some());

        drop(guard);
        assert!(!locks.is_held("leader"));
        assert!(locks.try_acquire("leader").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_guard_does_not_release_new_holder() {
        let locks = LocalLockService::new();
        let stale = locks.try_acquire("leader").await.unwrap().unwrap();
        assert!(locks.force_release("leader"));

        let _fresh = locks.try_acquire("leader").await.unwrap().unwrap();
        drop(stale);
        assert!(locks.is_held("leader"));
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let locks = LocalLockService::new();
        assert!(matches!(
            locks.try_acquire("").await,
            Err(LockError::InvalidName(_))
        ));
    }
}
