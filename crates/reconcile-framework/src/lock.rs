//! # Mutual Exclusion Coordinator
//!
//! Read-modify-write sequences against the same remote object must not interleave:
//! two updates that both fetch, patch and write back the full object would silently lose
//! one of the patches. Every mutating engine operation therefore holds a lock keyed by the
//! identifier it writes, plus the identifiers of any shared parent it touches.
//!
//! ## Keys
//!
//! [`LockKey`] normalizes to ASCII lowercase, so `/Sub/RG/...` and `/sub/rg/...` contend on
//! the same lock. The remote service treats identifiers case-insensitively and so do we.
//!
//! ## Acquisition order
//!
//! A [`LockSet`] acquires keys in the order the caller lists them and releases them in
//! reverse order when dropped. Callers list their own identifier first and shared parents
//! after it. Asking a set for a key it already holds is a no-op, which makes a single
//! operation re-entrant on its own keys.

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// A case-normalized lock name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(String);

impl LockKey {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof that a lock is held. Dropping it releases the lock.
pub struct LockHandle {
    key: LockKey,
    _guard: Box<dyn Send + Sync>,
}

impl LockHandle {
    pub fn new(key: LockKey, guard: impl Send + Sync + 'static) -> Self {
        Self {
            key,
            _guard: Box::new(guard),
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle").field("key", &self.key).finish()
    }
}

/// Grants exclusive access per key.
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Wait until `key` is free and take it.
    async fn acquire(&self, key: &LockKey) -> LockHandle;
}

/// Process-wide keyed locks.
///
/// One `tokio::sync::Mutex` per key, created on first use and kept for the lifetime of
/// the coordinator. Share a single instance (behind an `Arc`) between every reconciler that
/// can touch the same remote objects.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys seen so far.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[async_trait]
impl LockCoordinator for KeyedLocks {
    async fn acquire(&self, key: &LockKey) -> LockHandle {
        // Clone the Arc out before awaiting so no map shard stays locked.
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        trace!(%key, "Waiting for lock");
        let guard = mutex.lock_owned().await;
        trace!(%key, "Lock acquired");
        LockHandle::new(key.clone(), guard)
    }
}

/// A coordinator that never blocks. Useful where callers serialize access themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLocks;

#[async_trait]
impl LockCoordinator for NoopLocks {
    async fn acquire(&self, key: &LockKey) -> LockHandle {
        LockHandle::new(key.clone(), ())
    }
}

/// The locks held by one engine operation.
#[derive(Debug, Default)]
pub struct LockSet {
    held: Vec<LockHandle>,
}

impl LockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every key in order, skipping duplicates.
    pub async fn acquire_all<I>(coordinator: &dyn LockCoordinator, keys: I) -> Self
    where
        I: IntoIterator<Item = LockKey>,
    {
        let mut set = Self::new();
        for key in keys {
            set.acquire(coordinator, key).await;
        }
        set
    }

    /// Acquire `key` unless this set already holds it.
    pub async fn acquire(&mut self, coordinator: &dyn LockCoordinator, key: LockKey) {
        if self.holds(&key) {
            trace!(%key, "Lock already held by this operation");
            return;
        }
        let handle = coordinator.acquire(&key).await;
        debug!(%key, "Locked");
        self.held.push(handle);
    }

    pub fn holds(&self, key: &LockKey) -> bool {
        self.held.iter().any(|h| h.key() == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &LockKey> {
        self.held.iter().map(LockHandle::key)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some(handle) = self.held.pop() {
            debug!(key = %handle.key(), "Unlocked");
            drop(handle);
        }
    }
}
