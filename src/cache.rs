use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::error::{CacheError, SchedulerError};
use crate::tm::{TaskHandle, TaskManager};

/// Key/value store with sliding expiration
///
/// Every entry has a pending deletion task on the [`TaskManager`]. Reading
/// an entry pushes that deletion `ttl` into the future.
pub struct TtlCache<V> {
    inner: Arc<CacheInner<V>>,
}

struct CacheInner<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    manager: Arc<TaskManager>,
    generation: AtomicU64,
}

struct CacheEntry<V> {
    value: V,
    ttl: Duration,
    expiry: Mutex<Expiry>,
}

/// The live deletion task of an entry. A deletion only removes the entry
/// while the generation still matches.
struct Expiry {
    handle: TaskHandle,
    generation: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration, expiry: Expiry) -> Self {
        CacheEntry {
            value,
            ttl,
            expiry: Mutex::new(expiry),
        }
    }

    fn expiry(&self) -> MutexGuard<'_, Expiry> {
        self.expiry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache backed by its own task manager
    pub fn new(name: impl Into<String>) -> Result<Self, CacheError> {
        let manager = TaskManager::new(name)?;
        Ok(Self::with_manager(Arc::new(manager)))
    }

    /// Create a cache that schedules expirations on a shared manager
    pub fn with_manager(manager: Arc<TaskManager>) -> Self {
        TtlCache {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(HashMap::new()),
                manager,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Insert a new entry expiring `ttl` from now
    ///
    /// Fails with [`CacheError::DuplicateKey`] if the key is present; use
    /// [`set`](Self::set) to overwrite.
    pub fn add(&self, key: impl Into<String>, value: V, ttl: Duration) -> Result<(), CacheError> {
        let key = key.into();
        let mut entries = self.inner.write_entries();
        if entries.contains_key(&key) {
            return Err(CacheError::DuplicateKey(key));
        }

        let expiry = CacheInner::schedule_expiry(&self.inner, &key, ttl)?;
        entries.insert(key, CacheEntry::new(value, ttl, expiry));
        Ok(())
    }

    /// Insert or replace an entry, cancelling the replaced entry's expiration
    ///
    /// Returns the previous value. If the new expiration cannot be scheduled
    /// the previous entry is left untouched.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) -> Result<Option<V>, CacheError> {
        let key = key.into();
        let mut entries = self.inner.write_entries();

        let expiry = CacheInner::schedule_expiry(&self.inner, &key, ttl)?;
        let previous = entries.insert(key, CacheEntry::new(value, ttl, expiry));

        Ok(previous.map(|old| {
            self.inner.manager.cancel(&old.expiry().handle);
            old.value
        }))
    }

    /// Read an entry and slide its expiration forward by its ttl
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.inner.read_entries();
        let entry = entries.get(key)?;
        let mut expiry = entry.expiry();

        match CacheInner::schedule_expiry(&self.inner, key, entry.ttl) {
            Ok(next) => {
                if !self.inner.manager.cancel(&expiry.handle) {
                    log::warn!(
                        "Expiration of '{}' in '{}' already fired, keeping entry under a new deadline",
                        key,
                        self.inner.manager.name()
                    );
                }
                *expiry = next;
            }
            Err(err) => {
                log::warn!(
                    "Failed to extend expiration of '{}', keeping original deadline: {}",
                    key,
                    err
                );
            }
        }

        Some(entry.value.clone())
    }

    /// Remove an entry now, cancelling its pending expiration
    pub fn delete(&self, key: &str) -> Option<V> {
        let removed = self.inner.write_entries().remove(key)?;
        if !self.inner.manager.cancel(&removed.expiry().handle) {
            log::debug!("Expiration of deleted key '{}' was not pending", key);
        }
        Some(removed.value)
    }

    /// Presence check that does not extend the entry's ttl
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read_entries().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.read_entries().keys().cloned().collect()
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.inner.manager
    }
}

impl<V> CacheInner<V>
where
    V: Send + Sync + 'static,
{
    fn schedule_expiry(this: &Arc<Self>, key: &str, ttl: Duration) -> Result<Expiry, SchedulerError> {
        let generation = this.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cache = Arc::downgrade(this);
        let owned_key = key.to_string();

        let handle = this.manager.submit_after(
            move || {
                if let Some(cache) = cache.upgrade() {
                    cache.expire(&owned_key, generation);
                }
            },
            ttl,
        )?;

        Ok(Expiry { handle, generation })
    }

    fn expire(&self, key: &str, generation: u64) {
        let mut entries = self.write_entries();
        let current = entries
            .get(key)
            .map(|entry| entry.expiry().generation == generation)
            .unwrap_or(false);

        if current {
            entries.remove(key);
            log::debug!("Key '{}' expired in '{}'", key, self.manager.name());
        }
    }
}

impl<V> CacheInner<V> {
    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> fmt::Display for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.inner.read_entries();
        writeln!(f, "total {} cache items", entries.len())?;
        for key in entries.keys() {
            write!(f, "{},", key)?;
        }
        writeln!(f)?;
        write!(f, "{:?}", self.inner.manager)
    }
}

impl<V> fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.inner.read_entries().len())
            .field("manager", &self.inner.manager)
            .finish()
    }
}
