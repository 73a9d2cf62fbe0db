//! In-memory cache storage with lazy per-entry expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::entry::CacheEntry;

/// Unbounded, process-lifetime key/value store of response envelopes.
///
/// Expired entries are removed when they are next looked up. `cleanup` and
/// the optional sweeper remove them proactively.
pub struct MemoryCache<T> {
  entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> MemoryCache<T> {
  /// Create an empty cache.
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
    }
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
    // A panic while holding the lock cannot leave the map half-written
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Get a fresh entry, dropping it if it has expired.
  pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
    let mut entries = self.entries();
    let entry = entries.get(key)?;

    if entry.is_expired() {
      entries.remove(key);
      debug!(remaining = entries.len(), "Evicted expired cache entry");
      return None;
    }

    Some(entry.clone())
  }

  /// Insert or overwrite an entry, stamped with the current time.
  pub fn set(&self, key: impl Into<String>, data: T, cache_time: Duration) {
    self
      .entries()
      .insert(key.into(), CacheEntry::new(data, cache_time));
  }

  /// Remove every entry.
  pub fn clear(&self) {
    self.entries().clear();
  }

  /// Check an entry against the current time without touching the store.
  pub fn is_expired(&self, entry: &CacheEntry<T>) -> bool {
    entry.is_expired()
  }

  /// Number of stored entries, expired ones included.
  pub fn size(&self) -> usize {
    self.entries().len()
  }

  /// Remove all expired entries. Returns how many were removed.
  pub fn cleanup(&self) -> usize {
    let now = Instant::now();
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired_at(now));
    before - entries.len()
  }
}

impl<T: Clone + Send + 'static> MemoryCache<T> {
  /// Run `cleanup` every `interval` on the current tokio runtime.
  ///
  /// The task ends on its own once the cache is dropped.
  pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
    let cache: Weak<Self> = Arc::downgrade(self);

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      // First tick completes immediately
      ticker.tick().await;

      loop {
        ticker.tick().await;
        let Some(cache) = cache.upgrade() else {
          break;
        };
        let removed = cache.cleanup();
        if removed > 0 {
          debug!(removed, "Swept expired cache entries");
        }
      }
    })
  }
}

impl<T: Clone> Default for MemoryCache<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> std::fmt::Debug for MemoryCache<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let size = self
      .entries
      .lock()
      .map(|entries| entries.len())
      .unwrap_or_default();
    f.debug_struct("MemoryCache")
      .field("size", &size)
      .finish_non_exhaustive()
  }
}
