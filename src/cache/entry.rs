//! Cached response envelope and its expiry rule.

use std::time::Duration;
use tokio::time::Instant;

/// A stored value together with the time it was written and how long it lives.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
  /// The cached value
  pub data: T,
  /// When the entry was written
  pub timestamp: Instant,
  /// How long after `timestamp` the entry stays fresh
  pub cache_time: Duration,
}

impl<T> CacheEntry<T> {
  /// Create an entry stamped with the current time.
  pub fn new(data: T, cache_time: Duration) -> Self {
    Self {
      data,
      timestamp: Instant::now(),
      cache_time,
    }
  }

  /// Check whether the entry has outlived its cache time as of `now`.
  ///
  /// An entry is still fresh at exactly `timestamp + cache_time`.
  pub fn is_expired_at(&self, now: Instant) -> bool {
    now.saturating_duration_since(self.timestamp) > self.cache_time
  }

  /// Check whether the entry has outlived its cache time.
  pub fn is_expired(&self) -> bool {
    self.is_expired_at(Instant::now())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_fresh_until_cache_time_elapses() {
    let entry = CacheEntry::new("value", Duration::from_millis(100));

    assert!(!entry.is_expired());

    tokio::time::advance(Duration::from_millis(100)).await;
    // Boundary is inclusive
    assert!(!entry.is_expired());

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(entry.is_expired());
  }

  #[test]
  fn test_is_expired_at_is_pure() {
    let entry = CacheEntry::new(1u32, Duration::from_secs(1));
    let snapshot = entry.clone();

    let later = entry.timestamp + Duration::from_secs(2);
    assert!(entry.is_expired_at(later));
    assert!(!entry.is_expired_at(entry.timestamp));
    assert_eq!(entry, snapshot);
  }

  #[test]
  fn test_zero_cache_time() {
    let entry = CacheEntry::new((), Duration::ZERO);
    assert!(!entry.is_expired_at(entry.timestamp));
    assert!(entry.is_expired_at(entry.timestamp + Duration::from_nanos(1)));
  }
}
