//! Time-windowed cache keyed by entity version
//!
//! Entries expire after a fixed window or as soon as they are looked up with a
//! newer version of the entity they were derived from. The clock is injected so
//! expiry can be tested without sleeping.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

/// Default lifetime of a cache entry
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Source of the current time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant
    fn now(&self) -> Instant;
}

/// The monotonic system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }
}

impl ManualClock {
    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Entry<V> {
    value: V,
    version: u64,
    expires_at: Instant,
}

/// A map of `(value, version, expiry)` entries
pub struct TimedCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> fmt::Debug for TimedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedCache")
            .field("ttl", &self.ttl)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<K, V> Default for TimedCache<K, V>
where
    K: Eq + Hash + fmt::Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash + fmt::Debug,
    V: Clone,
{
    /// Cache with the system clock
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Cache with an explicit clock
    #[must_use]
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The value stored for `key` if it was computed from `version` and has
    /// not expired. Stale entries are dropped.
    pub fn get(&self, key: &K, version: u64) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.version == version && now < entry.expires_at => {
                debug!(?key, version, "cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!(?key, version, "cache entry stale");
                entries.remove(key);
                None
            }
            None => {
                debug!(?key, version, "cache miss");
                None
            }
        }
    }

    /// Store `value` as computed from `version`
    pub fn insert(&self, key: K, version: u64, value: V) {
        let expires_at = self.clock.now() + self.ttl;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            Entry {
                value,
                version,
                expires_at,
            },
        );
    }

    /// Drop every entry matching `predicate`
    pub fn invalidate_where(&self, predicate: impl Fn(&K) -> bool) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|key, _| !predicate(key));
    }

    /// Drop expired entries
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| now < entry.expires_at);
    }

    /// Number of stored entries, expired or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (TimedCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (
            TimedCache::with_clock(Duration::from_secs(600), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_hit_within_window() {
        let (cache, clock) = cache();
        cache.insert("review".to_string(), 1, 42);
        clock.advance(Duration::from_secs(599));
        assert_eq!(cache.get(&"review".to_string(), 1), Some(42));
    }

    #[test]
    fn test_expires_after_window() {
        let (cache, clock) = cache();
        cache.insert("review".to_string(), 1, 42);
        clock.advance(Duration::from_secs(600));
        assert_eq!(cache.get(&"review".to_string(), 1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_version_bump_invalidates() {
        let (cache, _) = cache();
        cache.insert("review".to_string(), 1, 42);
        assert_eq!(cache.get(&"review".to_string(), 2), None);
        assert_eq!(cache.get(&"review".to_string(), 1), None);
    }

    #[test]
    fn test_invalidate_where_and_purge() {
        let (cache, clock) = cache();
        cache.insert("a".to_string(), 1, 1);
        cache.insert("b".to_string(), 1, 2);
        cache.invalidate_where(|k| k == "a");
        assert_eq!(cache.len(), 1);

        clock.advance(Duration::from_secs(601));
        cache.insert("c".to_string(), 1, 3);
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"c".to_string(), 1), Some(3));
    }
}
