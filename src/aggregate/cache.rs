use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

/// Expired entries are swept on insert once the map grows past this size.
const SWEEP_THRESHOLD: usize = 1000;

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// Memo table with a fixed time-to-live and no other eviction.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The cached value if present and still within its TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        let now = self.clock.now();
        let mut entries = self.lock();
        if entries.len() > SWEEP_THRESHOLD {
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            debug!(removed = before - entries.len(), "swept expired cache entries");
        }
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: now,
                ttl: self.ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64) -> (TtlCache<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (
            TtlCache::with_clock(Duration::from_secs(ttl_secs), clock.clone()),
            clock,
        )
    }

    #[test]
    fn hit_within_ttl() {
        let (cache, clock) = cache(60);
        cache.insert("k", 1);
        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get("k"), Some(1));
    }

    #[test]
    fn miss_at_ttl_boundary_and_entry_removed() {
        let (cache, clock) = cache(60);
        cache.insert("k", 1);
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn reinsert_refreshes_timestamp() {
        let (cache, clock) = cache(60);
        cache.insert("k", 1);
        clock.advance(Duration::from_secs(50));
        cache.insert("k", 2);
        clock.advance(Duration::from_secs(50));
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn sweep_drops_only_expired_entries_past_threshold() {
        let (cache, clock) = cache(60);
        for i in 0..=SWEEP_THRESHOLD {
            cache.insert(format!("old-{i}"), 0);
        }
        clock.advance(Duration::from_secs(30));
        cache.insert("fresh", 1);
        clock.advance(Duration::from_secs(30));
        // Old entries are now expired; the fresh one is not.
        cache.insert("trigger", 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("fresh"), Some(1));
    }

    #[test]
    fn below_threshold_nothing_is_swept() {
        let (cache, clock) = cache(1);
        cache.insert("a", 1);
        clock.advance(Duration::from_secs(5));
        cache.insert("b", 2);
        assert_eq!(cache.len(), 2);
    }
}
