use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use moka::sync::Cache;

use crate::manifest::{ItemKind, Manifest};
use crate::range::DateRange;

/// Upper bound on cached (kind, window) reads.
pub const DEFAULT_CACHE_CAPACITY: u64 = 1000;

/// Called with the kinds whose coverage just changed.
pub type InvalidationHook = Box<dyn Fn(&[ItemKind]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: Option<ItemKind>,
    window: Option<DateRange>,
}

/// Short-lived cache of manifest list reads, keyed by kind and window.
///
/// Entries expire after `ttl`. Any manifest write must call
/// [`ManifestCache::invalidate`], which also runs the registered hooks.
pub struct ManifestCache {
    ttl: Duration,
    entries: Cache<CacheKey, Vec<Manifest>>,
    /// Bumped on every invalidation. A read that started under an older
    /// generation may have raced a write and is not cached. Held across
    /// inserts and invalidations so the two never interleave.
    generation: Mutex<u64>,
    hooks: Mutex<Vec<InvalidationHook>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ManifestCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Cache::builder()
                .max_capacity(DEFAULT_CACHE_CAPACITY)
                .time_to_live(ttl)
                .build(),
            generation: Mutex::new(0),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self, kind: Option<ItemKind>, window: Option<&DateRange>) -> Option<Vec<Manifest>> {
        self.entries.get(&CacheKey {
            kind,
            window: window.copied(),
        })
    }

    /// Current generation; pass it back to [`put`](Self::put) after the read.
    pub fn generation(&self) -> u64 {
        *lock(&self.generation)
    }

    /// Store a read made while the cache was at `generation`. Dropped if an
    /// invalidation happened since.
    pub fn put(
        &self,
        kind: Option<ItemKind>,
        window: Option<&DateRange>,
        manifests: &[Manifest],
        generation: u64,
    ) {
        if self.ttl.is_zero() {
            return;
        }
        let current = lock(&self.generation);
        if *current == generation {
            let key = CacheKey {
                kind,
                window: window.copied(),
            };
            self.entries.insert(key, manifests.to_vec());
        }
    }

    /// Drop every entry that could hold manifests of `kinds`, then notify hooks.
    pub fn invalidate(&self, kinds: &[ItemKind]) {
        {
            let mut current = lock(&self.generation);
            *current += 1;
            let stale: Vec<CacheKey> = self
                .entries
                .iter()
                .map(|(key, _)| *key)
                .filter(|key| !matches!(key.kind, Some(k) if !kinds.contains(&k)))
                .collect();
            for key in &stale {
                self.entries.invalidate(key);
            }
        }
        for hook in lock(&self.hooks).iter() {
            hook(kinds);
        }
    }

    pub fn on_invalidate(&self, hook: InvalidationHook) {
        lock(&self.hooks).push(hook);
    }
}
