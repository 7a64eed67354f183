//! Resource content cache
//!
//! Internally locked, capacity bounded. A full cache evicts its least
//! recently accessed entry before inserting a new URI.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relaymcp_core::{ContentItem, StringMap};
use tracing::{debug, warn};

#[derive(Debug)]
struct CacheEntry {
    items: Vec<ContentItem>,
    expires_at: Option<Instant>,
    last_access: u64,
}

#[derive(Debug)]
struct CacheState {
    entries: StringMap<CacheEntry>,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// TTL-bounded cache of `read_resource` results
#[derive(Debug)]
pub struct ResourceCache {
    capacity: usize,
    default_ttl: Duration,
    state: Mutex<CacheState>,
}

impl ResourceCache {
    /// Cache holding at most `capacity` URIs, entries living `default_ttl`
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let entries = StringMap::with_capacity(capacity).unwrap_or_else(|e| {
            warn!("Resource cache capacity {} rejected ({}), using default", capacity, e);
            StringMap::new()
        });
        Self {
            capacity: capacity.max(1),
            default_ttl,
            state: Mutex::new(CacheState { entries, clock: 0 }),
        }
    }

    /// Cached items for `uri`; expired entries are dropped on lookup
    pub fn get(&self, uri: &str) -> Option<Vec<ContentItem>> {
        self.get_at(uri, Instant::now())
    }

    fn get_at(&self, uri: &str, now: Instant) -> Option<Vec<ContentItem>> {
        let mut state = self.state.lock();
        let tick = state.tick();
        let expired = match state.entries.get_mut(uri) {
            None => return None,
            Some(entry) if entry.expires_at.is_some_and(|at| now >= at) => true,
            Some(entry) => {
                entry.last_access = tick;
                return Some(entry.items.clone());
            }
        };
        if expired {
            debug!("Cache entry for {} expired", uri);
            state.entries.remove(uri);
        }
        None
    }

    /// Store items for `uri`
    ///
    /// `ttl_secs` of 0 uses the cache default; a negative value never
    /// expires.
    pub fn put(&self, uri: &str, items: Vec<ContentItem>, ttl_secs: i64) {
        self.put_at(uri, items, ttl_secs, Instant::now());
    }

    fn put_at(&self, uri: &str, items: Vec<ContentItem>, ttl_secs: i64, now: Instant) {
        // Lifetimes past the clock's range never expire
        let expires_at = match ttl_secs {
            0 => now.checked_add(self.default_ttl),
            ttl if ttl < 0 => None,
            ttl => now.checked_add(Duration::from_secs(ttl.unsigned_abs())),
        };

        let mut state = self.state.lock();
        let tick = state.tick();
        if !state.entries.contains_key(uri) && state.entries.len() >= self.capacity {
            evict_one(&mut state.entries);
        }
        let entry = CacheEntry {
            items,
            expires_at,
            last_access: tick,
        };
        if let Err(e) = state.entries.put(uri.to_string(), entry) {
            warn!("Failed to cache resource {}: {}", uri, e);
        }
    }

    /// Forget `uri`; returns whether it was cached
    pub fn invalidate(&self, uri: &str) -> bool {
        self.state.lock().entries.remove(uri).is_some()
    }

    /// Drop every expired entry; returns how many were removed
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Instant::now())
    }

    fn prune_expired_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| entry.expires_at.is_none_or(|at| now < at));
        before - state.entries.len()
    }

    /// Number of cached URIs
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached URIs
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn evict_one(entries: &mut StringMap<CacheEntry>) {
    let victim = entries
        .iter()
        .min_by_key(|(_, entry)| entry.last_access)
        .map(|(uri, _)| uri.clone());
    if let Some(uri) = victim {
        debug!("Evicting {} from resource cache", uri);
        entries.remove(&uri);
    }
}
