//! Process-wide suggestion cache
//!
//! Entries are keyed by normalized country and meal type and live for the
//! rest of the process unless a capacity bound evicts them (oldest first).
//! Concurrent misses for the same key share one fetch: the first caller
//! becomes the leader, everyone else waits on a watch channel for its result.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use super::types::SuggestionSet;

/// Normalized cache key
///
/// Both parts are lowercased and otherwise kept as given. They are stored
/// separately, so a country containing `-` cannot collide with another pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    country: String,
    meal_type: String,
}

impl CacheKey {
    pub fn new(country: &str, meal_type: &str) -> Self {
        Self {
            country: country.to_lowercase(),
            meal_type: meal_type.to_lowercase(),
        }
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn meal_type(&self) -> &str {
        &self.meal_type
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.country, self.meal_type)
    }
}

type Pending = watch::Receiver<Option<Arc<SuggestionSet>>>;

#[derive(Default)]
struct Entries {
    map: HashMap<CacheKey, Arc<SuggestionSet>>,
    order: VecDeque<CacheKey>,
}

/// Shared suggestion cache
///
/// Only validated sets are stored; failures are never cached.
#[derive(Default)]
pub struct SuggestionCache {
    entries: Mutex<Entries>,
    in_flight: Mutex<HashMap<CacheKey, Pending>>,
    capacity: Option<NonZeroUsize>,
}

impl fmt::Debug for SuggestionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuggestionCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl SuggestionCache {
    /// Unbounded cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` entries
    pub fn with_capacity(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<SuggestionSet>> {
        lock(&self.entries).map.get(key).cloned()
    }

    /// Store a set, replacing any existing entry for the key
    pub fn put(&self, key: CacheKey, set: Arc<SuggestionSet>) {
        let mut entries = lock(&self.entries);
        if entries.map.insert(key.clone(), set).is_none() {
            entries.order.push_back(key);
        }

        if let Some(capacity) = self.capacity {
            while entries.order.len() > capacity.get() {
                if let Some(oldest) = entries.order.pop_front() {
                    log::debug!("[Cache] EVICT {}", oldest);
                    entries.map.remove(&oldest);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached set or run `fetch` to produce it
    ///
    /// At most one `fetch` runs per key at a time. Callers arriving while it
    /// runs get its result; if it yields `None` (or the leader is dropped)
    /// they get `None` and nothing is cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, fetch: F) -> Option<Arc<SuggestionSet>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<SuggestionSet>>,
    {
        let sender = {
            let mut in_flight = lock(&self.in_flight);
            if let Some(hit) = self.get(key) {
                log::debug!("[Cache] HIT for {}", key);
                return Some(hit);
            }

            match in_flight.get(key) {
                Some(pending) => Err(pending.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key.clone(), rx);
                    Ok(tx)
                }
            }
        };

        match sender {
            Ok(tx) => {
                log::debug!("[Cache] MISS for {}", key);
                let _guard = InFlightGuard {
                    in_flight: &self.in_flight,
                    key,
                };

                let set = Arc::new(fetch().await?);
                self.put(key.clone(), Arc::clone(&set));
                tx.send_replace(Some(Arc::clone(&set)));
                Some(set)
            }
            Err(mut pending) => {
                log::debug!("[Cache] WAIT for {}", key);
                let result = pending.wait_for(|value| value.is_some()).await;
                result.ok().and_then(|value| value.clone())
            }
        }
    }
}

/// Clears the in-flight marker when the leader finishes, fails or is dropped
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<CacheKey, Pending>>,
    key: &'a CacheKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(self.key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod cache_tests;
