//! In-process memoization cache
//!
//! Entries live in a sharded [`DashMap`], so lookups for different keys never
//! contend on a global lock. A missing or expired entry is replaced by a
//! pending slot holding a shared generation future: every caller arriving
//! while it runs awaits the same future, so each key has at most one
//! generation in flight.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use log::{debug, trace, warn};
use serde_json::Value as JsonValue;

use crate::core::{ActError, ActResult, CachePolicy, Generator, MemoCache};

type SharedGeneration = Shared<BoxFuture<'static, ActResult<JsonValue>>>;

enum Slot {
    Ready {
        value: JsonValue,
        stored_at: Instant,
        ttl: Duration,
    },
    Pending(SharedGeneration),
}

enum Lookup {
    Hit(JsonValue),
    Join(SharedGeneration),
    Expired,
}

#[derive(Default, Clone)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Slot>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored or pending entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop one entry. A generation in flight for it keeps running for its waiters.
    pub fn drop_key(&self, segment: &str, key: &str) -> bool {
        self.entries.remove(&entry_id(segment, key)).is_some()
    }

    /// Remove every expired entry, returning how many were evicted
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| match slot {
            Slot::Ready { stored_at, ttl, .. } => stored_at.elapsed() < *ttl,
            Slot::Pending(_) => true,
        });
        before - self.entries.len()
    }

    fn start(&self, id: String, policy: CachePolicy, generator: Generator) -> SharedGeneration {
        let entries = self.entries.clone();
        async move {
            let outcome = match tokio::time::timeout(policy.generate_timeout, generator).await {
                Ok(result) => result,
                Err(_) => Err(ActError::RegenerationTimeout {
                    key: id.clone(),
                    timeout: policy.generate_timeout,
                }),
            };

            match &outcome {
                Ok(value) => {
                    debug!("Cached '{id}' for {}ms", policy.expires_in.as_millis());
                    entries.insert(
                        id,
                        Slot::Ready {
                            value: value.clone(),
                            stored_at: Instant::now(),
                            ttl: policy.expires_in,
                        },
                    );
                }
                Err(e) => {
                    warn!("Generation of '{id}' failed: {e}");
                    entries.remove(&id);
                }
            }
            outcome
        }
        .boxed()
        .shared()
    }
}

fn entry_id(segment: &str, key: &str) -> String {
    format!("{segment}:{key}")
}

#[async_trait]
impl MemoCache for MemoryCache {
    async fn get_or_generate(
        &self,
        segment: &str,
        key: &str,
        policy: CachePolicy,
        generator: Generator,
    ) -> ActResult<JsonValue> {
        let id = entry_id(segment, key);

        let generation = match self.entries.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let lookup = match occupied.get() {
                    Slot::Ready {
                        value,
                        stored_at,
                        ttl,
                    } if stored_at.elapsed() < *ttl => Lookup::Hit(value.clone()),
                    Slot::Pending(generation) => Lookup::Join(generation.clone()),
                    Slot::Ready { .. } => Lookup::Expired,
                };
                match lookup {
                    Lookup::Hit(value) => {
                        trace!("Cache hit for '{id}'");
                        return Ok(value);
                    }
                    Lookup::Join(generation) => {
                        trace!("Joining in-flight generation of '{id}'");
                        generation
                    }
                    Lookup::Expired => {
                        trace!("Cache entry '{id}' expired, regenerating");
                        let generation = self.start(id.clone(), policy, generator);
                        occupied.insert(Slot::Pending(generation.clone()));
                        generation
                    }
                }
            }
            Entry::Vacant(vacant) => {
                trace!("Cache miss for '{id}'");
                let generation = self.start(id.clone(), policy, generator);
                vacant.insert(Slot::Pending(generation.clone()));
                generation
            }
        };

        generation.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn policy(expires_ms: u64, timeout_ms: u64) -> CachePolicy {
        CachePolicy {
            expires_in: Duration::from_millis(expires_ms),
            generate_timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn counting(counter: &Arc<AtomicUsize>, delay_ms: u64) -> Generator {
        let counter = counter.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "id": n }))
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_hit_skips_generation() {
        let cache = MemoryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_generate("#m", "k", policy(1000, 1000), counting(&counter, 0))
            .await
            .unwrap();
        let second = cache
            .get_or_generate("#m", "k", policy(1000, 1000), counting(&counter, 0))
            .await
            .unwrap();

        assert_eq!(first, json!({ "id": 1 }));
        assert_eq!(second, first);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_segments_are_isolated() {
        let cache = MemoryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_generate("#a", "k", policy(1000, 1000), counting(&counter, 0))
            .await
            .unwrap();
        cache
            .get_or_generate("#b", "k", policy(1000, 1000), counting(&counter, 0))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_generation() {
        let cache = MemoryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let calls = (0..5).map(|_| {
            cache.get_or_generate("#m", "k", policy(1000, 1000), counting(&counter, 30))
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), json!({ "id": 1 }));
        }
    }

    #[tokio::test]
    async fn test_expired_entry_is_regenerated() {
        let cache = MemoryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_generate("#m", "k", policy(10, 1000), counting(&counter, 0))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.purge_expired(), 1);

        let again = cache
            .get_or_generate("#m", "k", policy(10, 1000), counting(&counter, 0))
            .await
            .unwrap();
        assert_eq!(again, json!({ "id": 2 }));
    }

    #[tokio::test]
    async fn test_slow_generation_times_out() {
        let cache = MemoryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let result = cache
            .get_or_generate("#m", "k", policy(1000, 10), counting(&counter, 200))
            .await;

        assert!(matches!(result, Err(ActError::RegenerationTimeout { .. })));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = MemoryCache::new();
        let failing: Generator =
            async { Err::<JsonValue, _>(ActError::Invocation("boom".to_string())) }.boxed();

        let result = cache
            .get_or_generate("#m", "k", policy(1000, 1000), failing)
            .await;
        assert_eq!(result, Err(ActError::Invocation("boom".to_string())));
        assert!(cache.is_empty());

        let counter = Arc::new(AtomicUsize::new(0));
        let value = cache
            .get_or_generate("#m", "k", policy(1000, 1000), counting(&counter, 0))
            .await
            .unwrap();
        assert_eq!(value, json!({ "id": 1 }));
    }

    #[tokio::test]
    async fn test_drop_key_forces_regeneration() {
        let cache = MemoryCache::new();
        let counter = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_generate("#m", "k", policy(1000, 1000), counting(&counter, 0))
            .await
            .unwrap();
        assert!(cache.drop_key("#m", "k"));
        cache
            .get_or_generate("#m", "k", policy(1000, 1000), counting(&counter, 0))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
