use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;

use super::error::RoutingError;
use super::{RoadRoute, RoutingProvider};
use crate::geo::Coordinate;

/// Coordinates rounded to 4 decimals (about 10 m), origin then destination.
type CacheKey = (i64, i64, i64, i64);

fn cache_key(origin: Coordinate, destination: Coordinate) -> CacheKey {
    let scaled = |value: f64| (value * 10_000.0).round() as i64;
    (
        scaled(origin.lat),
        scaled(origin.lng),
        scaled(destination.lat),
        scaled(destination.lng),
    )
}

/// LRU-cached wrapper around any [`RoutingProvider`].
///
/// Entries expire after `ttl`. Failed lookups are never cached.
pub struct CachedRoutingProvider {
    inner: Arc<dyn RoutingProvider>,
    cache: Mutex<LruCache<CacheKey, (RoadRoute, Instant)>>,
    ttl: Duration,
}

impl CachedRoutingProvider {
    pub fn new(inner: Arc<dyn RoutingProvider>, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<RoadRoute> {
        let mut cache = self.cache.lock().ok()?;
        let entry = cache.get(key).copied();
        match entry {
            Some((route, stored_at)) if stored_at.elapsed() < self.ttl => Some(route),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl RoutingProvider for CachedRoutingProvider {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RoadRoute, RoutingError> {
        let key = cache_key(origin, destination);
        if let Some(route) = self.lookup(&key) {
            return Ok(route);
        }

        let route = self.inner.route(origin, destination).await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, (route, Instant::now()));
        }
        Ok(route)
    }
}
