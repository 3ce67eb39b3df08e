use crate::bucket::{Decision, TokenBucket};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_SHARDS: usize = 64;
pub const DEFAULT_SHARD_CAPACITY: usize = 10_000;

/// One independently locked partition of the key space.
struct Shard {
    buckets: Mutex<LruCache<String, TokenBucket>>,
}

/// Sharded token-bucket rate limiter.
///
/// Built once at startup and shared by reference. Each shard's lock covers
/// the whole create/evict/refill/consume sequence, so concurrent checks on
/// the same key never lose updates; distinct shards never contend.
pub struct RateLimiter {
    shards: Box<[Shard]>,
    shard_capacity: NonZeroUsize,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SHARDS, DEFAULT_SHARD_CAPACITY)
    }

    /// A limiter with `shards` partitions of at most `shard_capacity`
    /// buckets each. Zero values are raised to one.
    pub fn with_capacity(shards: usize, shard_capacity: usize) -> Self {
        let shard_capacity = NonZeroUsize::new(shard_capacity).unwrap_or(NonZeroUsize::MIN);
        let shards: Box<[Shard]> = (0..shards.max(1))
            .map(|_| Shard {
                buckets: Mutex::new(LruCache::new(shard_capacity)),
            })
            .collect();
        info!(
            shards = shards.len(),
            shard_capacity = shard_capacity.get(),
            "Rate limiter initialised"
        );
        Self {
            shards,
            shard_capacity,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_capacity(&self) -> usize {
        self.shard_capacity.get()
    }

    /// Shard owning `key`: FNV-1a of the key modulo the shard count.
    pub fn shard_index(&self, key: &str) -> usize {
        fnv1a(key.as_bytes()) as usize % self.shards.len()
    }

    /// Check and consume one token for `key`.
    pub fn check(&self, key: &str, requests_per_minute: u32, burst_limit: u32) -> Decision {
        self.check_at(key, requests_per_minute, burst_limit, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(
        &self,
        key: &str,
        requests_per_minute: u32,
        burst_limit: u32,
        now: Instant,
    ) -> Decision {
        let shard = &self.shards[self.shard_index(key)];
        let mut buckets = shard.buckets.lock();

        if !buckets.contains(key) && buckets.len() >= self.shard_capacity.get() {
            if let Some((evicted, _)) = buckets.pop_lru() {
                debug!(evicted = %evicted, "Rate-limit shard full, evicted LRU bucket");
            }
        }

        let bucket = buckets.get_or_insert_mut(key.to_owned(), || {
            TokenBucket::new(requests_per_minute, burst_limit, now)
        });
        bucket.retune(requests_per_minute, burst_limit);
        bucket.check(now)
    }

    /// Whether a bucket currently exists for `key`. Does not touch LRU order.
    pub fn contains(&self, key: &str) -> bool {
        self.shards[self.shard_index(key)].buckets.lock().contains(key)
    }

    /// Stored tokens for `key`, without refilling or touching LRU order.
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.shards[self.shard_index(key)]
            .buckets
            .lock()
            .peek(key)
            .map(TokenBucket::tokens)
    }

    /// Number of buckets in one shard.
    pub fn shard_len(&self, index: usize) -> usize {
        self.shards.get(index).map_or(0, |s| s.buckets.lock().len())
    }

    /// Total live buckets. Locks every shard in turn; not for the hot path.
    pub fn bucket_count(&self) -> usize {
        self.shards.iter().map(|s| s.buckets.lock().len()).sum()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u32::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_vectors() {
        assert_eq!(fnv1a(b""), 0x811c_9dc5);
        assert_eq!(fnv1a(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn default_pool_has_64_shards() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.shard_count(), 64);
        assert_eq!(limiter.shard_capacity(), 10_000);
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn zero_sizes_are_raised_to_one() {
        let limiter = RateLimiter::with_capacity(0, 0);
        assert_eq!(limiter.shard_count(), 1);
        assert_eq!(limiter.shard_capacity(), 1);
    }

    #[test]
    fn buckets_are_created_lazily() {
        let limiter = RateLimiter::new();
        assert!(!limiter.contains("k"));
        limiter.check("k", 60, 10);
        assert!(limiter.contains("k"));
        assert_eq!(limiter.tokens("k"), Some(9.0));
        assert_eq!(limiter.bucket_count(), 1);
    }
}
