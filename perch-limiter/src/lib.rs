//! Token-bucket quotas keyed by opaque strings.
//!
//! The limiter knows nothing about HTTP or plugins: callers hand it a key
//! and a `(requests_per_minute, burst_limit)` pair and get a [`Decision`]
//! back. Memory is bounded by `shards × shard_capacity` buckets; the
//! least-recently-touched bucket of a full shard is evicted to make room.

pub mod bucket;
pub mod limiter;

pub use bucket::{Decision, TokenBucket};
pub use limiter::{DEFAULT_SHARD_CAPACITY, DEFAULT_SHARDS, RateLimiter};
