//! Per-client admission control.
//!
//! A continuous token bucket per client identifier (normally the peer IP).
//!
//! # Locking
//! ```text
//! registry: RwLock<Registry { buckets, recency }>
//!     known client  → read lock  → bucket mutex → refill + consume
//!     new client    → write lock → evict if full → insert (exactly once) → refill + consume
//!     sweep         → write lock
//! ```
//! The registry lock is always taken before a bucket lock and is held while
//! the bucket is updated, so a sweep can never drop a bucket that another
//! request is in the middle of charging.
//!
//! # Eviction
//! `recency` orders clients by the instant they were last indexed. Known
//! clients are charged under the read lock and never touch it, so the index
//! goes stale; eviction pops the oldest entry and, if the bucket has been
//! used since, re-indexes it at its real last use and tries the next one.
//! Each re-index is paid for by an earlier request, so eviction costs
//! amortized O(log n).

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Continuous token bucket.
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        // Never move backwards: callers racing with stale instants only
        // observe zero elapsed time.
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// True once the bucket would be full again, i.e. forgetting it is unobservable.
    fn is_refilled_at(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens + elapsed * self.refill_rate >= self.capacity
    }
}

/// Position of a client in the recency index.
type RecencyKey = (Instant, u64);

#[derive(Debug)]
struct Slot {
    bucket: Mutex<TokenBucket>,
    indexed_at: RecencyKey,
}

#[derive(Debug, Default)]
struct Registry {
    buckets: HashMap<String, Slot>,
    recency: BTreeMap<RecencyKey, String>,
    seq: u64,
}

impl Registry {
    fn next_key(&mut self, at: Instant) -> RecencyKey {
        self.seq += 1;
        (at, self.seq)
    }

    fn insert(&mut self, client: &str, bucket: TokenBucket) -> &mut Slot {
        let key = self.next_key(bucket.last_refill);
        self.recency.insert(key, client.to_string());
        self.buckets.entry(client.to_string()).or_insert(Slot {
            bucket: Mutex::new(bucket),
            indexed_at: key,
        })
    }

    /// Remove the least recently used client.
    ///
    /// Returns the evicted client and the number of index entries visited.
    fn evict_least_recent(&mut self) -> (Option<String>, usize) {
        let mut visited = 0;
        while let Some((key, client)) = self.recency.pop_first() {
            visited += 1;
            let Some(slot) = self.buckets.get_mut(&client) else {
                continue;
            };
            let last_used = slot.bucket.get_mut().last_refill;
            if last_used > key.0 {
                self.seq += 1;
                let fresh = (last_used, self.seq);
                slot.indexed_at = fresh;
                self.recency.insert(fresh, client);
                continue;
            }
            self.buckets.remove(&client);
            return (Some(client), visited);
        }
        (None, visited)
    }
}

/// Token-bucket rate limiter keyed by client identifier.
#[derive(Debug)]
pub struct ClientRateLimiter {
    registry: RwLock<Registry>,
    refill_rate: f64,
    capacity: f64,
    max_clients: usize,
}

impl ClientRateLimiter {
    /// Create a limiter refilling `refill_rate` tokens per second up to `burst`.
    pub fn new(refill_rate: f64, burst: u32) -> Self {
        Self::with_max_clients(refill_rate, burst, usize::MAX)
    }

    /// Create a limiter that tracks at most `max_clients` identifiers.
    pub fn with_max_clients(refill_rate: f64, burst: u32, max_clients: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            refill_rate,
            capacity: burst as f64,
            max_clients: max_clients.max(1),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::with_max_clients(
            config.ip_rate_limit,
            config.burst_rate_limit,
            config.max_clients,
        )
    }

    /// Consume one token for `client_id` if available.
    pub fn allow(&self, client_id: &str) -> bool {
        self.allow_at(client_id, Instant::now())
    }

    /// [`allow`](Self::allow) against an explicit instant.
    pub fn allow_at(&self, client_id: &str, now: Instant) -> bool {
        {
            let registry = self.registry.read();
            if let Some(slot) = registry.buckets.get(client_id) {
                return slot.bucket.lock().try_acquire(now);
            }
        }

        let mut registry = self.registry.write();
        // Another request may have created the bucket between the two locks.
        if let Some(slot) = registry.buckets.get_mut(client_id) {
            return slot.bucket.get_mut().try_acquire(now);
        }

        if registry.buckets.len() >= self.max_clients {
            if let (Some(evicted), _) = registry.evict_least_recent() {
                tracing::debug!(client = %evicted, "Evicting least recently seen client");
            }
        }
        tracing::debug!(client = %client_id, "Tracking new client");
        let bucket = TokenBucket::new(self.capacity, self.refill_rate, now);
        registry.insert(client_id, bucket).bucket.get_mut().try_acquire(now)
    }

    /// Forget clients idle for at least `idle` whose bucket has refilled completely.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep_idle(&self, idle: Duration) -> usize {
        self.sweep_idle_at(idle, Instant::now())
    }

    pub fn sweep_idle_at(&self, idle: Duration, now: Instant) -> usize {
        let mut guard = self.registry.write();
        let Registry {
            buckets, recency, ..
        } = &mut *guard;
        let before = buckets.len();
        buckets.retain(|_, slot| {
            let bucket = slot.bucket.get_mut();
            let keep = now.saturating_duration_since(bucket.last_refill) < idle
                || !bucket.is_refilled_at(now);
            if !keep {
                recency.remove(&slot.indexed_at);
            }
            keep
        });
        before - buckets.len()
    }

    /// Time after which an untouched bucket is guaranteed to be full.
    ///
    /// Saturates at [`Duration::MAX`] for rates too small to represent.
    pub fn full_refill_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.capacity / self.refill_rate).unwrap_or(Duration::MAX)
    }

    /// Number of client identifiers currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.registry.read().buckets.len()
    }
}
