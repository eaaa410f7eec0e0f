use hyper::{HeaderMap, Method, StatusCode};
use parking_lot::Mutex;
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, trace, warn};

use super::shard::{Segment, Shard, Slot};
use super::ResponseStore;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::model::{CacheEntry, CacheKey, ResponseModel};

/// Sizing of a [`BoundedCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedCacheConfig {
    /// Upper bound on the summed cost (body bytes) of stored entries.
    pub max_cost: u64,
    /// Upper bound on the number of stored keys.
    pub num_counters: usize,
    /// Number of lock stripes.
    pub shards: usize,
}

impl Default for BoundedCacheConfig {
    fn default() -> Self {
        Self {
            max_cost: 100 * 1024 * 1024,
            num_counters: 1_000_000,
            shards: 64,
        }
    }
}

/// Why an entry left the cache without being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionCause {
    /// Reclaimed after its expiry instant.
    Expired,
    /// Pushed out to make room for a new entry.
    Capacity,
}

/// Callback notified of every eviction. Runs on the writing thread and must
/// not call back into the cache.
pub type EvictionListener = Arc<dyn Fn(&CacheEntry, EvictionCause) + Send + Sync>;

enum Victim {
    Expired(usize, (SystemTime, u64)),
    Lru(usize, Segment, u64),
}

/// Cost- and count-bounded response cache.
///
/// Reads lock a single shard. Writes are serialized by a writer lock so the
/// global cost counter can only grow under it, which keeps the total cost of
/// stored entries within `max_cost` at every point a writer releases it.
///
/// Eviction reclaims expired entries first, then entries never read since
/// insertion, then entries read at least once; least recently touched first
/// within each group.
pub struct BoundedCache {
    config: BoundedCacheConfig,
    shards: Box<[Mutex<Shard>]>,
    hasher: RandomState,
    clock: Arc<dyn Clock>,
    cost: AtomicU64,
    len: AtomicUsize,
    ticks: AtomicU64,
    probes: AtomicU64,
    writer: Mutex<()>,
    listener: Option<EvictionListener>,
}

impl BoundedCache {
    pub fn new(config: BoundedCacheConfig, clock: Arc<dyn Clock>) -> Self {
        let config = BoundedCacheConfig {
            max_cost: config.max_cost.max(1),
            num_counters: config.num_counters.max(1),
            shards: config.shards.max(1),
        };

        debug!(
            "Creating bounded cache: max_cost={}, num_counters={}, shards={}",
            config.max_cost, config.num_counters, config.shards
        );

        let shards = (0..config.shards)
            .map(|_| Mutex::new(Shard::default()))
            .collect();

        Self {
            config,
            shards,
            hasher: RandomState::new(),
            clock,
            cost: AtomicU64::new(0),
            len: AtomicUsize::new(0),
            ticks: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            writer: Mutex::new(()),
            listener: None,
        }
    }

    pub fn with_eviction_listener(mut self, listener: EvictionListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Number of stored entries, expired ones not yet reclaimed included.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summed cost of stored entries.
    pub fn cost(&self) -> u64 {
        self.cost.load(Ordering::Acquire)
    }

    pub fn max_cost(&self) -> u64 {
        self.config.max_cost
    }

    /// Drop the entry for `key`. Returns whether one was stored.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let _writer = self.writer.lock();
        match self.shard(key).lock().remove(key) {
            Some(slot) => {
                self.release(&slot);
                true
            }
            None => false,
        }
    }

    /// Reclaim every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let _writer = self.writer.lock();
        let now = self.clock.now();

        let mut purged = 0;
        for shard in self.shards.iter() {
            let drained = shard.lock().drain_expired(now);
            for slot in &drained {
                self.release(slot);
                self.notify(&slot.entry, EvictionCause::Expired);
            }
            purged += drained.len();
        }

        if purged > 0 {
            debug!(purged, remaining = self.len(), "Purged expired cache entries");
        }
        purged
    }

    fn shard(&self, key: &CacheKey) -> &Mutex<Shard> {
        let index = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    fn next_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed)
    }

    fn release(&self, slot: &Slot) {
        self.cost.fetch_sub(slot.cost, Ordering::AcqRel);
        self.len.fetch_sub(1, Ordering::AcqRel);
    }

    /// Put back a slot taken out by a failed write. Caller holds the writer
    /// lock.
    fn restore(&self, slot: Slot) {
        let cost = slot.cost;
        self.shard(slot.entry.key()).lock().insert(slot);
        self.cost.fetch_add(cost, Ordering::AcqRel);
        self.len.fetch_add(1, Ordering::AcqRel);
    }

    fn notify(&self, entry: &CacheEntry, cause: EvictionCause) {
        if let Some(listener) = &self.listener {
            listener(entry, cause);
        }
    }

    fn over_budget(&self, incoming: u64) -> bool {
        self.cost() + incoming > self.config.max_cost || self.len() + 1 > self.config.num_counters
    }

    /// Pick the next victim by peeking every shard. Caller holds the writer
    /// lock.
    fn pick_victim(&self, now: SystemTime) -> Option<Victim> {
        let mut expired: Option<(usize, (SystemTime, u64))> = None;
        let mut probation: Option<(usize, u64)> = None;
        let mut protected: Option<(usize, u64)> = None;

        for (index, shard) in self.shards.iter().enumerate() {
            let shard = shard.lock();
            if let Some(at) = shard.earliest_expiry() {
                if at.0 <= now && expired.map_or(true, |(_, best)| at < best) {
                    expired = Some((index, at));
                }
            }
            if let Some(tick) = shard.oldest(Segment::Probation) {
                if probation.map_or(true, |(_, best)| tick < best) {
                    probation = Some((index, tick));
                }
            }
            if let Some(tick) = shard.oldest(Segment::Protected) {
                if protected.map_or(true, |(_, best)| tick < best) {
                    protected = Some((index, tick));
                }
            }
        }

        if let Some((index, at)) = expired {
            return Some(Victim::Expired(index, at));
        }
        if let Some((index, tick)) = probation {
            return Some(Victim::Lru(index, Segment::Probation, tick));
        }
        protected.map(|(index, tick)| Victim::Lru(index, Segment::Protected, tick))
    }

    /// Evict entries until `incoming` more cost and one more key fit. Caller
    /// holds the writer lock.
    fn make_room(&self, incoming: u64, now: SystemTime) -> Result<(), StoreError> {
        while self.over_budget(incoming) {
            let Some(victim) = self.pick_victim(now) else {
                return Err(StoreError::Invariant(format!(
                    "cache reports cost {} and {} keys but holds nothing to evict",
                    self.cost(),
                    self.len()
                )));
            };

            let (removed, cause) = match victim {
                Victim::Expired(index, at) => (
                    self.shards[index].lock().remove_by_expiry(at),
                    EvictionCause::Expired,
                ),
                // A reader may have touched the entry since the peek; the
                // tick no longer matches and the next round re-ranks.
                Victim::Lru(index, segment, tick) => (
                    self.shards[index].lock().remove_by_tick(segment, tick),
                    EvictionCause::Capacity,
                ),
            };

            if let Some(slot) = removed {
                trace!(key = %slot.entry.key(), ?cause, "Evicting cache entry");
                self.release(&slot);
                self.notify(&slot.entry, cause);
            }
        }
        Ok(())
    }
}

impl ResponseStore for BoundedCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>, StoreError> {
        let now = self.clock.now();
        Ok(self.shard(key).lock().get(key, now, || self.next_tick()))
    }

    fn set(&self, entry: CacheEntry) -> Result<(), StoreError> {
        let now = self.clock.now();
        if entry.is_expired_at(now) {
            trace!(key = %entry.key(), "Dropping already expired cache entry");
            return Ok(());
        }

        let cost = entry.cost();
        if cost > self.config.max_cost {
            warn!(
                key = %entry.key(),
                cost,
                budget = self.config.max_cost,
                "Rejecting cache entry larger than the cost budget"
            );
            return Err(StoreError::rejected(entry.key(), cost, self.config.max_cost));
        }

        let _writer = self.writer.lock();

        let previous = self.shard(entry.key()).lock().remove(entry.key());
        if let Some(previous) = &previous {
            self.release(previous);
        }

        if let Err(e) = self.make_room(cost, now) {
            if let Some(previous) = previous {
                self.restore(previous);
            }
            return Err(e);
        }

        let tick = self.next_tick();
        let slot = Slot {
            entry: Arc::new(entry),
            cost,
            id: tick,
            tick,
            segment: Segment::Probation,
        };
        self.shard(slot.entry.key()).lock().insert(slot);
        self.cost.fetch_add(cost, Ordering::AcqRel);
        self.len.fetch_add(1, Ordering::AcqRel);

        Ok(())
    }

    /// Round-trip a probe slot through its shard under the writer lock. The
    /// probe bypasses admission and accounting so it never evicts or
    /// displaces stored entries, and each call uses its own key.
    fn health_check(&self) -> Result<(), StoreError> {
        let now = self.clock.now();
        let probe = self.probes.fetch_add(1, Ordering::Relaxed);
        let key = CacheKey::new(Method::GET, format!("revprox://health-probe/{probe}"));
        let entry = CacheEntry::new(
            key.clone(),
            ResponseModel::new(StatusCode::OK, HeaderMap::new(), "ok"),
            Duration::from_secs(60),
            now,
        );

        let _writer = self.writer.lock();
        let mut shard = self.shard(&key).lock();

        let tick = self.next_tick();
        shard.insert(Slot {
            cost: entry.cost(),
            entry: Arc::new(entry),
            id: tick,
            tick,
            segment: Segment::Probation,
        });
        let found = shard.get(&key, now, || self.next_tick());
        let removed = shard.remove(&key);

        match (found, removed) {
            (Some(entry), Some(_)) if entry.payload().body.as_ref() == b"ok" => Ok(()),
            (Some(_), Some(_)) => Err(StoreError::HealthCheck(
                "probe read returned a different entry".to_string(),
            )),
            (None, _) => Err(StoreError::HealthCheck(
                "probe entry not visible after write".to_string(),
            )),
            (Some(_), None) => Err(StoreError::HealthCheck(
                "probe entry could not be removed".to_string(),
            )),
        }
    }
}
