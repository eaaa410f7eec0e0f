use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use crate::model::{CacheEntry, CacheKey};

/// Recency segment. Entries start in probation and are promoted on their
/// first read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Segment {
    Probation,
    Protected,
}

#[derive(Debug)]
pub(super) struct Slot {
    pub entry: Arc<CacheEntry>,
    pub cost: u64,
    /// Unique per insertion, orders the expiry index.
    pub id: u64,
    /// Last touch, orders the recency indexes.
    pub tick: u64,
    pub segment: Segment,
}

/// One lock stripe of the cache: the entries plus the indexes used to pick
/// eviction victims without scanning.
#[derive(Debug, Default)]
pub(super) struct Shard {
    slots: HashMap<CacheKey, Slot>,
    probation: BTreeMap<u64, CacheKey>,
    protected: BTreeMap<u64, CacheKey>,
    expiry: BTreeMap<(SystemTime, u64), CacheKey>,
}

impl Shard {
    /// Return a live entry and promote it to the protected segment with a
    /// fresh tick. Expired entries are left in place for the writer to
    /// reclaim.
    pub fn get(
        &mut self,
        key: &CacheKey,
        now: SystemTime,
        next_tick: impl FnOnce() -> u64,
    ) -> Option<Arc<CacheEntry>> {
        let slot = self.slots.get_mut(key)?;
        if slot.entry.is_expired_at(now) {
            return None;
        }

        let (old_segment, old_tick) = (slot.segment, slot.tick);
        slot.tick = next_tick();
        slot.segment = Segment::Protected;
        let (tick, entry) = (slot.tick, Arc::clone(&slot.entry));

        match old_segment {
            Segment::Probation => self.probation.remove(&old_tick),
            Segment::Protected => self.protected.remove(&old_tick),
        };
        self.protected.insert(tick, key.clone());

        Some(entry)
    }

    /// Insert a slot. The key must not already be present.
    pub fn insert(&mut self, slot: Slot) {
        let key = slot.entry.key().clone();
        self.recency_mut(slot.segment).insert(slot.tick, key.clone());
        self.expiry
            .insert((slot.entry.expires_at(), slot.id), key.clone());
        self.slots.insert(key, slot);
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.recency_mut(slot.segment).remove(&slot.tick);
        self.expiry.remove(&(slot.entry.expires_at(), slot.id));
        Some(slot)
    }

    pub fn earliest_expiry(&self) -> Option<(SystemTime, u64)> {
        self.expiry.keys().next().copied()
    }

    pub fn oldest(&self, segment: Segment) -> Option<u64> {
        let index = match segment {
            Segment::Probation => &self.probation,
            Segment::Protected => &self.protected,
        };
        index.keys().next().copied()
    }

    pub fn remove_by_expiry(&mut self, at: (SystemTime, u64)) -> Option<Slot> {
        let key = self.expiry.get(&at)?.clone();
        self.remove(&key)
    }

    /// Remove the entry last touched at `tick`, if it has not been touched
    /// since.
    pub fn remove_by_tick(&mut self, segment: Segment, tick: u64) -> Option<Slot> {
        let key = self.recency_mut(segment).get(&tick)?.clone();
        self.remove(&key)
    }

    /// Remove every entry expired at `now`.
    pub fn drain_expired(&mut self, now: SystemTime) -> Vec<Slot> {
        let mut drained = Vec::new();
        while let Some(at) = self.earliest_expiry() {
            if at.0 > now {
                break;
            }
            match self.remove_by_expiry(at) {
                Some(slot) => drained.push(slot),
                None => break,
            }
        }
        drained
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn recency_mut(&mut self, segment: Segment) -> &mut BTreeMap<u64, CacheKey> {
        match segment {
            Segment::Probation => &mut self.probation,
            Segment::Protected => &mut self.protected,
        }
    }
}
