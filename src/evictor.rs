//! Pure-decision LRU admission/eviction over a recency-ordered index.
//!
//! This module performs no I/O and holds no shared state of its own — it
//! operates purely on the `IndexMap` the caller passes in, which serves as
//! both the disk backend's index and the recency order, mirroring the
//! Python reference's use of `OrderedDict` for the same dual purpose.

use indexmap::IndexMap;

use crate::key::CacheEngineKey;
use crate::memory_obj::{DType, Shape};

/// Metadata retained for a key persisted to local disk.
#[derive(Debug, Clone)]
pub struct DiskCacheMetadata {
    pub path: String,
    pub size_bytes: usize,
    pub shape: Shape,
    pub dtype: DType,
}

/// Outcome of [`LruEvictor::update_on_put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    /// The object fits, possibly after evicting the returned victims.
    Legal,
    /// The object alone exceeds `max_cache_size`; no victim list is evicted.
    Illegal,
}

/// Pure LRU decision module: tracks `allocated_bytes` against
/// `max_cache_size` and decides admission/eviction without touching storage.
#[derive(Debug)]
pub struct LruEvictor {
    max_cache_size: u64,
    allocated_bytes: u64,
}

impl LruEvictor {
    pub fn new(max_cache_size: u64) -> Self {
        Self {
            max_cache_size,
            allocated_bytes: 0,
        }
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }

    pub fn max_cache_size(&self) -> u64 {
        self.max_cache_size
    }

    /// Move `key` to the most-recent position in `index`. No-op if absent.
    pub fn update_on_hit(&self, key: &CacheEngineKey, index: &mut IndexMap<CacheEngineKey, DiskCacheMetadata>) {
        if let Some((_, meta)) = index.shift_remove_entry(key) {
            index.insert(key.clone(), meta);
        }
    }

    /// Decide admission of an incoming object of `incoming_size` bytes.
    ///
    /// Returns the list of victim keys (in eviction order, least-recent
    /// first) the caller must remove before inserting the new entry, and
    /// whether the put is legal at all. Does not mutate `index` or
    /// `allocated_bytes` itself — the caller applies the decision and is
    /// responsible for keeping `allocated_bytes` in sync via
    /// [`LruEvictor::record_evicted`]/[`LruEvictor::record_inserted`].
    pub fn update_on_put(
        &self,
        index: &IndexMap<CacheEngineKey, DiskCacheMetadata>,
        incoming_size: u64,
    ) -> (Vec<CacheEngineKey>, PutStatus) {
        if incoming_size > self.max_cache_size {
            return (Vec::new(), PutStatus::Illegal);
        }

        let mut victims = Vec::new();
        let mut projected = self.allocated_bytes;

        for (key, meta) in index.iter() {
            if projected + incoming_size <= self.max_cache_size {
                break;
            }
            victims.push(key.clone());
            projected -= meta.size_bytes as u64;
        }

        (victims, PutStatus::Legal)
    }

    /// Record that `size_bytes` were evicted, keeping the running total in
    /// sync with the caller's index mutation.
    pub fn record_evicted(&mut self, size_bytes: u64) {
        self.allocated_bytes = self.allocated_bytes.saturating_sub(size_bytes);
    }

    /// Record that `size_bytes` were newly admitted.
    pub fn record_inserted(&mut self, size_bytes: u64) {
        self.allocated_bytes += size_bytes;
    }
}
