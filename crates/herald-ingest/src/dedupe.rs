//! Bounded deduplication cache for event IDs.
//!
//! This module provides the [`DedupeCache`] which remembers which event IDs
//! have already been routed (or are being routed right now).
//!
//! # Eviction
//!
//! The cache holds at most `capacity` IDs. When full, inserting a new ID
//! evicts the oldest *inserted* ID. Lookups never refresh an entry, so this
//! is FIFO and not LRU. Entries never expire by time.
//!
//! # Concurrency
//!
//! A `parking_lot::RwLock` guards the set and its insertion order. Membership
//! tests share the read lock; [`DedupeCache::mark_seen`] performs its check
//! and insert under one write guard, so concurrent callers racing on the same
//! ID see exactly one `true`.
//!
//! # Persistence
//!
//! [`DedupeCache::save_snapshot`] and [`DedupeCache::load_snapshot`] write and
//! read the IDs (oldest first) as a JSON array. The snapshot is how dedupe
//! state survives a restart; nothing else is consulted.

use crate::error::Result;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// Default number of IDs remembered.
pub const DEFAULT_DEDUPE_CAPACITY: usize = 500;

#[derive(Default)]
struct Inner {
    ids: HashSet<String>,
    /// Insertion order, oldest at the front.
    order: VecDeque<String>,
}

impl Inner {
    fn evict_oldest(&mut self) -> Option<String> {
        let oldest = self.order.pop_front()?;
        self.ids.remove(&oldest);
        Some(oldest)
    }
}

/// In-memory FIFO deduplication cache.
///
/// Thread-safe: share it via `Arc<DedupeCache>`.
pub struct DedupeCache {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl DedupeCache {
    /// Create an empty cache. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(Inner {
                ids: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Check whether an ID is present. Never mutates.
    pub fn has_seen(&self, event_id: &str) -> bool {
        self.inner.read().ids.contains(event_id)
    }

    /// Check and insert in one operation.
    ///
    /// Returns `true` if the ID was newly inserted, `false` if it was already
    /// present. Evicts the oldest entry first when at capacity.
    pub fn mark_seen(&self, event_id: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.ids.contains(event_id) {
            return false;
        }

        if inner.order.len() >= self.capacity
            && let Some(evicted) = inner.evict_oldest()
        {
            debug!(evicted = %evicted, "dedupe cache full, evicted oldest id");
        }

        inner.ids.insert(event_id.to_string());
        inner.order.push_back(event_id.to_string());
        true
    }

    /// Number of IDs currently held.
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    /// True if no IDs are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of IDs held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every ID.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.ids.clear();
        inner.order.clear();
        info!("Dedupe cache cleared");
    }

    /// True once `len / capacity` reaches `threshold` (a fraction, e.g. `0.9`).
    pub fn is_near_capacity(&self, threshold: f64) -> bool {
        self.len() as f64 >= self.capacity as f64 * threshold
    }

    /// Evict oldest entries until at most `target_size` remain.
    ///
    /// Returns the number of entries evicted.
    pub fn compact(&self, target_size: usize) -> usize {
        let mut inner = self.inner.write();
        let mut evicted = 0;
        while inner.order.len() > target_size && inner.evict_oldest().is_some() {
            evicted += 1;
        }
        if evicted > 0 {
            info!(
                "Compacted dedupe cache: evicted {}, {} remaining",
                evicted,
                inner.order.len()
            );
        }
        evicted
    }

    /// Oldest surviving ID.
    pub fn oldest_id(&self) -> Option<String> {
        self.inner.read().order.front().cloned()
    }

    /// Most recently inserted ID.
    pub fn newest_id(&self) -> Option<String> {
        self.inner.read().order.back().cloned()
    }

    /// The `count` most recently inserted IDs, oldest first.
    pub fn recent_ids(&self, count: usize) -> Vec<String> {
        let inner = self.inner.read();
        let skip = inner.order.len().saturating_sub(count);
        inner.order.iter().skip(skip).cloned().collect()
    }

    /// Get statistics about the cache.
    pub fn stats(&self) -> DedupeStats {
        let inner = self.inner.read();
        let current_size = inner.order.len();
        DedupeStats {
            current_size,
            max_size: self.capacity,
            utilization_percent: current_size as f64 / self.capacity as f64 * 100.0,
            oldest_id: inner.order.front().cloned(),
            newest_id: inner.order.back().cloned(),
        }
    }

    /// Write all IDs, oldest first, to `path` as a JSON array.
    ///
    /// The file is written next to `path` and renamed into place.
    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let ids: Vec<String> = self.inner.read().order.iter().cloned().collect();

        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &ids)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;

        info!("Saved dedupe snapshot: {} ids to {}", ids.len(), path.display());
        Ok(())
    }

    /// Build a cache from a snapshot written by [`Self::save_snapshot`].
    ///
    /// A missing file yields an empty cache. If the snapshot holds more IDs
    /// than `capacity`, only the newest are kept.
    pub fn load_snapshot<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        let cache = Self::new(capacity);

        if !path.exists() {
            info!("No dedupe snapshot at {}, starting empty", path.display());
            return Ok(cache);
        }

        let reader = BufReader::new(File::open(path)?);
        let ids: Vec<String> = serde_json::from_reader(reader)?;
        for id in &ids {
            cache.mark_seen(id);
        }

        info!(
            "Loaded dedupe snapshot from {}: {} ids ({} kept)",
            path.display(),
            ids.len(),
            cache.len()
        );
        Ok(cache)
    }
}

impl Default for DedupeCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUPE_CAPACITY)
    }
}

/// Statistics about the dedupe cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupeStats {
    /// IDs currently held.
    pub current_size: usize,
    /// Capacity.
    pub max_size: usize,
    /// `current_size / max_size * 100`.
    pub utilization_percent: f64,
    /// Oldest surviving ID.
    pub oldest_id: Option<String>,
    /// Most recently inserted ID.
    pub newest_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn id(n: usize) -> String {
        format!("{:064x}", n)
    }

    #[test]
    fn test_mark_then_has_seen() {
        let cache = DedupeCache::new(10);

        assert!(!cache.has_seen(&id(1)));
        assert!(cache.mark_seen(&id(1)));
        assert!(cache.has_seen(&id(1)));

        // Second time should return false (already seen)
        assert!(!cache.mark_seen(&id(1)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_has_seen_does_not_insert() {
        let cache = DedupeCache::new(10);
        assert!(!cache.has_seen(&id(1)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fifo_eviction_order() {
        let cache = DedupeCache::new(3);
        for n in 1..=3 {
            assert!(cache.mark_seen(&id(n)));
        }
        assert_eq!(cache.oldest_id(), Some(id(1)));

        // Re-checking id 1 must not protect it from eviction
        assert!(cache.has_seen(&id(1)));
        assert!(!cache.mark_seen(&id(1)));

        assert!(cache.mark_seen(&id(4)));
        assert_eq!(cache.len(), 3);
        assert!(!cache.has_seen(&id(1)));
        assert_eq!(cache.oldest_id(), Some(id(2)));
        assert_eq!(cache.newest_id(), Some(id(4)));

        assert!(cache.mark_seen(&id(5)));
        assert_eq!(cache.recent_ids(10), vec![id(3), id(4), id(5)]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let cache = DedupeCache::new(50);
        for n in 0..1000 {
            cache.mark_seen(&id(n));
            assert!(cache.len() <= 50);
        }
        assert_eq!(cache.recent_ids(2), vec![id(998), id(999)]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = DedupeCache::new(0);
        assert_eq!(cache.capacity(), 1);
        assert!(cache.mark_seen(&id(1)));
        assert!(cache.mark_seen(&id(2)));
        assert_eq!(cache.recent_ids(5), vec![id(2)]);
    }

    #[test]
    fn test_concurrent_mark_seen_single_winner() {
        let cache = Arc::new(DedupeCache::new(100));
        let winners = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    if cache.mark_seen(&id(42)) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(cache.has_seen(&id(42)));
    }

    #[test]
    fn test_concurrent_distinct_inserts_respect_capacity() {
        let cache = DedupeCache::new(64);

        std::thread::scope(|s| {
            for t in 0..8 {
                let cache = &cache;
                s.spawn(move || {
                    for n in 0..200 {
                        cache.mark_seen(&id(t * 1000 + n));
                    }
                });
            }
        });

        assert_eq!(cache.len(), 64);
    }

    #[test]
    fn test_clear_and_near_capacity() {
        let cache = DedupeCache::new(10);
        for n in 0..9 {
            cache.mark_seen(&id(n));
        }
        assert!(cache.is_near_capacity(0.85));
        assert!(!cache.is_near_capacity(0.95));

        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.has_seen(&id(0)));
        assert!(cache.mark_seen(&id(0)));
    }

    #[test]
    fn test_compact_evicts_oldest() {
        let cache = DedupeCache::new(10);
        for n in 0..10 {
            cache.mark_seen(&id(n));
        }

        assert_eq!(cache.compact(4), 6);
        assert_eq!(cache.recent_ids(10), vec![id(6), id(7), id(8), id(9)]);
        assert_eq!(cache.compact(8), 0);
    }

    #[test]
    fn test_stats() {
        let cache = DedupeCache::new(4);
        assert_eq!(cache.stats().oldest_id, None);

        cache.mark_seen(&id(1));
        cache.mark_seen(&id(2));

        let stats = cache.stats();
        assert_eq!(stats.current_size, 2);
        assert_eq!(stats.max_size, 4);
        assert!((stats.utilization_percent - 50.0).abs() < f64::EPSILON);
        assert_eq!(stats.oldest_id, Some(id(1)));
        assert_eq!(stats.newest_id, Some(id(2)));
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dedupe.json");

        let cache = DedupeCache::new(10);
        for n in 0..5 {
            cache.mark_seen(&id(n));
        }
        cache.save_snapshot(&path).unwrap();

        let restored = DedupeCache::load_snapshot(&path, 3).unwrap();
        assert_eq!(restored.recent_ids(10), vec![id(2), id(3), id(4)]);
        assert!(!restored.mark_seen(&id(4)));
        assert!(restored.mark_seen(&id(0)));
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let tmp = TempDir::new().unwrap();
        let cache = DedupeCache::load_snapshot(tmp.path().join("absent.json"), 10).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 10);
    }
}
